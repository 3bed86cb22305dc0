use std::fmt;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::window::QuotaCounter;

// -- Permissions --

/// Allowed per-member hourly tag rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TagsPerHour {
    Six,
    Ten,
    Thirty,
    Sixty,
}

impl TagsPerHour {
    pub fn limit(self) -> u32 {
        match self {
            TagsPerHour::Six => 6,
            TagsPerHour::Ten => 10,
            TagsPerHour::Thirty => 30,
            TagsPerHour::Sixty => 60,
        }
    }
}

impl TryFrom<u32> for TagsPerHour {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            6 => Ok(TagsPerHour::Six),
            10 => Ok(TagsPerHour::Ten),
            30 => Ok(TagsPerHour::Thirty),
            60 => Ok(TagsPerHour::Sixty),
            other => Err(format!("tags per hour must be 6, 10, 30 or 60, got {}", other)),
        }
    }
}

impl From<TagsPerHour> for u32 {
    fn from(value: TagsPerHour) -> Self {
        value.limit()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct AccountPermissions {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub accounts: AccountPermissions,
    pub allow_generate_tags: bool,
    pub allow_scan_tags: bool,
    pub tags_per_hour: Option<TagsPerHour>,
}

impl Default for Permissions {
    /// New members may generate tags at an unlimited rate and nothing else.
    fn default() -> Self {
        Self {
            accounts: AccountPermissions::default(),
            allow_generate_tags: true,
            allow_scan_tags: false,
            tags_per_hour: None,
        }
    }
}

// -- Members --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberUsage {
    pub window: QuotaCounter,
    /// Lifetime counter, never reset.
    pub total_tag_count: u64,
}

impl MemberUsage {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window: QuotaCounter::new(now),
            total_tag_count: 0,
        }
    }
}

/// A non-owner user's membership in one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub username: String,
    pub permissions: Permissions,
    pub tag_description: String,
    /// Offset added to the creation time of each tag; `None` means tags never expire.
    pub tag_expiration_ms: Option<i64>,
    /// Lifetime cap on generated tags; `None` means unlimited.
    pub tag_generation_limit: Option<u64>,
    pub usage: MemberUsage,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn tag_expiration(&self) -> Option<TimeDelta> {
        self.tag_expiration_ms.and_then(TimeDelta::try_milliseconds)
    }
}

// -- Organizations --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub last_renewal: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// A subscription with no expiry, or one in the past, is the free tier.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > now)
    }

    /// Renew for `duration`, stacking on top of a live subscription.
    pub fn extended(&self, now: DateTime<Utc>, duration: TimeDelta) -> Self {
        let base = match self.expires_at {
            Some(expires_at) if expires_at > now => expires_at,
            _ => now,
        };
        Self {
            last_renewal: Some(now),
            expires_at: Some(base + duration),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramChallenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    pub owner: String,
    pub instagram: Option<String>,
    pub instagram_challenge: Option<InstagramChallenge>,
    pub created_at: DateTime<Utc>,
    pub subscription: Subscription,
    /// Organization-wide tag generation in the current hour.
    pub tag_window: QuotaCounter,
}

impl Organization {
    pub fn new(name: &str, owner: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            instagram: None,
            instagram_challenge: None,
            created_at: now,
            subscription: Subscription::default(),
            tag_window: QuotaCounter::new(now),
        }
    }
}

// -- Tags --

/// A single-use redemption token. Only active tags are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub token: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tag {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Entry in the per-organization tag index used to measure recent density.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagIndexEntry {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

// -- Redemptions --

/// A calendar month. `month` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RedemptionPeriod {
    pub year: i32,
    pub month: u32,
}

impl RedemptionPeriod {
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    pub fn months_before(now: DateTime<Utc>, months_ago: u32) -> Self {
        let index = now.year() * 12 + now.month0() as i32 - months_ago as i32;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub username: String,
    pub period: RedemptionPeriod,
    pub count: u64,
}

// -- Payments --

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCard {
    pub cardholder_name: String,
    pub card_number: String,
    pub cvv: String,
    pub expiration_month: u32,
    pub expiration_year: i32,
}

impl fmt::Debug for PaymentCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last4 = self
            .card_number
            .get(self.card_number.len().saturating_sub(4)..)
            .unwrap_or("");
        f.debug_struct("PaymentCard")
            .field("cardholder_name", &self.cardholder_name)
            .field("card_number", &format_args!("****{}", last4))
            .field("cvv", &"***")
            .field("expiration_month", &self.expiration_month)
            .field("expiration_year", &self.expiration_year)
            .finish()
    }
}
