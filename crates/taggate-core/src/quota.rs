//! Rolling hourly quotas for organizations and members.
//!
//! Counters are checked against a rolled copy first and only written once
//! every gate of an operation has passed. Writes go through the store's
//! conditional swaps so two concurrent generators cannot both take the
//! last slot.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use taggate_types::models::{Member, MemberUsage, Subscription, TagsPerHour};
use taggate_types::window::QuotaCounter;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::service::TagService;

const MAX_SWAP_ATTEMPTS: usize = 5;

/// Hourly organization-wide cap, or `None` when unlimited.
pub fn organization_limit(
    config: &CoreConfig,
    subscription: &Subscription,
    now: DateTime<Utc>,
) -> Option<u32> {
    (config.enable_premium && !subscription.is_active(now))
        .then_some(config.max_unsubscribed_tags_per_hour)
}

pub fn check_organization(
    window: &QuotaCounter,
    now: DateTime<Utc>,
    limit: Option<u32>,
) -> Result<()> {
    window
        .check(now, limit)
        .map_err(|full| CoreError::OrganizationQuotaExceeded {
            resets_at: full.resets_at,
        })
}

/// Count one generated tag against `usage`, leaving it untouched on failure.
pub fn charge_member_usage(
    usage: &mut MemberUsage,
    member: &Member,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(limit) = member.tag_generation_limit {
        if usage.total_tag_count >= limit {
            return Err(CoreError::MemberQuotaExceeded { resets_at: None });
        }
    }
    let hourly = member.permissions.tags_per_hour.map(TagsPerHour::limit);
    usage
        .window
        .check_and_increment(now, hourly)
        .map_err(|full| CoreError::MemberQuotaExceeded {
            resets_at: Some(full.resets_at),
        })?;
    usage.total_tag_count += 1;
    Ok(())
}

pub fn check_member(member: &Member, now: DateTime<Utc>) -> Result<()> {
    let mut preview = member.usage;
    charge_member_usage(&mut preview, member, now)
}

impl TagService {
    /// Persist one tag against the member's counters, re-reading and
    /// re-checking when another writer got there first. Returns the usage
    /// as committed.
    pub(crate) fn charge_member(
        &self,
        organization: &str,
        member: &Member,
        now: DateTime<Utc>,
    ) -> Result<MemberUsage> {
        let mut current = member.usage;
        for attempt in 0..MAX_SWAP_ATTEMPTS {
            let mut next = current;
            charge_member_usage(&mut next, member, now)?;
            if self
                .store
                .swap_member_usage(organization, &member.username, &current, &next)?
            {
                return Ok(next);
            }
            debug!(organization, member = %member.username, attempt, "member usage changed, retrying");
            current = self
                .store
                .get_member(organization, &member.username)?
                .ok_or(CoreError::MemberNotFound)?
                .usage;
        }
        Err(CoreError::Contention("member usage"))
    }

    pub(crate) fn charge_organization(
        &self,
        organization: &str,
        window: QuotaCounter,
        now: DateTime<Utc>,
        limit: Option<u32>,
    ) -> Result<QuotaCounter> {
        let mut current = window;
        for attempt in 0..MAX_SWAP_ATTEMPTS {
            let mut next = current;
            next.check_and_increment(now, limit)
                .map_err(|full| CoreError::OrganizationQuotaExceeded {
                    resets_at: full.resets_at,
                })?;
            if self.store.swap_tag_window(organization, &current, &next)? {
                return Ok(next);
            }
            debug!(organization, attempt, "tag window changed, retrying");
            current = self.load_organization(organization)?.tag_window;
        }
        Err(CoreError::Contention("organization tag window"))
    }

    /// Give back one tag charged by `charge_member`. The hourly slot is only
    /// returned while the window it was taken from is still current.
    pub(crate) fn refund_member(&self, organization: &str, username: &str, charged: &MemberUsage) {
        let refund = || -> Result<bool> {
            for _ in 0..MAX_SWAP_ATTEMPTS {
                let Some(member) = self.store.get_member(organization, username)? else {
                    return Ok(true);
                };
                let current = member.usage;
                let mut next = current;
                next.total_tag_count = next.total_tag_count.saturating_sub(1);
                if next.window.window_start == charged.window.window_start {
                    next.window.count = next.window.count.saturating_sub(1);
                }
                if self
                    .store
                    .swap_member_usage(organization, username, &current, &next)?
                {
                    return Ok(true);
                }
            }
            Ok(false)
        };
        match refund() {
            Ok(true) => debug!(organization, member = username, "member usage refunded"),
            Ok(false) => warn!(organization, member = username, "member refund kept conflicting"),
            Err(e) => warn!(organization, member = username, "member refund failed: {:#}", e),
        }
    }

    /// Give back one slot charged by `charge_organization`, if its window is
    /// still current.
    pub(crate) fn refund_organization(&self, organization: &str, charged: &QuotaCounter) {
        let refund = || -> Result<bool> {
            for _ in 0..MAX_SWAP_ATTEMPTS {
                let current = self.load_organization(organization)?.tag_window;
                if current.window_start != charged.window_start || current.count == 0 {
                    return Ok(true);
                }
                let next = QuotaCounter {
                    count: current.count - 1,
                    ..current
                };
                if self.store.swap_tag_window(organization, &current, &next)? {
                    return Ok(true);
                }
            }
            Ok(false)
        };
        match refund() {
            Ok(true) => debug!(organization, "tag window refunded"),
            Ok(false) => warn!(organization, "tag window refund kept conflicting"),
            Err(e) => warn!(organization, "tag window refund failed: {:#}", e),
        }
    }
}
