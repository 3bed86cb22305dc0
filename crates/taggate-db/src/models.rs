//! Row types as stored in SQLite, and their conversion into domain models.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Row;

use taggate_types::models::{
    InstagramChallenge, Member, MemberUsage, Organization, Permissions, Subscription, Tag,
};
use taggate_types::window::QuotaCounter;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

fn counter(count: i64, window_start: i64) -> Result<QuotaCounter> {
    Ok(QuotaCounter {
        count: u32::try_from(count)?,
        window_start: from_millis(window_start)?,
    })
}

pub(crate) struct OrganizationRow {
    name: String,
    owner: String,
    instagram: Option<String>,
    challenge_code: Option<String>,
    challenge_expires_at: Option<i64>,
    created_at: i64,
    renewed_at: Option<i64>,
    expires_at: Option<i64>,
    tag_count: i64,
    tag_window_start: i64,
}

impl OrganizationRow {
    pub(crate) const COLUMNS: &'static str = "name, owner, instagram, challenge_code, \
        challenge_expires_at, created_at, renewed_at, expires_at, tag_count, tag_window_start";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            owner: row.get(1)?,
            instagram: row.get(2)?,
            challenge_code: row.get(3)?,
            challenge_expires_at: row.get(4)?,
            created_at: row.get(5)?,
            renewed_at: row.get(6)?,
            expires_at: row.get(7)?,
            tag_count: row.get(8)?,
            tag_window_start: row.get(9)?,
        })
    }

    pub(crate) fn into_model(self) -> Result<Organization> {
        let instagram_challenge = match (self.challenge_code, self.challenge_expires_at) {
            (Some(code), Some(expires_at)) => Some(InstagramChallenge {
                code,
                expires_at: from_millis(expires_at)?,
            }),
            _ => None,
        };
        Ok(Organization {
            name: self.name,
            owner: self.owner,
            instagram: self.instagram,
            instagram_challenge,
            created_at: from_millis(self.created_at)?,
            subscription: Subscription {
                last_renewal: self.renewed_at.map(from_millis).transpose()?,
                expires_at: self.expires_at.map(from_millis).transpose()?,
            },
            tag_window: counter(self.tag_count, self.tag_window_start)?,
        })
    }
}

pub(crate) struct MemberRow {
    username: String,
    permissions: String,
    tag_description: String,
    tag_expiration_ms: Option<i64>,
    tag_generation_limit: Option<i64>,
    tag_count: i64,
    window_start: i64,
    total_tag_count: i64,
    created_at: i64,
}

impl MemberRow {
    pub(crate) const COLUMNS: &'static str = "username, permissions, tag_description, \
        tag_expiration_ms, tag_generation_limit, tag_count, window_start, total_tag_count, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            username: row.get(0)?,
            permissions: row.get(1)?,
            tag_description: row.get(2)?,
            tag_expiration_ms: row.get(3)?,
            tag_generation_limit: row.get(4)?,
            tag_count: row.get(5)?,
            window_start: row.get(6)?,
            total_tag_count: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    pub(crate) fn into_model(self) -> Result<Member> {
        let permissions: Permissions = serde_json::from_str(&self.permissions)?;
        Ok(Member {
            username: self.username,
            permissions,
            tag_description: self.tag_description,
            tag_expiration_ms: self.tag_expiration_ms,
            tag_generation_limit: self.tag_generation_limit.map(u64::try_from).transpose()?,
            usage: MemberUsage {
                window: counter(self.tag_count, self.window_start)?,
                total_tag_count: u64::try_from(self.total_tag_count)?,
            },
            created_at: from_millis(self.created_at)?,
        })
    }
}

pub(crate) struct TagRow {
    token: String,
    description: String,
    created_by: String,
    created_at: i64,
    expires_at: Option<i64>,
}

impl TagRow {
    pub(crate) const COLUMNS: &'static str = "token, description, created_by, created_at, expires_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            token: row.get(0)?,
            description: row.get(1)?,
            created_by: row.get(2)?,
            created_at: row.get(3)?,
            expires_at: row.get(4)?,
        })
    }

    pub(crate) fn into_model(self) -> Result<Tag> {
        Ok(Tag {
            token: self.token,
            description: self.description,
            created_by: self.created_by,
            created_at: from_millis(self.created_at)?,
            expires_at: self.expires_at.map(from_millis).transpose()?,
        })
    }
}
