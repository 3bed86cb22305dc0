use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use taggate_types::models::{
    InstagramChallenge, Member, MemberUsage, Organization, Redemption, RedemptionPeriod,
    Subscription, Tag, TagIndexEntry,
};
use taggate_types::window::QuotaCounter;

/// Persistence collaborator. Implementations only store and fetch; every
/// rule lives in the engine. The two `swap_*` methods are conditional
/// writes: they return `false` without writing when the stored value no
/// longer equals `expected`.
pub trait Store: Send + Sync {
    // -- Organizations --

    fn get_organization(&self, name: &str) -> Result<Option<Organization>>;

    /// Returns `false` if the name is taken.
    fn insert_organization(&self, organization: &Organization) -> Result<bool>;

    /// Removes the organization with its members, tags and redemptions.
    fn delete_organization(&self, name: &str) -> Result<()>;

    fn list_organizations_by_owner(&self, owner: &str) -> Result<Vec<Organization>>;

    fn swap_tag_window(
        &self,
        organization: &str,
        expected: &QuotaCounter,
        next: &QuotaCounter,
    ) -> Result<bool>;

    fn set_subscription(&self, organization: &str, subscription: &Subscription) -> Result<()>;

    fn set_instagram(
        &self,
        organization: &str,
        instagram: Option<&str>,
        challenge: Option<&InstagramChallenge>,
    ) -> Result<()>;

    // -- Members --

    fn get_member(&self, organization: &str, username: &str) -> Result<Option<Member>>;

    /// Returns `false` if the member already exists.
    fn insert_member(&self, organization: &str, member: &Member) -> Result<bool>;

    /// Replaces everything but usage counters. Returns `false` if absent.
    fn update_member(&self, organization: &str, member: &Member) -> Result<bool>;

    fn delete_member(&self, organization: &str, username: &str) -> Result<bool>;

    fn count_members(&self, organization: &str) -> Result<usize>;

    /// Members whose username starts with `filter`, ordered by username.
    fn list_members(
        &self,
        organization: &str,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Member>>;

    fn swap_member_usage(
        &self,
        organization: &str,
        username: &str,
        expected: &MemberUsage,
        next: &MemberUsage,
    ) -> Result<bool>;

    // -- Tags --

    fn get_tag(&self, organization: &str, token: &str) -> Result<Option<Tag>>;

    /// Stores and indexes the tag. Returns `false` on a token collision.
    fn insert_tag(&self, organization: &str, tag: &Tag) -> Result<bool>;

    /// Removes the tag and its index entry. Returns `false` if already gone.
    fn delete_tag(&self, organization: &str, token: &str) -> Result<bool>;

    fn list_tag_index(&self, organization: &str) -> Result<Vec<TagIndexEntry>>;

    /// Drops index entries only; the tags themselves stay redeemable.
    fn unindex_tags(&self, organization: &str, tokens: &[String]) -> Result<()>;

    /// Deletes tags whose expiry is at or before `now`. Returns how many.
    fn purge_expired_tags(&self, organization: &str, now: DateTime<Utc>) -> Result<usize>;

    // -- Redemptions --

    /// Atomically adds one redemption and returns the new count.
    fn increment_redemption(
        &self,
        organization: &str,
        username: &str,
        period: RedemptionPeriod,
    ) -> Result<u64>;

    fn get_redemption(
        &self,
        organization: &str,
        username: &str,
        period: RedemptionPeriod,
    ) -> Result<Option<Redemption>>;

    fn list_redemptions(
        &self,
        organization: &str,
        period: RedemptionPeriod,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Redemption>>;

    fn total_redemptions(&self, organization: &str, period: RedemptionPeriod) -> Result<u64>;
}

type MemberKey = (String, String);
type RedemptionKey = (String, i32, u32, String);

#[derive(Default)]
struct Inner {
    organizations: HashMap<String, Organization>,
    members: BTreeMap<MemberKey, Member>,
    tags: HashMap<MemberKey, Tag>,
    tag_index: HashMap<String, BTreeMap<String, DateTime<Utc>>>,
    redemptions: BTreeMap<RedemptionKey, u64>,
}

/// `Store` held entirely in memory, used by tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_unindex: AtomicBool,
    reject_window_swaps: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `unindex_tags` fail, to exercise best-effort cleanup.
    pub fn set_unindex_failure(&self, fail: bool) {
        self.fail_unindex.store(fail, Ordering::Relaxed);
    }

    /// Make every `swap_tag_window` report a conflict, as if another
    /// writer always got there first.
    pub fn set_window_contention(&self, contended: bool) {
        self.reject_window_swaps.store(contended, Ordering::Relaxed);
    }

    fn with_inner<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Inner) -> Result<T>,
    {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| anyhow!("memory store lock poisoned: {}", e))?;
        f(&mut inner)
    }
}

fn key(organization: &str, name: &str) -> MemberKey {
    (organization.to_string(), name.to_string())
}

impl Store for MemoryStore {
    fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        self.with_inner(|inner| Ok(inner.organizations.get(name).cloned()))
    }

    fn insert_organization(&self, organization: &Organization) -> Result<bool> {
        self.with_inner(|inner| {
            if inner.organizations.contains_key(&organization.name) {
                return Ok(false);
            }
            inner
                .organizations
                .insert(organization.name.clone(), organization.clone());
            Ok(true)
        })
    }

    fn delete_organization(&self, name: &str) -> Result<()> {
        self.with_inner(|inner| {
            inner.organizations.remove(name);
            inner.members.retain(|(org, _), _| org != name);
            inner.tags.retain(|(org, _), _| org != name);
            inner.tag_index.remove(name);
            inner.redemptions.retain(|(org, ..), _| org != name);
            Ok(())
        })
    }

    fn list_organizations_by_owner(&self, owner: &str) -> Result<Vec<Organization>> {
        self.with_inner(|inner| {
            let mut owned: Vec<Organization> = inner
                .organizations
                .values()
                .filter(|org| org.owner == owner)
                .cloned()
                .collect();
            owned.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(owned)
        })
    }

    fn swap_tag_window(
        &self,
        organization: &str,
        expected: &QuotaCounter,
        next: &QuotaCounter,
    ) -> Result<bool> {
        if self.reject_window_swaps.load(Ordering::Relaxed) {
            return Ok(false);
        }
        self.with_inner(|inner| match inner.organizations.get_mut(organization) {
            Some(org) if org.tag_window == *expected => {
                org.tag_window = *next;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn set_subscription(&self, organization: &str, subscription: &Subscription) -> Result<()> {
        self.with_inner(|inner| {
            let org = inner
                .organizations
                .get_mut(organization)
                .ok_or_else(|| anyhow!("organization {} vanished", organization))?;
            org.subscription = *subscription;
            Ok(())
        })
    }

    fn set_instagram(
        &self,
        organization: &str,
        instagram: Option<&str>,
        challenge: Option<&InstagramChallenge>,
    ) -> Result<()> {
        self.with_inner(|inner| {
            let org = inner
                .organizations
                .get_mut(organization)
                .ok_or_else(|| anyhow!("organization {} vanished", organization))?;
            org.instagram = instagram.map(str::to_string);
            org.instagram_challenge = challenge.cloned();
            Ok(())
        })
    }

    fn get_member(&self, organization: &str, username: &str) -> Result<Option<Member>> {
        self.with_inner(|inner| Ok(inner.members.get(&key(organization, username)).cloned()))
    }

    fn insert_member(&self, organization: &str, member: &Member) -> Result<bool> {
        self.with_inner(|inner| {
            let k = key(organization, &member.username);
            if inner.members.contains_key(&k) {
                return Ok(false);
            }
            inner.members.insert(k, member.clone());
            Ok(true)
        })
    }

    fn update_member(&self, organization: &str, member: &Member) -> Result<bool> {
        self.with_inner(|inner| match inner.members.get_mut(&key(organization, &member.username)) {
            Some(stored) => {
                let usage = stored.usage;
                *stored = Member {
                    usage,
                    ..member.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        })
    }

    fn delete_member(&self, organization: &str, username: &str) -> Result<bool> {
        self.with_inner(|inner| Ok(inner.members.remove(&key(organization, username)).is_some()))
    }

    fn count_members(&self, organization: &str) -> Result<usize> {
        self.with_inner(|inner| {
            Ok(inner
                .members
                .keys()
                .filter(|(org, _)| org == organization)
                .count())
        })
    }

    fn list_members(
        &self,
        organization: &str,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Member>> {
        self.with_inner(|inner| {
            Ok(inner
                .members
                .iter()
                .filter(|((org, name), _)| org == organization && name.starts_with(filter))
                .skip(offset)
                .take(limit)
                .map(|(_, member)| member.clone())
                .collect())
        })
    }

    fn swap_member_usage(
        &self,
        organization: &str,
        username: &str,
        expected: &MemberUsage,
        next: &MemberUsage,
    ) -> Result<bool> {
        self.with_inner(|inner| match inner.members.get_mut(&key(organization, username)) {
            Some(member) if member.usage == *expected => {
                member.usage = *next;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn get_tag(&self, organization: &str, token: &str) -> Result<Option<Tag>> {
        self.with_inner(|inner| Ok(inner.tags.get(&key(organization, token)).cloned()))
    }

    fn insert_tag(&self, organization: &str, tag: &Tag) -> Result<bool> {
        self.with_inner(|inner| {
            let k = key(organization, &tag.token);
            if inner.tags.contains_key(&k) {
                return Ok(false);
            }
            inner.tags.insert(k, tag.clone());
            inner
                .tag_index
                .entry(organization.to_string())
                .or_default()
                .insert(tag.token.clone(), tag.created_at);
            Ok(true)
        })
    }

    fn delete_tag(&self, organization: &str, token: &str) -> Result<bool> {
        self.with_inner(|inner| {
            if let Some(index) = inner.tag_index.get_mut(organization) {
                index.remove(token);
            }
            Ok(inner.tags.remove(&key(organization, token)).is_some())
        })
    }

    fn list_tag_index(&self, organization: &str) -> Result<Vec<TagIndexEntry>> {
        self.with_inner(|inner| {
            Ok(inner
                .tag_index
                .get(organization)
                .map(|index| {
                    index
                        .iter()
                        .map(|(token, created_at)| TagIndexEntry {
                            token: token.clone(),
                            created_at: *created_at,
                        })
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn unindex_tags(&self, organization: &str, tokens: &[String]) -> Result<()> {
        if self.fail_unindex.load(Ordering::Relaxed) {
            return Err(anyhow!("tag index unavailable"));
        }
        self.with_inner(|inner| {
            if let Some(index) = inner.tag_index.get_mut(organization) {
                for token in tokens {
                    index.remove(token);
                }
            }
            Ok(())
        })
    }

    fn purge_expired_tags(&self, organization: &str, now: DateTime<Utc>) -> Result<usize> {
        self.with_inner(|inner| {
            let expired: Vec<MemberKey> = inner
                .tags
                .iter()
                .filter(|((org, _), tag)| org == organization && tag.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for k in &expired {
                inner.tags.remove(k);
                if let Some(index) = inner.tag_index.get_mut(organization) {
                    index.remove(&k.1);
                }
            }
            Ok(expired.len())
        })
    }

    fn increment_redemption(
        &self,
        organization: &str,
        username: &str,
        period: RedemptionPeriod,
    ) -> Result<u64> {
        self.with_inner(|inner| {
            let count = inner
                .redemptions
                .entry((
                    organization.to_string(),
                    period.year,
                    period.month,
                    username.to_string(),
                ))
                .or_insert(0);
            *count += 1;
            Ok(*count)
        })
    }

    fn get_redemption(
        &self,
        organization: &str,
        username: &str,
        period: RedemptionPeriod,
    ) -> Result<Option<Redemption>> {
        self.with_inner(|inner| {
            Ok(inner
                .redemptions
                .get(&(
                    organization.to_string(),
                    period.year,
                    period.month,
                    username.to_string(),
                ))
                .map(|count| Redemption {
                    username: username.to_string(),
                    period,
                    count: *count,
                }))
        })
    }

    fn list_redemptions(
        &self,
        organization: &str,
        period: RedemptionPeriod,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Redemption>> {
        self.with_inner(|inner| {
            Ok(inner
                .redemptions
                .iter()
                .filter(|((org, year, month, name), _)| {
                    org == organization
                        && *year == period.year
                        && *month == period.month
                        && name.starts_with(filter)
                })
                .skip(offset)
                .take(limit)
                .map(|((.., name), count)| Redemption {
                    username: name.clone(),
                    period,
                    count: *count,
                })
                .collect())
        })
    }

    fn total_redemptions(&self, organization: &str, period: RedemptionPeriod) -> Result<u64> {
        self.with_inner(|inner| {
            Ok(inner
                .redemptions
                .iter()
                .filter(|((org, year, month, _), _)| {
                    org == organization && *year == period.year && *month == period.month
                })
                .map(|(_, count)| *count)
                .sum())
        })
    }
}
