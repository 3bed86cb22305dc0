use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use taggate_core::Store;
use taggate_types::models::{
    InstagramChallenge, Member, MemberUsage, Organization, Redemption, RedemptionPeriod,
    Subscription, Tag, TagIndexEntry,
};
use taggate_types::window::QuotaCounter;

use crate::Database;
use crate::models::{MemberRow, OrganizationRow, TagRow, from_millis, millis};
use crate::queries::OptionalExt;

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Run an INSERT, mapping a key conflict to `false`.
fn inserted(result: rusqlite::Result<usize>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn to_i64(value: u64) -> Result<i64> {
    Ok(i64::try_from(value)?)
}

impl Store for Database {
    // -- Organizations --

    fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM organizations WHERE name = ?1",
                OrganizationRow::COLUMNS
            );
            conn.query_row(&sql, [name], OrganizationRow::from_row)
                .optional()?
                .map(OrganizationRow::into_model)
                .transpose()
        })
    }

    fn insert_organization(&self, organization: &Organization) -> Result<bool> {
        self.with_conn(|conn| {
            inserted(conn.execute(
                "INSERT INTO organizations (name, owner, created_at, tag_count, tag_window_start)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    organization.name,
                    organization.owner,
                    millis(organization.created_at),
                    organization.tag_window.count,
                    millis(organization.tag_window.window_start),
                ],
            ))
        })
    }

    fn delete_organization(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM organizations WHERE name = ?1", [name])?;
            Ok(())
        })
    }

    fn list_organizations_by_owner(&self, owner: &str) -> Result<Vec<Organization>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM organizations WHERE owner = ?1 ORDER BY name",
                OrganizationRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([owner], OrganizationRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(OrganizationRow::into_model).collect()
        })
    }

    fn swap_tag_window(
        &self,
        organization: &str,
        expected: &QuotaCounter,
        next: &QuotaCounter,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE organizations SET tag_count = ?1, tag_window_start = ?2
                 WHERE name = ?3 AND tag_count = ?4 AND tag_window_start = ?5",
                params![
                    next.count,
                    millis(next.window_start),
                    organization,
                    expected.count,
                    millis(expected.window_start),
                ],
            )?;
            Ok(changed == 1)
        })
    }

    fn set_subscription(&self, organization: &str, subscription: &Subscription) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE organizations SET renewed_at = ?1, expires_at = ?2 WHERE name = ?3",
                params![
                    subscription.last_renewal.map(millis),
                    subscription.expires_at.map(millis),
                    organization,
                ],
            )?;
            Ok(())
        })
    }

    fn set_instagram(
        &self,
        organization: &str,
        instagram: Option<&str>,
        challenge: Option<&InstagramChallenge>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE organizations
                 SET instagram = ?1, challenge_code = ?2, challenge_expires_at = ?3
                 WHERE name = ?4",
                params![
                    instagram,
                    challenge.map(|c| c.code.as_str()),
                    challenge.map(|c| millis(c.expires_at)),
                    organization,
                ],
            )?;
            Ok(())
        })
    }

    // -- Members --

    fn get_member(&self, organization: &str, username: &str) -> Result<Option<Member>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM members WHERE organization = ?1 AND username = ?2",
                MemberRow::COLUMNS
            );
            conn.query_row(&sql, [organization, username], MemberRow::from_row)
                .optional()?
                .map(MemberRow::into_model)
                .transpose()
        })
    }

    fn insert_member(&self, organization: &str, member: &Member) -> Result<bool> {
        let permissions = serde_json::to_string(&member.permissions)?;
        let limit = member.tag_generation_limit.map(to_i64).transpose()?;
        let total = to_i64(member.usage.total_tag_count)?;
        self.with_conn(|conn| {
            inserted(conn.execute(
                "INSERT INTO members (organization, username, permissions, tag_description,
                     tag_expiration_ms, tag_generation_limit, tag_count, window_start,
                     total_tag_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    organization,
                    member.username,
                    permissions,
                    member.tag_description,
                    member.tag_expiration_ms,
                    limit,
                    member.usage.window.count,
                    millis(member.usage.window.window_start),
                    total,
                    millis(member.created_at),
                ],
            ))
        })
    }

    fn update_member(&self, organization: &str, member: &Member) -> Result<bool> {
        let permissions = serde_json::to_string(&member.permissions)?;
        let limit = member.tag_generation_limit.map(to_i64).transpose()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE members SET permissions = ?1, tag_description = ?2,
                     tag_expiration_ms = ?3, tag_generation_limit = ?4
                 WHERE organization = ?5 AND username = ?6",
                params![
                    permissions,
                    member.tag_description,
                    member.tag_expiration_ms,
                    limit,
                    organization,
                    member.username,
                ],
            )?;
            Ok(changed == 1)
        })
    }

    fn delete_member(&self, organization: &str, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM members WHERE organization = ?1 AND username = ?2",
                [organization, username],
            )?;
            Ok(changed == 1)
        })
    }

    fn count_members(&self, organization: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM members WHERE organization = ?1",
                [organization],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count)?)
        })
    }

    fn list_members(
        &self,
        organization: &str,
        filter: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Member>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM members
                 WHERE organization = ?1 AND substr(username, 1, length(?2)) = ?2
                 ORDER BY username LIMIT ?3 OFFSET ?4",
                MemberRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![organization, filter, to_i64(limit as u64)?, to_i64(offset as u64)?],
                    MemberRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MemberRow::into_model).collect()
        })
    }

    fn swap_member_usage(
        &self,
        organization: &str,
        username: &str,
        expected: &MemberUsage,
        next: &MemberUsage,
    ) -> Result<bool> {
        let expected_total = to_i64(expected.total_tag_count)?;
        let next_total = to_i64(next.total_tag_count)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE members SET tag_count = ?1, window_start = ?2, total_tag_count = ?3
                 WHERE organization = ?4 AND username = ?5
                   AND tag_count = ?6 AND window_start = ?7 AND total_tag_count = ?8",
                params![
                    next.window.count,
                    millis(next.window.window_start),
                    next_total,
                    organization,
                    username,
                    expected.window.count,
                    millis(expected.window.window_start),
                    expected_total,
                ],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Tags --

    fn get_tag(&self, organization: &str, token: &str) -> Result<Option<Tag>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM tags WHERE organization = ?1 AND token = ?2",
                TagRow::COLUMNS
            );
            conn.query_row(&sql, [organization, token], TagRow::from_row)
                .optional()?
                .map(TagRow::into_model)
                .transpose()
        })
    }

    fn insert_tag(&self, organization: &str, tag: &Tag) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let stored = inserted(tx.execute(
                "INSERT INTO tags (organization, token, description, created_by, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    organization,
                    tag.token,
                    tag.description,
                    tag.created_by,
                    millis(tag.created_at),
                    tag.expires_at.map(millis),
                ],
            ))?;
            if !stored {
                return Ok(false);
            }
            tx.execute(
                "INSERT OR REPLACE INTO tag_index (organization, token, created_at) VALUES (?1, ?2, ?3)",
                params![organization, tag.token, millis(tag.created_at)],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    fn delete_tag(&self, organization: &str, token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let deleted = tx.execute(
                "DELETE FROM tags WHERE organization = ?1 AND token = ?2",
                [organization, token],
            )?;
            tx.execute(
                "DELETE FROM tag_index WHERE organization = ?1 AND token = ?2",
                [organization, token],
            )?;
            tx.commit()?;
            Ok(deleted == 1)
        })
    }

    fn list_tag_index(&self, organization: &str) -> Result<Vec<TagIndexEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token, created_at FROM tag_index WHERE organization = ?1 ORDER BY token",
            )?;
            let rows = stmt
                .query_map([organization], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(token, created_at)| {
                    Ok(TagIndexEntry {
                        token,
                        created_at: from_millis(created_at)?,
                    })
                })
                .collect()
        })
    }

    fn unindex_tags(&self, organization: &str, tokens: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("DELETE FROM tag_index WHERE organization = ?1 AND token = ?2")?;
                for token in tokens {
                    stmt.execute([organization, token.as_str()])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn purge_expired_tags(&self, organization: &str, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM tag_index WHERE organization = ?1 AND token IN (
                     SELECT token FROM tags
                     WHERE organization = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2)",
                params![organization, millis(now)],
            )?;
            let purged = tx.execute(
                "DELETE FROM tags
                 WHERE organization = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
                params![organization, millis(now)],
            )?;
            tx.commit()?;
            Ok(purged)
        })
    }

    // -- Redemptions --

    fn increment_redemption(
        &self,
        organization: &str,
        username: &str,
        period: RedemptionPeriod,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "INSERT INTO redemptions (organization, year, month, username, count)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT(organization, year, month, username) DO UPDATE SET count = count + 1
                 RETURNING count",
                params![organization, period.year, period.month, username],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count)?)
        })
    }

    fn get_redemption(
        &self,
        organization: &str,
        username: &str,
        period: RedemptionPeriod,
    ) -> Result<Option<Redemption>> {
        self.with_conn(|conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT count FROM redemptions
                     WHERE organization = ?1 AND year = ?2 AND month = ?3 AND username = ?4",
                    params![organization, period.year, period.month, username],
                    |row| row.get(0),
                )
                .optional()?;
            count
                .map(|count| {
                    Ok(Redemption {
                        username: username.to_string(),
                        period,
                        count: u64::try_from(count)?,
                    })
                })
                .transpose()
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
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, count FROM redemptions
                 WHERE organization = ?1 AND year = ?2 AND month = ?3
                   AND substr(username, 1, length(?4)) = ?4
                 ORDER BY username LIMIT ?5 OFFSET ?6",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        organization,
                        period.year,
                        period.month,
                        filter,
                        to_i64(limit as u64)?,
                        to_i64(offset as u64)?,
                    ],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(username, count)| {
                    Ok(Redemption {
                        username,
                        period,
                        count: u64::try_from(count)?,
                    })
                })
                .collect()
        })
    }

    fn total_redemptions(&self, organization: &str, period: RedemptionPeriod) -> Result<u64> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(count), 0) FROM redemptions
                 WHERE organization = ?1 AND year = ?2 AND month = ?3",
                params![organization, period.year, period.month],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(total)?)
        })
    }
}
