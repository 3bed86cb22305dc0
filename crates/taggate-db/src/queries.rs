use crate::Database;
use crate::models::{UserRow, from_millis, millis};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use taggate_types::window::QuotaCounter;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Throttling --

    /// Count one request from `ip_hash` in its hourly window. Returns the
    /// reset time instead when the window already holds `limit` requests.
    pub fn throttle_ip(
        &self,
        ip_hash: &str,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Option<DateTime<Utc>>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current = tx
                .query_row(
                    "SELECT count, window_start FROM ip_requests WHERE ip_hash = ?1",
                    [ip_hash],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            let mut counter = match current {
                Some((count, window_start)) => QuotaCounter {
                    count: u32::try_from(count)?,
                    window_start: from_millis(window_start)?,
                },
                None => QuotaCounter::new(now),
            };
            if let Err(full) = counter.check_and_increment(now, Some(limit)) {
                return Ok(Some(full.resets_at));
            }

            tx.execute(
                "INSERT INTO ip_requests (ip_hash, count, window_start) VALUES (?1, ?2, ?3)
                 ON CONFLICT(ip_hash) DO UPDATE SET count = excluded.count, window_start = excluded.window_start",
                rusqlite::params![ip_hash, counter.count, millis(counter.window_start)],
            )?;
            tx.commit()?;
            Ok(None)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600, 0).unwrap()
    }

    #[test]
    fn users_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("id-1", "alice", "hash").unwrap();
        let user = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(user.id, "id-1");
        assert_eq!(user.password, "hash");
        assert!(db.get_user_by_username("bob").unwrap().is_none());
        assert!(db.create_user("id-2", "alice", "hash").is_err());
    }

    #[test]
    fn throttle_ip_window() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.throttle_ip("h", t0(), 2).unwrap(), None);
        assert_eq!(db.throttle_ip("h", t0(), 2).unwrap(), None);
        assert_eq!(
            db.throttle_ip("h", t0(), 2).unwrap(),
            Some(t0() + TimeDelta::hours(1))
        );
        assert_eq!(db.throttle_ip("other", t0(), 2).unwrap(), None);
        assert_eq!(db.throttle_ip("h", t0() + TimeDelta::hours(1), 2).unwrap(), None);
    }
}
