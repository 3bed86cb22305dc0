use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 1;

/// Timestamps are Unix milliseconds except `users.created_at`.
pub fn run(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS organizations (
            name                    TEXT PRIMARY KEY,
            owner                   TEXT NOT NULL,
            instagram               TEXT,
            challenge_code          TEXT,
            challenge_expires_at    INTEGER,
            created_at              INTEGER NOT NULL,
            renewed_at              INTEGER,
            expires_at              INTEGER,
            tag_count               INTEGER NOT NULL DEFAULT 0,
            tag_window_start        INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_organizations_owner
            ON organizations(owner, name);

        CREATE TABLE IF NOT EXISTS members (
            organization            TEXT NOT NULL REFERENCES organizations(name) ON DELETE CASCADE,
            username                TEXT NOT NULL,
            permissions             TEXT NOT NULL,
            tag_description         TEXT NOT NULL,
            tag_expiration_ms       INTEGER,
            tag_generation_limit    INTEGER,
            tag_count               INTEGER NOT NULL DEFAULT 0,
            window_start            INTEGER NOT NULL,
            total_tag_count         INTEGER NOT NULL DEFAULT 0,
            created_at              INTEGER NOT NULL,
            PRIMARY KEY (organization, username)
        );

        CREATE TABLE IF NOT EXISTS tags (
            organization    TEXT NOT NULL REFERENCES organizations(name) ON DELETE CASCADE,
            token           TEXT NOT NULL,
            description     TEXT NOT NULL,
            created_by      TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            expires_at      INTEGER,
            PRIMARY KEY (organization, token)
        );

        CREATE TABLE IF NOT EXISTS tag_index (
            organization    TEXT NOT NULL REFERENCES organizations(name) ON DELETE CASCADE,
            token           TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            PRIMARY KEY (organization, token)
        );

        CREATE TABLE IF NOT EXISTS redemptions (
            organization    TEXT NOT NULL REFERENCES organizations(name) ON DELETE CASCADE,
            year            INTEGER NOT NULL,
            month           INTEGER NOT NULL,
            username        TEXT NOT NULL,
            count           INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (organization, year, month, username)
        );

        CREATE TABLE IF NOT EXISTS ip_requests (
            ip_hash         TEXT PRIMARY KEY,
            count           INTEGER NOT NULL,
            window_start    INTEGER NOT NULL
        );
        ",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!(version = SCHEMA_VERSION, "Database migrations complete");
    Ok(())
}
