//! SQLite-backed HTTP response cache
//!
//! Stores the body of successful GET responses keyed by URL, with an absolute
//! expiry. A fresh entry is served instead of a network call, which also lets
//! the fetcher skip its politeness delay for the next request.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS http_responses (
    url         TEXT PRIMARY KEY,
    body        BLOB NOT NULL,
    fetched_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_http_responses_expires ON http_responses (expires_at);
"#;

pub struct ResponseCache {
    conn: Connection,
}

impl ResponseCache {
    /// Open (or create) the cache database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        log::debug!("Opened response cache at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Body for `url` if an entry exists that is still fresh at `now`.
    pub fn get_fresh(&self, url: &str, now: i64) -> Result<Option<Vec<u8>>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM http_responses WHERE url = ?1 AND expires_at > ?2",
                params![url, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// Store `body` for `url`, fresh for `ttl` from `now`.
    pub fn store(&self, url: &str, body: &[u8], now: i64, ttl: Duration) -> Result<()> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_secs);

        self.conn.execute(
            r#"
            INSERT INTO http_responses (url, body, fetched_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(url) DO UPDATE SET
                body = excluded.body,
                fetched_at = excluded.fetched_at,
                expires_at = excluded.expires_at
            "#,
            params![url, body, now, expires_at],
        )?;
        Ok(())
    }

    /// Drop entries that expired at or before `now`. Returns rows removed.
    pub fn purge_expired(&self, now: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM http_responses WHERE expires_at <= ?1", params![now])?;
        Ok(removed)
    }
}
