//! Shared SQLite-backed cache with per-entry TTL.
//!
//! Eviction is delegated to the store itself: every put writes an
//! `expires_at` timestamp, reads ignore expired rows, and
//! [`StoreCache::purge_expired`] reclaims them. Suitable for sharing
//! one cache across processes pointed at the same database file.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio_rusqlite::{Connection, params};

use crate::cache::DocumentCache;
use crate::cache::migrations;
use crate::error::Error;

/// SQLite store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct StoreCache {
    conn: Connection,
    ttl: Duration,
}

impl StoreCache {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, ttl).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory(ttl: Duration) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn, ttl).await
    }

    async fn init(conn: Connection, ttl: Duration) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 PRAGMA foreign_keys=ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, ttl })
    }

    /// Delete expired entries. Returns the number of deleted rows.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM documents WHERE expires_at < ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> Result<u64, Error> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM documents WHERE expires_at > ?1",
                        params![now],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait::async_trait]
impl DocumentCache for StoreCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT value FROM documents WHERE key = ?1 AND expires_at > ?2")?;

                let result = stmt.query_row(params![key, now], |row| row.get(0));

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(tokio_rusqlite::rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let size_bytes = value.len() as i64;

        let inserted_at = Utc::now().to_rfc3339();
        let expires_at = (Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero()))
            .to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO documents (key, value, size_bytes, inserted_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        size_bytes = excluded.size_bytes,
                        inserted_at = excluded.inserted_at,
                        expires_at = excluded.expires_at",
                    params![key, value, size_bytes, inserted_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
