//! Credential store: key-value entries with expiration.
//!
//! The store is the only shared mutable state between the polling pipeline
//! and the query endpoint. Writes are unconditional upserts with a fixed
//! time-to-live - no read-before-write, no conflict detection. Last write
//! wins by design, which together with oldest-first processing guarantees
//! the most recent extraction persists.

use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

/// Time-to-live applied to every stored entry: 48 hours.
pub const ENTRY_TTL: Duration = Duration::from_secs(172_800);

/// Key-value store with per-entry expiration.
///
/// Single-key upsert and read are atomic in every implementation, which is
/// the only coordination the polling and query paths need.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Writes an entry, fully replacing any prior value and resetting its TTL.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Reads an entry; returns `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Redis-backed store using `SET key value EX ttl`.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis and returns a store handle.
    ///
    /// The underlying connection manager reconnects automatically on
    /// command failure, so a handle stays usable across Redis restarts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreConnect`] if the URL is invalid or the initial
    /// connection fails.
    #[instrument(name = "RedisStore::connect", skip_all)]
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|source| Error::StoreConnect { source })?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|source| Error::StoreConnect { source })?;

        debug!("Connected to store");

        Ok(Self { manager })
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
            .map_err(|source| Error::StoreWrite {
                key: key.to_string(),
                source,
            })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(|source| Error::StoreRead {
            key: key.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

/// In-memory store with lazy TTL expiry.
///
/// Used by tests and local development; honors the same upsert and
/// expiration contract as [`RedisStore`]. Expiry follows the tokio clock,
/// so paused-time tests can drive it deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, tokio::time::Instant)>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = tokio::time::Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match entries.get(key) {
            Some((value, deadline)) if *deadline > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_upsert_overwrites() {
        let store = MemoryStore::new();

        store.put("k", "old", ENTRY_TTL).await.unwrap();
        store.put("k", "new", ENTRY_TTL).await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_memory_store_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let store = MemoryStore::new();
        store.put("k", "v", ENTRY_TTL).await.unwrap();

        // Present one second before expiry.
        tokio::time::advance(ENTRY_TTL - Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        // Absent at T + 172801 seconds.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_ttl() {
        let store = MemoryStore::new();
        store.put("k", "v1", ENTRY_TTL).await.unwrap();

        tokio::time::advance(Duration::from_secs(100_000)).await;
        store.put("k", "v2", ENTRY_TTL).await.unwrap();

        // Past the original deadline but within the reset one.
        tokio::time::advance(Duration::from_secs(100_000)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }
}
