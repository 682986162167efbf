//! External cache tier contract
//!
//! The engine only needs `GET` and `SETEX` from the shared store. Any error is treated as a
//! miss by the caller, so implementations should report failures rather than retry forever.

use crate::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shared key-value store with per-entry expiry
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Fetch the value stored under `key`, `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set_ex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError>;
}

struct StoredEntry {
    value: String,
    expires_at: Instant,
}

/// In-process implementation of [`RemoteCache`]
///
/// Useful for tests and for single-process deployments that still want TTL semantics.
/// Several engines can share one instance through an `Arc` to emulate a shared store.
pub struct InMemoryRemoteCache {
    entries: Mutex<HashMap<String, StoredEntry>>,
    max_entries: usize,
}

impl InMemoryRemoteCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryRemoteCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl RemoteCache for InMemoryRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.expires_at > now);
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            // Evict the entry closest to expiry
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
            }
        }
        entries.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
