//! Handoff store: an expiring key-value cache shared by the callback and the
//! poller.
//!
//! Only single-key semantics are relied on: read-your-last-write for one key,
//! per-key expiry, an atomic compare-and-replace and an atomic read-and-delete.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Errors from the handoff store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Expiring key-value store.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    /// Get a value by key. Returns `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value that expires after `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove a key and return its live value, as one step (`GETDEL`).
    /// Of several concurrent takes on one key, at most one sees the value.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value only if the live value currently equals `expected`.
    /// Returns `true` if the replacement happened.
    async fn replace_if(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory [`KvStore`] for single-process deployments and tests.
///
/// Expiry uses `tokio::time`, so paused-clock tests can move past TTLs.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Spawn a task that purges expired entries every `every`.
    pub fn spawn_janitor(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "handoff store janitor");
                }
            }
        })
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value))
    }

    async fn replace_if(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) && entry.value == expected => {
                entry.value = value.to_string();
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_get_take() {
        let store = MemoryKvStore::new();
        store.set("k", "v1", MIN).await.unwrap();
        store.set("k", "v2", MIN).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.take("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.take("k").await.unwrap(), None);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_cannot_be_taken() {
        let store = MemoryKvStore::new();
        store.set("k", "v", MIN).await.unwrap();
        tokio::time::advance(MIN).await;
        assert_eq!(store.take("k").await.unwrap(), None);
        assert_eq!(store.entries.read().await.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_see_value_once() {
        let store = MemoryKvStore::new();
        store.set("k", "v", MIN).await.unwrap();
        let takers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.take("k").await.unwrap() })
            })
            .collect();
        let mut seen = 0;
        for taker in takers {
            seen += usize::from(taker.await.unwrap().is_some());
        }
        assert_eq!(seen, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let store = MemoryKvStore::new();
        store.set("k", "v", MIN).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn replace_if_only_matches_expected() {
        let store = MemoryKvStore::new();
        assert!(!store.replace_if("k", "1", "x", MIN).await.unwrap());
        store.set("k", "1", MIN).await.unwrap();
        assert!(store.replace_if("k", "1", "x", MIN).await.unwrap());
        assert!(!store.replace_if("k", "1", "y", MIN).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn replace_if_resets_ttl() {
        let store = MemoryKvStore::new();
        store.set("k", "1", 5 * MIN).await.unwrap();
        tokio::time::advance(4 * MIN).await;
        assert!(store.replace_if("k", "1", "x", MIN).await.unwrap());
        tokio::time::advance(MIN).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_cannot_be_replaced() {
        let store = MemoryKvStore::new();
        store.set("k", "1", MIN).await.unwrap();
        tokio::time::advance(MIN).await;
        assert!(!store.replace_if("k", "1", "x", MIN).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn janitor_purges_in_background() {
        let store = MemoryKvStore::new();
        store.set("k", "v", MIN).await.unwrap();
        let janitor = store.spawn_janitor(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(store.entries.read().await.len(), 0);
        janitor.abort();
    }
}
