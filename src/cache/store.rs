//! Key-value cache store seam and the in-process LRU implementation.
//!
//! The fragment cache only needs four primitives: `get`, `set`, `add`
//! (store-if-absent) and an atomic `increment`. Any shared store offering
//! them (memcached, Redis) can sit behind [`CacheStore`].

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
pub(crate) const METRIC_EVICT: &str = "vola_fragment_cache_evict_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("value under `{key}` is not an integer")]
    NotAnInteger { key: String },
    #[error("failed to encode cached value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn add(&self, key: &str, value: Bytes, ttl: Option<Duration>)
    -> Result<bool, CacheError>;

    /// Atomically add one to the integer under `key`, returning the new value,
    /// or `None` when the key is absent.
    async fn increment(&self, key: &str) -> Result<Option<i64>, CacheError>;

    /// Whether other processes read this store. Generation bumps written to
    /// a process-local store never reach readers elsewhere.
    fn is_shared(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process store with LRU eviction and per-entry expiry.
pub struct MemoryStore {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity_non_zero())
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(entries: &mut LruCache<String, Entry>, key: &str, entry: Entry) {
        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            if evicted != key {
                counter!(METRIC_EVICT).increment(1);
                debug!(key = %evicted, "Cache entry evicted for capacity");
            }
        }
    }

    /// Live entry under `key`, dropping it first if it has expired.
    fn live<'a>(entries: &'a mut LruCache<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let expired = entries
            .peek(key)
            .is_some_and(|entry| !entry.is_live(Instant::now()));
        if expired {
            entries.pop(key);
            return None;
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        Ok(Self::live(&mut entries, key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        Self::insert(&mut entries, key, Entry::new(value, ttl));
        Ok(())
    }

    async fn add(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "add");
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        Self::insert(&mut entries, key, Entry::new(value, ttl));
        Ok(true)
    }

    async fn increment(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "increment");
        let Some(entry) = Self::live(&mut entries, key) else {
            return Ok(None);
        };
        let current = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok())
            .ok_or_else(|| CacheError::NotAnInteger {
                key: key.to_string(),
            })?;
        let next = current.wrapping_add(1);
        entry.value = Bytes::from(next.to_string());
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn store(capacity: usize) -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[tokio::test]
    async fn add_only_stores_when_absent() {
        let store = store(4);
        assert!(store.add("k", Bytes::from_static(b"1"), None).await.expect("add"));
        assert!(!store.add("k", Bytes::from_static(b"2"), None).await.expect("add"));
        assert_eq!(store.get("k").await.expect("get"), Some(Bytes::from_static(b"1")));
    }

    #[tokio::test]
    async fn increment_absent_key_returns_none() {
        let store = store(4);
        assert_eq!(store.increment("missing").await.expect("incr"), None);
    }

    #[tokio::test]
    async fn increment_rejects_non_integer() {
        let store = store(4);
        store
            .set("k", Bytes::from_static(b"html"), None)
            .await
            .expect("set");
        assert!(matches!(
            store.increment("k").await,
            Err(CacheError::NotAnInteger { .. })
        ));
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let store = store(4);
        store
            .set("k", Bytes::from_static(b"v"), Some(Duration::ZERO))
            .await
            .expect("set");
        assert_eq!(store.get("k").await.expect("get"), None);
        assert!(store.add("k", Bytes::from_static(b"w"), None).await.expect("add"));
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let store = store(2);
        store.set("a", Bytes::from_static(b"1"), None).await.expect("set");
        store.set("b", Bytes::from_static(b"2"), None).await.expect("set");
        store.get("a").await.expect("get");
        store.set("c", Bytes::from_static(b"3"), None).await.expect("set");

        assert!(store.get("a").await.expect("get").is_some());
        assert!(store.get("b").await.expect("get").is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(store(4));
        store.set("gen", Bytes::from_static(b"0"), None).await.expect("set");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.increment("gen").await.expect("incr");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        assert_eq!(
            store.get("gen").await.expect("get"),
            Some(Bytes::from("400".to_string()))
        );
    }
}
