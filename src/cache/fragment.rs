//! Fragment cache over a shared [`CacheStore`].
//!
//! Invalidation is lazy: bumping a scope's generation counter makes every
//! key derived under the old generation unreachable. Orphaned entries stay
//! in the store until its own eviction reclaims them.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, GenerationScope};
use super::store::{CacheError, CacheStore};

pub(crate) const METRIC_HIT: &str = "vola_fragment_cache_hit_total";
pub(crate) const METRIC_MISS: &str = "vola_fragment_cache_miss_total";
pub(crate) const METRIC_GENERATION_BUMP: &str = "vola_fragment_cache_generation_bump_total";

pub struct FragmentCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl FragmentCache {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_shared(&self) -> bool {
        self.store.is_shared()
    }

    /// Cached value under `key`. Entries that no longer decode as `T` are
    /// treated as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let Some(bytes) = self.store.get(key.as_str()).await? else {
            counter!(METRIC_MISS).increment(1);
            debug!(key = %key, "Fragment cache miss");
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                counter!(METRIC_HIT).increment(1);
                debug!(key = %key, "Fragment cache hit");
                Ok(Some(value))
            }
            Err(err) => {
                counter!(METRIC_MISS).increment(1);
                warn!(key = %key, error = %err, "Discarding undecodable fragment");
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, falling back to the configured default TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Ok(());
        }
        let encoded = serde_json::to_vec(value)?;
        self.store
            .set(
                key.as_str(),
                Bytes::from(encoded),
                ttl.or_else(|| self.config.default_ttl()),
            )
            .await
    }

    /// Current generation of `scope`, seeding a random one when absent.
    ///
    /// Seeding uses store-if-absent so concurrent first readers converge on
    /// whichever seed landed first.
    pub async fn generation(&self, scope: &GenerationScope) -> Result<i64, CacheError> {
        let counter_key = scope.counter_key();
        if let Some(current) = self.read_counter(&counter_key).await? {
            return Ok(current);
        }

        let seed = self.random_seed();
        if self
            .store
            .add(&counter_key, Bytes::from(seed.to_string()), None)
            .await?
        {
            debug!(scope = %scope, generation = seed, "Seeded generation counter");
            return Ok(seed);
        }

        Ok(self.read_counter(&counter_key).await?.unwrap_or(seed))
    }

    /// Advance the generation of `scope`, orphaning every fragment cached
    /// under the previous one. Returns the new generation.
    pub async fn bump_generation(&self, scope: &GenerationScope) -> Result<i64, CacheError> {
        let counter_key = scope.counter_key();
        let next = match self.store.increment(&counter_key).await? {
            Some(next) => next,
            None => {
                let seed = self.random_seed();
                if self
                    .store
                    .add(&counter_key, Bytes::from(seed.to_string()), None)
                    .await?
                {
                    seed
                } else {
                    // Another writer seeded the counter in between; bump theirs.
                    self.store.increment(&counter_key).await?.unwrap_or(seed)
                }
            }
        };

        counter!(METRIC_GENERATION_BUMP).increment(1);
        debug!(scope = %scope, generation = next, "Bumped generation counter");
        Ok(next)
    }

    async fn read_counter(&self, counter_key: &str) -> Result<Option<i64>, CacheError> {
        let Some(bytes) = self.store.get(counter_key).await? else {
            return Ok(None);
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok())
            .map(Some)
            .ok_or_else(|| CacheError::NotAnInteger {
                key: counter_key.to_string(),
            })
    }

    fn random_seed(&self) -> i64 {
        i64::from(rand::rng().random_range(0..=self.config.generation_ceiling))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::cache::keys::KeyRequest;
    use crate::cache::store::MemoryStore;

    fn cache(config: CacheConfig) -> FragmentCache {
        let store = MemoryStore::new(NonZeroUsize::new(64).expect("non-zero"));
        FragmentCache::new(Arc::new(store), config)
    }

    /// Stands in for a store other processes read.
    struct SharedStore(MemoryStore);

    #[async_trait::async_trait]
    impl CacheStore for SharedStore {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
            self.0.set(key, value, ttl).await
        }

        async fn add(
            &self,
            key: &str,
            value: Bytes,
            ttl: Option<Duration>,
        ) -> Result<bool, CacheError> {
            self.0.add(key, value, ttl).await
        }

        async fn increment(&self, key: &str) -> Result<Option<i64>, CacheError> {
            self.0.increment(key).await
        }

        fn is_shared(&self) -> bool {
            true
        }
    }

    #[test]
    fn in_process_store_is_not_shared() {
        assert!(!cache(CacheConfig::default()).is_shared());

        let shared = SharedStore(MemoryStore::new(NonZeroUsize::new(8).expect("non-zero")));
        assert!(FragmentCache::new(Arc::new(shared), CacheConfig::default()).is_shared());
    }

    #[tokio::test]
    async fn generation_is_stable_until_bumped() {
        let cache = cache(CacheConfig::default());
        let scope = GenerationScope::new("home", "main");

        let first = cache.generation(&scope).await.expect("generation");
        assert!((0..=10_000).contains(&first));
        assert_eq!(cache.generation(&scope).await.expect("generation"), first);

        let bumped = cache.bump_generation(&scope).await.expect("bump");
        assert_eq!(bumped, first + 1);
        assert_eq!(cache.generation(&scope).await.expect("generation"), bumped);
    }

    #[tokio::test]
    async fn bump_on_absent_counter_seeds_it() {
        let cache = cache(CacheConfig {
            generation_ceiling: 0,
            ..Default::default()
        });
        let scope = GenerationScope::new("home", "main");
        assert_eq!(cache.bump_generation(&scope).await.expect("bump"), 0);
        assert_eq!(cache.bump_generation(&scope).await.expect("bump"), 1);
    }

    #[tokio::test]
    async fn bump_orphans_previous_keys() {
        let cache = cache(CacheConfig::default());
        let scope = GenerationScope::new("home", "main");
        let request = KeyRequest::new("volapluginlist", "home", "main");

        let before = request.compose(cache.generation(&scope).await.expect("generation"));
        cache.set(&before, &vec!["a".to_string()], None).await.expect("set");
        assert_eq!(
            cache.get::<Vec<String>>(&before).await.expect("get"),
            Some(vec!["a".to_string()])
        );

        cache.bump_generation(&scope).await.expect("bump");
        let after = request.compose(cache.generation(&scope).await.expect("generation"));
        assert_ne!(before, after);
        assert_eq!(cache.get::<Vec<String>>(&after).await.expect("get"), None);
    }

    #[tokio::test]
    async fn other_scopes_are_untouched_by_a_bump() {
        let cache = cache(CacheConfig::default());
        let main = GenerationScope::new("home", "main");
        let aside = GenerationScope::new("home", "aside");

        let aside_before = cache.generation(&aside).await.expect("generation");
        cache.bump_generation(&main).await.expect("bump");
        assert_eq!(cache.generation(&aside).await.expect("generation"), aside_before);
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = cache(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let key = KeyRequest::new("volaplugin", "home", "main").compose(1);
        cache.set(&key, "markup", None).await.expect("set");
        assert_eq!(cache.get::<String>(&key).await.expect("get"), None);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = cache(CacheConfig::default());
        let key = KeyRequest::new("volaplugin", "home", "main").compose(1);
        cache.set(&key, "markup", None).await.expect("set");
        assert_eq!(cache.get::<Vec<u32>>(&key).await.expect("get"), None);
    }
}
