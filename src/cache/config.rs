//! Fragment cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 10_000;
const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_GENERATION_CEILING: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false, fragment lookups always miss and writes are skipped.
    /// Generation counters are still maintained.
    pub enabled: bool,
    /// Maximum entries held by the in-process store.
    pub capacity: usize,
    /// Expiry applied to fragments stored without an explicit TTL.
    /// `None` keeps them until evicted.
    pub default_ttl_seconds: Option<u64>,
    /// Fresh generation counters are drawn uniformly from `0..=ceiling`.
    pub generation_ceiling: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
            default_ttl_seconds: Some(DEFAULT_TTL_SECONDS),
            generation_ceiling: DEFAULT_GENERATION_CEILING,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity.get(),
            default_ttl_seconds: settings.default_ttl.map(|ttl| ttl.as_secs()),
            generation_ceiling: settings.generation_ceiling,
        }
    }
}

impl CacheConfig {
    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
