//! Fragment caching with generation-counter invalidation.
//!
//! - `keys`: fragment key layout and derivation
//! - `fragment`: typed get/set and per-scope generation counters
//! - `store`: the key-value store seam and its in-process LRU implementation
//! - `trigger`: post-commit invalidation of touched scopes
//! - `dependencies`: related-object → scope links

pub mod config;
pub mod dependencies;
pub mod fragment;
pub mod keys;
mod lock;
pub mod store;
pub mod trigger;

pub use config::CacheConfig;
pub use dependencies::DependencyRegistry;
pub use fragment::FragmentCache;
pub use keys::{CacheKey, CacheKeyDeriver, FragmentPurpose, GenerationScope, KeyRequest};
pub use store::{CacheError, CacheStore, MemoryStore};
pub use trigger::{InvalidationTrigger, ScopeSet};

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
