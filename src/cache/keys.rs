//! Fragment cache key derivation.
//!
//! A fragment key is `vola:{container}:{group}:{generation}:{purpose}:{item}:{args}`.
//! The generation component is the current counter of the
//! `(container, group)` scope, so bumping that counter moves every later
//! lookup to keys that were never written. The scopes themselves stay in the
//! key so two groups that happen to draw the same random generation never
//! share entries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::fragment::FragmentCache;
use super::store::CacheError;

const KEY_PREFIX: &str = "vola";

/// Purposes used by the render-tag lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentPurpose {
    PluginList,
    RenderedPluginList,
    DataPluginList,
    Plugin,
    RenderedPlugin,
    DataPlugin,
}

impl FragmentPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            FragmentPurpose::PluginList => "volapluginlist",
            FragmentPurpose::RenderedPluginList => "volarenderedpluginlist",
            FragmentPurpose::DataPluginList => "voladatapluginlist",
            FragmentPurpose::Plugin => "volaplugin",
            FragmentPurpose::RenderedPlugin => "volarenderedplugin",
            FragmentPurpose::DataPlugin => "voladataplugin",
        }
    }
}

impl fmt::Display for FragmentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(container_scope, group_scope)` pair a generation counter belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationScope {
    pub container: String,
    pub group: String,
}

impl GenerationScope {
    pub fn new(container: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            group: group.into(),
        }
    }

    /// Store key holding this scope's generation counter.
    pub fn counter_key(&self) -> String {
        format!("{KEY_PREFIX}:generation:{}:{}", self.container, self.group)
    }
}

impl fmt::Display for GenerationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    pub purpose: String,
    pub scope: GenerationScope,
    pub item_scope: Option<String>,
    /// Ordered by name, so call-site insertion order never matters.
    pub extra_args: BTreeMap<String, String>,
}

impl KeyRequest {
    pub fn new(
        purpose: impl Into<String>,
        container_scope: impl Into<String>,
        group_scope: impl Into<String>,
    ) -> Self {
        Self {
            purpose: purpose.into(),
            scope: GenerationScope::new(container_scope, group_scope),
            item_scope: None,
            extra_args: BTreeMap::new(),
        }
    }

    pub fn with_item(mut self, item_scope: impl Into<String>) -> Self {
        self.item_scope = Some(item_scope.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_args.insert(name.into(), value.into());
        self
    }

    pub fn with_args<I, K, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra_args
            .extend(args.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Key for this request under the given generation: the
    /// `generation:purpose:item:args` layout behind a `vola:{container}:{group}`
    /// prefix. The prefix keeps two scopes apart even when their random
    /// generations coincide. An absent item scope still occupies its field.
    pub fn compose(&self, generation: i64) -> CacheKey {
        let args = self
            .extra_args
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(":");
        CacheKey(format!(
            "{KEY_PREFIX}:{}:{}:{generation}:{}:{}:{args}",
            self.scope.container,
            self.scope.group,
            self.purpose,
            self.item_scope.as_deref().unwrap_or(""),
        ))
    }
}

/// Derives fragment keys against the live generation counters.
#[derive(Clone)]
pub struct CacheKeyDeriver {
    cache: Arc<FragmentCache>,
}

impl CacheKeyDeriver {
    pub fn new(cache: Arc<FragmentCache>) -> Self {
        Self { cache }
    }

    pub async fn derive(&self, request: &KeyRequest) -> Result<CacheKey, CacheError> {
        let generation = self.cache.generation(&request.scope).await?;
        let key = request.compose(generation);
        debug!(key = %key, scope = %request.scope, generation, "Derived fragment key");
        Ok(key)
    }
}
