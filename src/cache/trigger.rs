//! Invalidation trigger.
//!
//! Write paths collect the scopes they touched into a [`ScopeSet`] and hand
//! it over after their transaction commits. Bumping before commit would let
//! a concurrent reader re-cache the old rows under the new generation.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{error, info};

use super::dependencies::DependencyRegistry;
use super::fragment::FragmentCache;
use super::keys::GenerationScope;

/// Scopes touched by one write operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<GenerationScope>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, container_scope: &str, group_scope: &str) {
        self.0
            .insert(GenerationScope::new(container_scope, group_scope));
    }

    pub fn extend(&mut self, other: ScopeSet) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, container_scope: &str, group_scope: &str) -> bool {
        self.0
            .contains(&GenerationScope::new(container_scope, group_scope))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationScope> {
        self.0.iter()
    }
}

pub struct InvalidationTrigger {
    cache: Arc<FragmentCache>,
    dependencies: Arc<DependencyRegistry>,
}

impl InvalidationTrigger {
    pub fn new(cache: Arc<FragmentCache>, dependencies: Arc<DependencyRegistry>) -> Self {
        Self {
            cache,
            dependencies,
        }
    }

    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.dependencies
    }

    /// Bump every scope in `scopes`. The writes are already durable, so a
    /// failed bump is logged rather than returned.
    pub async fn scopes_written(&self, scopes: &ScopeSet) {
        for scope in scopes.iter() {
            if let Err(err) = self.cache.bump_generation(scope).await {
                error!(scope = %scope, error = %err, "Failed to bump generation after write");
            }
        }
    }

    pub async fn group_written(&self, container_scope: &str, group_scope: &str) {
        let mut scopes = ScopeSet::new();
        scopes.insert(container_scope, group_scope);
        self.scopes_written(&scopes).await;
    }

    /// Bump every scope registered as depending on `entity`.
    pub async fn related_changed(&self, entity: &str) {
        let scopes = ScopeSet(self.dependencies.scopes_for(entity));
        info!(entity, scopes = scopes.len(), "Related object changed");
        self.scopes_written(&scopes).await;
    }
}
