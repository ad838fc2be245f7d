//! Related-object dependencies of cached fragments.
//!
//! Some plugins render data owned by other parts of the application (a blog
//! entry, a product). Registering `entity -> scope` here lets a change to
//! that entity bump every scope whose fragments embed it.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use super::keys::GenerationScope;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::dependencies";

#[derive(Default)]
struct Links {
    entity_to_scopes: HashMap<String, BTreeSet<GenerationScope>>,
    scope_to_entities: HashMap<GenerationScope, BTreeSet<String>>,
}

/// Bidirectional entity ↔ scope map.
#[derive(Default)]
pub struct DependencyRegistry {
    links: RwLock<Links>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that fragments under `scope` depend on `entity`.
    pub fn register(&self, entity: impl Into<String>, scope: GenerationScope) {
        let entity = entity.into();
        let mut links = rw_write(&self.links, SOURCE, "register");
        links
            .entity_to_scopes
            .entry(entity.clone())
            .or_default()
            .insert(scope.clone());
        links
            .scope_to_entities
            .entry(scope)
            .or_default()
            .insert(entity);
    }

    pub fn scopes_for(&self, entity: &str) -> BTreeSet<GenerationScope> {
        rw_read(&self.links, SOURCE, "scopes_for")
            .entity_to_scopes
            .get(entity)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every dependency of a scope, e.g. after its group was deleted.
    pub fn forget_scope(&self, scope: &GenerationScope) {
        let mut links = rw_write(&self.links, SOURCE, "forget_scope");
        let Some(entities) = links.scope_to_entities.remove(scope) else {
            return;
        };
        for entity in entities {
            if let Some(scopes) = links.entity_to_scopes.get_mut(&entity) {
                scopes.remove(scope);
                if scopes.is_empty() {
                    links.entity_to_scopes.remove(&entity);
                }
            }
        }
    }

    pub fn entity_count(&self) -> usize {
        rw_read(&self.links, SOURCE, "entity_count")
            .entity_to_scopes
            .len()
    }

    pub fn scope_count(&self) -> usize {
        rw_read(&self.links, SOURCE, "scope_count")
            .scope_to_entities
            .len()
    }
}
