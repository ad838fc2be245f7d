//! Plugin resolution: selector → ordered concrete plugins, and the plugin
//! types a group admits.

use std::sync::Arc;

use crate::application::error::AppError;
use crate::application::plugin::ConcretePlugin;
use crate::application::registry::{PluginRegistry, PluginTypeInfo};
use crate::application::repos::{ContentRepo, LanguageFilter};
use crate::domain::entities::{GroupRecord, StoredPlugin};
use crate::domain::filters::PluginFilter;

#[derive(Clone)]
pub struct PluginResolver {
    repo: Arc<dyn ContentRepo>,
    registry: Arc<PluginRegistry>,
}

impl PluginResolver {
    pub fn new(repo: Arc<dyn ContentRepo>, registry: Arc<PluginRegistry>) -> Self {
        Self { repo, registry }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Stored plugins of the selected group, ordered by position.
    pub async fn resolve_stored(
        &self,
        container_scope: &str,
        group_scope: &str,
        language: Option<&str>,
    ) -> Result<Vec<StoredPlugin>, AppError> {
        Ok(self
            .repo
            .list_scoped_plugins(
                container_scope,
                group_scope,
                LanguageFilter::from_option(language),
            )
            .await?)
    }

    /// Concrete plugin instances of the selected group, ordered by position.
    pub async fn resolve(
        &self,
        container_scope: &str,
        group_scope: &str,
        language: Option<&str>,
    ) -> Result<Vec<Box<dyn ConcretePlugin>>, AppError> {
        self.resolve_stored(container_scope, group_scope, language)
            .await?
            .into_iter()
            .map(|stored| self.instantiate(stored))
            .collect()
    }

    pub fn instantiate(&self, stored: StoredPlugin) -> Result<Box<dyn ConcretePlugin>, AppError> {
        Ok(self.registry.instantiate(stored)?)
    }

    /// Registered types the group's include/exclude lists admit, sorted by
    /// display name.
    pub fn available_plugin_types(&self, group: &GroupRecord) -> Vec<PluginTypeInfo> {
        let filter = PluginFilter::for_group(group);
        let mut types: Vec<PluginTypeInfo> = self
            .registry
            .kinds()
            .filter_map(|kind| {
                let key = kind.key();
                filter.allows(&key).then(|| PluginTypeInfo {
                    display_name: kind.display_name(),
                    app_label: key.app_label,
                    model_name: key.model_name,
                })
            })
            .collect();
        types.sort_by(|a, b| {
            a.display_name
                .cmp(b.display_name)
                .then_with(|| a.app_label.cmp(&b.app_label))
                .then_with(|| a.model_name.cmp(&b.model_name))
        });
        types
    }
}
