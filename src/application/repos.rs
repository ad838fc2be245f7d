//! Repository traits describing persistence adapters.
//!
//! Reads go through [`ContentRepo`]. Every write happens inside a
//! [`ContentTx`] obtained from [`ContentRepo::begin`], so multi-row
//! operations commit or roll back as one unit.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    CategoryRecord, ContainerRecord, GroupRecord, LanguageRecord, PermissionRecord, StoredPlugin,
};
use crate::domain::types::Grantee;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn duplicate(constraint: impl Into<String>) -> Self {
        Self::Duplicate {
            constraint: constraint.into(),
        }
    }
}

/// Language filter applied when resolving plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFilter<'a> {
    /// Only plugins without a language.
    Unassigned,
    /// Only plugins of the named language.
    Named(&'a str),
}

impl<'a> LanguageFilter<'a> {
    pub fn from_option(language: Option<&'a str>) -> Self {
        match language {
            Some(name) => Self::Named(name),
            None => Self::Unassigned,
        }
    }
}

/// Which plugins of a container to list inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSelector {
    Ungrouped,
    Group(i64),
}

#[derive(Debug, Clone)]
pub struct NewContainer {
    pub name: String,
    pub slug: String,
    pub cache_key: String,
    pub category_id: Option<i64>,
    pub is_preview: bool,
    pub preview_url: Option<String>,
    pub transfer_timestamp: Option<OffsetDateTime>,
    pub transfer_target_id: Option<i64>,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub container_id: i64,
    pub name: String,
    pub slug: String,
    pub cache_key: String,
    pub description: String,
    pub plugins_include: String,
    pub plugins_exclude: String,
    pub validation: Option<String>,
    pub show_in_menu: bool,
    pub position: i32,
}

impl NewGroup {
    /// Copy of `group` owned by `container_id`.
    pub fn copy_of(group: &GroupRecord, container_id: i64) -> Self {
        Self {
            container_id,
            name: group.name.clone(),
            slug: group.slug.clone(),
            cache_key: group.cache_key.clone(),
            description: group.description.clone(),
            plugins_include: group.plugins_include.clone(),
            plugins_exclude: group.plugins_exclude.clone(),
            validation: group.validation.clone(),
            show_in_menu: group.show_in_menu,
            position: group.position,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPlugin {
    pub container_id: i64,
    pub group_id: Option<i64>,
    pub language_id: Option<i64>,
    pub app_label: String,
    pub model_name: String,
    pub lock_content: bool,
    pub lock_position: bool,
    pub position: i32,
    pub content: Value,
}

impl NewPlugin {
    /// Copy of `plugin` (base and extension fields) owned by the given
    /// container and group.
    pub fn copy_of(plugin: &StoredPlugin, container_id: i64, group_id: Option<i64>) -> Self {
        let record = &plugin.record;
        Self {
            container_id,
            group_id,
            language_id: record.language_id,
            app_label: record.app_label.clone(),
            model_name: record.model_name.clone(),
            lock_content: record.lock_content,
            lock_position: record.lock_position,
            position: record.position,
            content: plugin.content.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub container_id: i64,
    pub grantee: Grantee,
    pub manage_container: bool,
    pub manage_preview: bool,
    pub manage_plugins: bool,
}

impl NewPermission {
    /// Copy of `permission` re-pointed at `container_id`. Rows without a
    /// single grantee cannot be copied.
    pub fn copy_of(permission: &PermissionRecord, container_id: i64) -> Option<Self> {
        Some(Self {
            container_id,
            grantee: permission.grantee()?,
            manage_container: permission.manage_container,
            manage_preview: permission.manage_preview,
            manage_plugins: permission.manage_plugins,
        })
    }
}

/// Commit `tx` when `outcome` succeeded, otherwise roll it back and return
/// the original error.
pub async fn settle<T, E>(tx: Box<dyn ContentTx>, outcome: Result<T, E>) -> Result<T, E>
where
    E: From<RepoError>,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed after aborted unit of work");
            }
            Err(err)
        }
    }
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn find_container(&self, id: i64) -> Result<Option<ContainerRecord>, RepoError>;

    async fn find_container_by_slug(&self, slug: &str)
    -> Result<Option<ContainerRecord>, RepoError>;

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError>;

    async fn list_groups(&self, container_id: i64) -> Result<Vec<GroupRecord>, RepoError>;

    async fn list_permissions(&self, container_id: i64)
    -> Result<Vec<PermissionRecord>, RepoError>;

    async fn find_language_by_name(&self, name: &str)
    -> Result<Option<LanguageRecord>, RepoError>;

    /// Plugins of the group with scope `group_scope` inside the container
    /// with scope `container_scope`, ordered by position then identity.
    async fn list_scoped_plugins(
        &self,
        container_scope: &str,
        group_scope: &str,
        language: LanguageFilter<'_>,
    ) -> Result<Vec<StoredPlugin>, RepoError>;

    /// Plugins of a group filtered by language id, ordered by position.
    async fn list_group_plugins(
        &self,
        group_id: i64,
        language_id: Option<i64>,
    ) -> Result<Vec<StoredPlugin>, RepoError>;

    async fn begin(&self) -> Result<Box<dyn ContentTx>, RepoError>;
}

/// A unit of work. Dropping it without calling [`ContentTx::commit`]
/// discards every write made through it.
#[async_trait]
pub trait ContentTx: Send {
    /// Read a container and hold it against concurrent writers until the
    /// transaction ends.
    async fn lock_container(&mut self, id: i64) -> Result<Option<ContainerRecord>, RepoError>;

    async fn insert_container(&mut self, container: NewContainer)
    -> Result<ContainerRecord, RepoError>;

    async fn update_container(
        &mut self,
        container: &ContainerRecord,
    ) -> Result<ContainerRecord, RepoError>;

    /// Preview containers whose transfer target is `target_id`.
    async fn list_previews(&mut self, target_id: i64) -> Result<Vec<ContainerRecord>, RepoError>;

    /// Delete a container together with its groups, plugins, permissions and
    /// any previews targeting it.
    async fn delete_container(&mut self, id: i64) -> Result<bool, RepoError>;

    async fn list_permissions(
        &mut self,
        container_id: i64,
    ) -> Result<Vec<PermissionRecord>, RepoError>;

    async fn insert_permission(
        &mut self,
        permission: NewPermission,
    ) -> Result<PermissionRecord, RepoError>;

    async fn delete_permissions(&mut self, container_id: i64) -> Result<u64, RepoError>;

    async fn list_groups(&mut self, container_id: i64) -> Result<Vec<GroupRecord>, RepoError>;

    async fn insert_group(&mut self, group: NewGroup) -> Result<GroupRecord, RepoError>;

    async fn delete_groups(&mut self, container_id: i64) -> Result<u64, RepoError>;

    async fn list_plugins(
        &mut self,
        container_id: i64,
        selector: GroupSelector,
    ) -> Result<Vec<StoredPlugin>, RepoError>;

    async fn insert_plugin(&mut self, plugin: NewPlugin) -> Result<StoredPlugin, RepoError>;

    async fn update_plugin(&mut self, plugin: &StoredPlugin) -> Result<StoredPlugin, RepoError>;

    async fn delete_plugin(&mut self, id: i64) -> Result<bool, RepoError>;

    async fn delete_plugins(&mut self, container_id: i64) -> Result<u64, RepoError>;

    async fn insert_language(
        &mut self,
        name: &str,
        position: i32,
    ) -> Result<LanguageRecord, RepoError>;

    async fn insert_category(
        &mut self,
        name: &str,
        position: i32,
    ) -> Result<CategoryRecord, RepoError>;

    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}
