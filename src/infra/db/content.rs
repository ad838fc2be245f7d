use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;

use crate::application::repos::{
    ContentRepo, ContentTx, GroupSelector, LanguageFilter, NewContainer, NewGroup, NewPermission,
    NewPlugin, RepoError,
};
use crate::domain::entities::{
    CategoryRecord, ContainerRecord, GroupRecord, LanguageRecord, PermissionRecord, PluginRecord,
    StoredPlugin,
};
use crate::domain::types::Grantee;

use super::{PostgresRepositories, map_sqlx_error};

const CONTAINER_COLUMNS: &str = "id, name, slug, cache_key, category_id, is_preview, preview_url, \
    transfer_timestamp, transfer_target_id, position, created_at, updated_at";

const GROUP_COLUMNS: &str = "id, container_id, name, slug, cache_key, description, \
    plugins_include, plugins_exclude, validation, show_in_menu, position, created_at, updated_at";

const PERMISSION_COLUMNS: &str = "id, container_id, user_id, user_group_id, manage_container, \
    manage_preview, manage_plugins, created_at, updated_at";

const PLUGIN_SELECT: &str = "SELECT p.id, p.container_id, p.group_id, p.language_id, \
    p.app_label, p.model_name, p.lock_content, p.lock_position, p.position, p.created_at, \
    p.updated_at, COALESCE(pc.content, '{}'::jsonb) AS content \
    FROM plugins p LEFT JOIN plugin_contents pc ON pc.plugin_id = p.id";

#[derive(sqlx::FromRow)]
struct LanguageRow {
    id: i64,
    name: String,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<LanguageRow> for LanguageRecord {
    fn from(row: LanguageRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContainerRow {
    id: i64,
    name: String,
    slug: String,
    cache_key: String,
    category_id: Option<i64>,
    is_preview: bool,
    preview_url: Option<String>,
    transfer_timestamp: Option<OffsetDateTime>,
    transfer_target_id: Option<i64>,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ContainerRow> for ContainerRecord {
    fn from(row: ContainerRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            cache_key: row.cache_key,
            category_id: row.category_id,
            is_preview: row.is_preview,
            preview_url: row.preview_url,
            transfer_timestamp: row.transfer_timestamp,
            transfer_target_id: row.transfer_target_id,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    container_id: i64,
    name: String,
    slug: String,
    cache_key: String,
    description: String,
    plugins_include: String,
    plugins_exclude: String,
    validation: Option<String>,
    show_in_menu: bool,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<GroupRow> for GroupRecord {
    fn from(row: GroupRow) -> Self {
        Self {
            id: row.id,
            container_id: row.container_id,
            name: row.name,
            slug: row.slug,
            cache_key: row.cache_key,
            description: row.description,
            plugins_include: row.plugins_include,
            plugins_exclude: row.plugins_exclude,
            validation: row.validation,
            show_in_menu: row.show_in_menu,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PluginRow {
    id: i64,
    container_id: i64,
    group_id: Option<i64>,
    language_id: Option<i64>,
    app_label: String,
    model_name: String,
    lock_content: bool,
    lock_position: bool,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    content: Value,
}

impl From<PluginRow> for StoredPlugin {
    fn from(row: PluginRow) -> Self {
        Self {
            record: PluginRecord {
                id: row.id,
                container_id: row.container_id,
                group_id: row.group_id,
                language_id: row.language_id,
                app_label: row.app_label,
                model_name: row.model_name,
                lock_content: row.lock_content,
                lock_position: row.lock_position,
                position: row.position,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            content: row.content,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: i64,
    container_id: i64,
    user_id: Option<i64>,
    user_group_id: Option<i64>,
    manage_container: bool,
    manage_preview: bool,
    manage_plugins: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PermissionRow> for PermissionRecord {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: row.id,
            container_id: row.container_id,
            user_id: row.user_id,
            user_group_id: row.user_group_id,
            manage_container: row.manage_container,
            manage_preview: row.manage_preview,
            manage_plugins: row.manage_plugins,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn find_container(&self, id: i64) -> Result<Option<ContainerRecord>, RepoError> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(ContainerRecord::from))
    }

    async fn find_container_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ContainerRecord>, RepoError> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(ContainerRecord::from))
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM content_groups WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(GroupRecord::from))
    }

    async fn list_groups(&self, container_id: i64) -> Result<Vec<GroupRecord>, RepoError> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM content_groups WHERE container_id = $1 \
             ORDER BY position, id"
        ))
        .bind(container_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(GroupRecord::from).collect())
    }

    async fn list_permissions(
        &self,
        container_id: i64,
    ) -> Result<Vec<PermissionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM container_permissions WHERE container_id = $1 \
             ORDER BY id"
        ))
        .bind(container_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PermissionRecord::from).collect())
    }

    async fn find_language_by_name(
        &self,
        name: &str,
    ) -> Result<Option<LanguageRecord>, RepoError> {
        let row = sqlx::query_as::<_, LanguageRow>(
            "SELECT id, name, position, created_at, updated_at FROM languages WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(LanguageRecord::from))
    }

    async fn list_scoped_plugins(
        &self,
        container_scope: &str,
        group_scope: &str,
        language: LanguageFilter<'_>,
    ) -> Result<Vec<StoredPlugin>, RepoError> {
        let language = match language {
            LanguageFilter::Unassigned => None,
            LanguageFilter::Named(name) => Some(name),
        };
        let rows = sqlx::query_as::<_, PluginRow>(&format!(
            "{PLUGIN_SELECT} \
             INNER JOIN containers c ON c.id = p.container_id \
             INNER JOIN content_groups g ON g.id = p.group_id AND g.container_id = c.id \
             LEFT JOIN languages l ON l.id = p.language_id \
             WHERE c.cache_key = $1 AND g.cache_key = $2 \
               AND (($3::text IS NULL AND p.language_id IS NULL) OR l.name = $3) \
             ORDER BY p.position, p.id"
        ))
        .bind(container_scope)
        .bind(group_scope)
        .bind(language)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(StoredPlugin::from).collect())
    }

    async fn list_group_plugins(
        &self,
        group_id: i64,
        language_id: Option<i64>,
    ) -> Result<Vec<StoredPlugin>, RepoError> {
        let rows = sqlx::query_as::<_, PluginRow>(&format!(
            "{PLUGIN_SELECT} WHERE p.group_id = $1 AND p.language_id IS NOT DISTINCT FROM $2 \
             ORDER BY p.position, p.id"
        ))
        .bind(group_id)
        .bind(language_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(StoredPlugin::from).collect())
    }

    async fn begin(&self) -> Result<Box<dyn ContentTx>, RepoError> {
        let tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgContentTx { tx }))
    }
}

/// A Postgres transaction behind [`ContentTx`]. Dropping it without a
/// commit rolls back.
pub struct PgContentTx {
    tx: Transaction<'static, Postgres>,
}

impl PgContentTx {
    async fn upsert_content(&mut self, plugin_id: i64, content: &Value) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO plugin_contents (plugin_id, content) VALUES ($1, $2) \
             ON CONFLICT (plugin_id) DO UPDATE SET content = EXCLUDED.content",
        )
        .bind(plugin_id)
        .bind(content)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn fetch_plugin(&mut self, id: i64) -> Result<StoredPlugin, RepoError> {
        let row = sqlx::query_as::<_, PluginRow>(&format!("{PLUGIN_SELECT} WHERE p.id = $1"))
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }
}

#[async_trait]
impl ContentTx for PgContentTx {
    async fn lock_container(&mut self, id: i64) -> Result<Option<ContainerRecord>, RepoError> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(ContainerRecord::from))
    }

    async fn insert_container(
        &mut self,
        container: NewContainer,
    ) -> Result<ContainerRecord, RepoError> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            "INSERT INTO containers (name, slug, cache_key, category_id, is_preview, preview_url, \
             transfer_timestamp, transfer_target_id, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {CONTAINER_COLUMNS}"
        ))
        .bind(container.name)
        .bind(container.slug)
        .bind(container.cache_key)
        .bind(container.category_id)
        .bind(container.is_preview)
        .bind(container.preview_url)
        .bind(container.transfer_timestamp)
        .bind(container.transfer_target_id)
        .bind(container.position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_container(
        &mut self,
        container: &ContainerRecord,
    ) -> Result<ContainerRecord, RepoError> {
        let row = sqlx::query_as::<_, ContainerRow>(&format!(
            "UPDATE containers SET name = $2, slug = $3, cache_key = $4, category_id = $5, \
             is_preview = $6, preview_url = $7, transfer_timestamp = $8, \
             transfer_target_id = $9, position = $10, updated_at = now() \
             WHERE id = $1 RETURNING {CONTAINER_COLUMNS}"
        ))
        .bind(container.id)
        .bind(&container.name)
        .bind(&container.slug)
        .bind(&container.cache_key)
        .bind(container.category_id)
        .bind(container.is_preview)
        .bind(&container.preview_url)
        .bind(container.transfer_timestamp)
        .bind(container.transfer_target_id)
        .bind(container.position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn list_previews(&mut self, target_id: i64) -> Result<Vec<ContainerRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ContainerRow>(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers \
             WHERE is_preview AND transfer_target_id = $1 AND id <> $1 ORDER BY id"
        ))
        .bind(target_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ContainerRecord::from).collect())
    }

    async fn delete_container(&mut self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM containers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_permissions(
        &mut self,
        container_id: i64,
    ) -> Result<Vec<PermissionRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM container_permissions WHERE container_id = $1 \
             ORDER BY id"
        ))
        .bind(container_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PermissionRecord::from).collect())
    }

    async fn insert_permission(
        &mut self,
        permission: NewPermission,
    ) -> Result<PermissionRecord, RepoError> {
        let (user_id, user_group_id) = match permission.grantee {
            Grantee::User(id) => (Some(id), None),
            Grantee::UserGroup(id) => (None, Some(id)),
        };
        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            "INSERT INTO container_permissions (container_id, user_id, user_group_id, \
             manage_container, manage_preview, manage_plugins) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(permission.container_id)
        .bind(user_id)
        .bind(user_group_id)
        .bind(permission.manage_container)
        .bind(permission.manage_preview)
        .bind(permission.manage_plugins)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn delete_permissions(&mut self, container_id: i64) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM container_permissions WHERE container_id = $1")
            .bind(container_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list_groups(&mut self, container_id: i64) -> Result<Vec<GroupRecord>, RepoError> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {GROUP_COLUMNS} FROM content_groups WHERE container_id = $1 \
             ORDER BY position, id"
        ))
        .bind(container_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(GroupRecord::from).collect())
    }

    async fn insert_group(&mut self, group: NewGroup) -> Result<GroupRecord, RepoError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "INSERT INTO content_groups (container_id, name, slug, cache_key, description, \
             plugins_include, plugins_exclude, validation, show_in_menu, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {GROUP_COLUMNS}"
        ))
        .bind(group.container_id)
        .bind(group.name)
        .bind(group.slug)
        .bind(group.cache_key)
        .bind(group.description)
        .bind(group.plugins_include)
        .bind(group.plugins_exclude)
        .bind(group.validation)
        .bind(group.show_in_menu)
        .bind(group.position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn delete_groups(&mut self, container_id: i64) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM content_groups WHERE container_id = $1")
            .bind(container_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn list_plugins(
        &mut self,
        container_id: i64,
        selector: GroupSelector,
    ) -> Result<Vec<StoredPlugin>, RepoError> {
        let group_id = match selector {
            GroupSelector::Ungrouped => None,
            GroupSelector::Group(id) => Some(id),
        };
        let rows = sqlx::query_as::<_, PluginRow>(&format!(
            "{PLUGIN_SELECT} WHERE p.container_id = $1 AND p.group_id IS NOT DISTINCT FROM $2 \
             ORDER BY p.position, p.id"
        ))
        .bind(container_id)
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(StoredPlugin::from).collect())
    }

    async fn insert_plugin(&mut self, plugin: NewPlugin) -> Result<StoredPlugin, RepoError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO plugins (container_id, group_id, language_id, app_label, model_name, \
             lock_content, lock_position, position) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(plugin.container_id)
        .bind(plugin.group_id)
        .bind(plugin.language_id)
        .bind(&plugin.app_label)
        .bind(&plugin.model_name)
        .bind(plugin.lock_content)
        .bind(plugin.lock_position)
        .bind(plugin.position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        self.upsert_content(id, &plugin.content).await?;
        self.fetch_plugin(id).await
    }

    async fn update_plugin(&mut self, plugin: &StoredPlugin) -> Result<StoredPlugin, RepoError> {
        let record = &plugin.record;
        let result = sqlx::query(
            "UPDATE plugins SET group_id = $2, language_id = $3, app_label = $4, \
             model_name = $5, lock_content = $6, lock_position = $7, position = $8, \
             updated_at = now() WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.group_id)
        .bind(record.language_id)
        .bind(&record.app_label)
        .bind(&record.model_name)
        .bind(record.lock_content)
        .bind(record.lock_position)
        .bind(record.position)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        self.upsert_content(record.id, &plugin.content).await?;
        self.fetch_plugin(record.id).await
    }

    async fn delete_plugin(&mut self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM plugins WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_plugins(&mut self, container_id: i64) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM plugins WHERE container_id = $1")
            .bind(container_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn insert_language(
        &mut self,
        name: &str,
        position: i32,
    ) -> Result<LanguageRecord, RepoError> {
        let row = sqlx::query_as::<_, LanguageRow>(
            "INSERT INTO languages (name, position) VALUES ($1, $2) \
             RETURNING id, name, position, created_at, updated_at",
        )
        .bind(name)
        .bind(position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn insert_category(
        &mut self,
        name: &str,
        position: i32,
    ) -> Result<CategoryRecord, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO categories (name, position) VALUES ($1, $2) \
             RETURNING id, name, position, created_at, updated_at",
        )
        .bind(name)
        .bind(position)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
