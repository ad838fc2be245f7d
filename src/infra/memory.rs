//! In-process content repositories.
//!
//! Committed state sits behind a lock; a transaction works on its own copy
//! and publishes it on commit. Transactions are serialised by a writer gate
//! held for the transaction's lifetime, so a commit never overwrites another
//! transaction's writes. The same uniqueness, reference and preview-state
//! constraints as the relational schema are enforced on every write.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::application::repos::{
    ContentRepo, ContentTx, GroupSelector, LanguageFilter, NewContainer, NewGroup, NewPermission,
    NewPlugin, RepoError,
};
use crate::cache::{mutex_lock, rw_read, rw_write};
use crate::domain::entities::{
    CategoryRecord, ContainerRecord, GroupRecord, LanguageRecord, PermissionRecord, PluginRecord,
    StoredPlugin, check_preview_state,
};
use crate::domain::types::Grantee;

const SOURCE: &str = "infra::memory";

#[derive(Debug, Clone, Default)]
struct State {
    last_id: i64,
    languages: BTreeMap<i64, LanguageRecord>,
    categories: BTreeMap<i64, CategoryRecord>,
    containers: BTreeMap<i64, ContainerRecord>,
    groups: BTreeMap<i64, GroupRecord>,
    plugins: BTreeMap<i64, StoredPlugin>,
    permissions: BTreeMap<i64, PermissionRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    plugin_inserts_before_failure: Option<usize>,
}

pub struct MemoryContentRepo {
    state: Arc<RwLock<State>>,
    writer: Arc<AsyncMutex<()>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryContentRepo {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            writer: Arc::new(AsyncMutex::new(())),
            faults: Arc::new(Mutex::new(Faults::default())),
        }
    }

    /// Make every later transaction fail on its plugin insert after `count`
    /// successful ones.
    pub fn fail_plugin_inserts_after(&self, count: usize) {
        mutex_lock(&self.faults, SOURCE, "fail_plugin_inserts_after")
            .plugin_inserts_before_failure = Some(count);
    }

    pub fn clear_faults(&self) {
        *mutex_lock(&self.faults, SOURCE, "clear_faults") = Faults::default();
    }

    pub fn container_count(&self) -> usize {
        rw_read(&self.state, SOURCE, "container_count")
            .containers
            .len()
    }

    pub fn plugin_count(&self) -> usize {
        rw_read(&self.state, SOURCE, "plugin_count").plugins.len()
    }
}

impl Default for MemoryContentRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentRepo for MemoryContentRepo {
    async fn find_container(&self, id: i64) -> Result<Option<ContainerRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_container")
            .containers
            .get(&id)
            .cloned())
    }

    async fn find_container_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ContainerRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_container_by_slug")
            .containers
            .values()
            .find(|container| container.slug == slug)
            .cloned())
    }

    async fn find_group(&self, id: i64) -> Result<Option<GroupRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_group")
            .groups
            .get(&id)
            .cloned())
    }

    async fn list_groups(&self, container_id: i64) -> Result<Vec<GroupRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "list_groups").groups_of(container_id))
    }

    async fn list_permissions(
        &self,
        container_id: i64,
    ) -> Result<Vec<PermissionRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "list_permissions").permissions_of(container_id))
    }

    async fn find_language_by_name(
        &self,
        name: &str,
    ) -> Result<Option<LanguageRecord>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_language_by_name")
            .languages
            .values()
            .find(|language| language.name == name)
            .cloned())
    }

    async fn list_scoped_plugins(
        &self,
        container_scope: &str,
        group_scope: &str,
        language: LanguageFilter<'_>,
    ) -> Result<Vec<StoredPlugin>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "list_scoped_plugins");
        let Some(container) = state
            .containers
            .values()
            .find(|container| container.cache_key == container_scope)
        else {
            return Ok(Vec::new());
        };
        let Some(group) = state
            .groups
            .values()
            .find(|group| group.container_id == container.id && group.cache_key == group_scope)
        else {
            return Ok(Vec::new());
        };
        let language_id = match language {
            LanguageFilter::Unassigned => None,
            LanguageFilter::Named(name) => {
                match state.languages.values().find(|lang| lang.name == name) {
                    Some(language) => Some(language.id),
                    None => return Ok(Vec::new()),
                }
            }
        };
        Ok(state.plugins_where(|record| {
            record.container_id == container.id
                && record.group_id == Some(group.id)
                && record.language_id == language_id
        }))
    }

    async fn list_group_plugins(
        &self,
        group_id: i64,
        language_id: Option<i64>,
    ) -> Result<Vec<StoredPlugin>, RepoError> {
        Ok(
            rw_read(&self.state, SOURCE, "list_group_plugins").plugins_where(|record| {
                record.group_id == Some(group_id) && record.language_id == language_id
            }),
        )
    }

    async fn begin(&self) -> Result<Box<dyn ContentTx>, RepoError> {
        let gate = Arc::clone(&self.writer).lock_owned().await;
        let working = rw_read(&self.state, SOURCE, "begin").clone();
        let fail_after = mutex_lock(&self.faults, SOURCE, "begin").plugin_inserts_before_failure;
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.state),
            working,
            plugin_inserts_left: fail_after,
            _gate: gate,
        }))
    }
}

pub struct MemoryTx {
    shared: Arc<RwLock<State>>,
    working: State,
    plugin_inserts_left: Option<usize>,
    _gate: OwnedMutexGuard<()>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn groups_of(&self, container_id: i64) -> Vec<GroupRecord> {
        let mut groups: Vec<GroupRecord> = self
            .groups
            .values()
            .filter(|group| group.container_id == container_id)
            .cloned()
            .collect();
        groups.sort_by_key(|group| (group.position, group.id));
        groups
    }

    fn permissions_of(&self, container_id: i64) -> Vec<PermissionRecord> {
        self.permissions
            .values()
            .filter(|permission| permission.container_id == container_id)
            .cloned()
            .collect()
    }

    fn plugins_where(&self, predicate: impl Fn(&PluginRecord) -> bool) -> Vec<StoredPlugin> {
        let mut plugins: Vec<StoredPlugin> = self
            .plugins
            .values()
            .filter(|plugin| predicate(&plugin.record))
            .cloned()
            .collect();
        plugins.sort_by_key(|plugin| (plugin.record.position, plugin.record.id));
        plugins
    }

    fn check_container(&self, container: &ContainerRecord) -> Result<(), RepoError> {
        check_preview_state(
            container.is_preview,
            container.transfer_target_id,
            container.transfer_timestamp,
        )
        .map_err(|err| RepoError::Integrity {
            message: err.to_string(),
        })?;

        for other in self.containers.values().filter(|c| c.id != container.id) {
            if other.name == container.name {
                return Err(RepoError::duplicate("containers_name_key"));
            }
            if other.slug == container.slug {
                return Err(RepoError::duplicate("containers_slug_key"));
            }
            if other.cache_key == container.cache_key {
                return Err(RepoError::duplicate("containers_cache_key_key"));
            }
        }
        if let Some(target) = container.transfer_target_id {
            if target != container.id && !self.containers.contains_key(&target) {
                return Err(missing_reference("transfer target", target));
            }
        }
        if let Some(category) = container.category_id {
            if !self.categories.contains_key(&category) {
                return Err(missing_reference("category", category));
            }
        }
        Ok(())
    }

    fn check_plugin(&self, record: &PluginRecord) -> Result<(), RepoError> {
        if !self.containers.contains_key(&record.container_id) {
            return Err(missing_reference("container", record.container_id));
        }
        if let Some(group_id) = record.group_id {
            match self.groups.get(&group_id) {
                Some(group) if group.container_id == record.container_id => {}
                _ => return Err(missing_reference("group", group_id)),
            }
        }
        if let Some(language) = record.language_id {
            if !self.languages.contains_key(&language) {
                return Err(missing_reference("language", language));
            }
        }
        Ok(())
    }

    /// Remove `ids` and everything they own.
    fn remove_containers(&mut self, ids: &[i64]) {
        self.permissions
            .retain(|_, permission| !ids.contains(&permission.container_id));
        self.plugins
            .retain(|_, plugin| !ids.contains(&plugin.record.container_id));
        self.groups.retain(|_, group| !ids.contains(&group.container_id));
        self.containers.retain(|id, _| !ids.contains(id));
    }
}

fn missing_reference(entity: &str, id: i64) -> RepoError {
    RepoError::InvalidInput {
        message: format!("{entity} {id} does not exist"),
    }
}

fn grantee_columns(grantee: Grantee) -> (Option<i64>, Option<i64>) {
    match grantee {
        Grantee::User(id) => (Some(id), None),
        Grantee::UserGroup(id) => (None, Some(id)),
    }
}

#[async_trait]
impl ContentTx for MemoryTx {
    async fn lock_container(&mut self, id: i64) -> Result<Option<ContainerRecord>, RepoError> {
        Ok(self.working.containers.get(&id).cloned())
    }

    async fn insert_container(
        &mut self,
        container: NewContainer,
    ) -> Result<ContainerRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = ContainerRecord {
            id: self.working.last_id + 1,
            name: container.name,
            slug: container.slug,
            cache_key: container.cache_key,
            category_id: container.category_id,
            is_preview: container.is_preview,
            preview_url: container.preview_url,
            transfer_timestamp: container.transfer_timestamp,
            transfer_target_id: container.transfer_target_id,
            position: container.position,
            created_at: now,
            updated_at: now,
        };
        self.working.check_container(&record)?;
        let id = self.working.next_id();
        self.working.containers.insert(id, record.clone());
        Ok(record)
    }

    async fn update_container(
        &mut self,
        container: &ContainerRecord,
    ) -> Result<ContainerRecord, RepoError> {
        let created_at = self
            .working
            .containers
            .get(&container.id)
            .map(|current| current.created_at)
            .ok_or(RepoError::NotFound)?;
        let mut record = container.clone();
        record.created_at = created_at;
        record.updated_at = OffsetDateTime::now_utc();
        self.working.check_container(&record)?;
        self.working.containers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list_previews(&mut self, target_id: i64) -> Result<Vec<ContainerRecord>, RepoError> {
        Ok(self
            .working
            .containers
            .values()
            .filter(|c| {
                c.is_preview && c.id != target_id && c.transfer_target_id == Some(target_id)
            })
            .cloned()
            .collect())
    }

    async fn delete_container(&mut self, id: i64) -> Result<bool, RepoError> {
        if !self.working.containers.contains_key(&id) {
            return Ok(false);
        }
        // Previews of previews go too, like the foreign key cascade.
        let mut doomed = vec![id];
        let mut next = 0;
        while let Some(&parent) = doomed.get(next) {
            next += 1;
            let children: Vec<i64> = self
                .working
                .containers
                .values()
                .filter(|c| c.transfer_target_id == Some(parent) && !doomed.contains(&c.id))
                .map(|c| c.id)
                .collect();
            doomed.extend(children);
        }
        self.working.remove_containers(&doomed);
        Ok(true)
    }

    async fn list_permissions(
        &mut self,
        container_id: i64,
    ) -> Result<Vec<PermissionRecord>, RepoError> {
        Ok(self.working.permissions_of(container_id))
    }

    async fn insert_permission(
        &mut self,
        permission: NewPermission,
    ) -> Result<PermissionRecord, RepoError> {
        if !self.working.containers.contains_key(&permission.container_id) {
            return Err(missing_reference("container", permission.container_id));
        }
        let taken = self.working.permissions.values().any(|row| {
            row.container_id == permission.container_id
                && row.grantee() == Some(permission.grantee)
        });
        if taken {
            return Err(RepoError::duplicate("container_permissions_grantee"));
        }

        let (user_id, user_group_id) = grantee_columns(permission.grantee);
        let now = OffsetDateTime::now_utc();
        let id = self.working.next_id();
        let record = PermissionRecord {
            id,
            container_id: permission.container_id,
            user_id,
            user_group_id,
            manage_container: permission.manage_container,
            manage_preview: permission.manage_preview,
            manage_plugins: permission.manage_plugins,
            created_at: now,
            updated_at: now,
        };
        self.working.permissions.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_permissions(&mut self, container_id: i64) -> Result<u64, RepoError> {
        let before = self.working.permissions.len();
        self.working
            .permissions
            .retain(|_, permission| permission.container_id != container_id);
        Ok((before - self.working.permissions.len()) as u64)
    }

    async fn list_groups(&mut self, container_id: i64) -> Result<Vec<GroupRecord>, RepoError> {
        Ok(self.working.groups_of(container_id))
    }

    async fn insert_group(&mut self, group: NewGroup) -> Result<GroupRecord, RepoError> {
        if !self.working.containers.contains_key(&group.container_id) {
            return Err(missing_reference("container", group.container_id));
        }
        for row in self
            .working
            .groups
            .values()
            .filter(|row| row.container_id == group.container_id)
        {
            if row.slug == group.slug {
                return Err(RepoError::duplicate("content_groups_container_slug_key"));
            }
            if row.cache_key == group.cache_key {
                return Err(RepoError::duplicate("content_groups_container_cache_key_key"));
            }
        }

        let now = OffsetDateTime::now_utc();
        let id = self.working.next_id();
        let record = GroupRecord {
            id,
            container_id: group.container_id,
            name: group.name,
            slug: group.slug,
            cache_key: group.cache_key,
            description: group.description,
            plugins_include: group.plugins_include,
            plugins_exclude: group.plugins_exclude,
            validation: group.validation,
            show_in_menu: group.show_in_menu,
            position: group.position,
            created_at: now,
            updated_at: now,
        };
        self.working.groups.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_groups(&mut self, container_id: i64) -> Result<u64, RepoError> {
        let before = self.working.groups.len();
        self.working
            .groups
            .retain(|_, group| group.container_id != container_id);
        let groups = &self.working.groups;
        self.working.plugins.retain(|_, plugin| {
            plugin
                .record
                .group_id
                .is_none_or(|group| groups.contains_key(&group))
        });
        Ok((before - self.working.groups.len()) as u64)
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
        Ok(self.working.plugins_where(|record| {
            record.container_id == container_id && record.group_id == group_id
        }))
    }

    async fn insert_plugin(&mut self, plugin: NewPlugin) -> Result<StoredPlugin, RepoError> {
        if let Some(left) = self.plugin_inserts_left.as_mut() {
            if *left == 0 {
                return Err(RepoError::from_persistence("injected plugin insert failure"));
            }
            *left -= 1;
        }

        let now = OffsetDateTime::now_utc();
        let record = PluginRecord {
            id: self.working.last_id + 1,
            container_id: plugin.container_id,
            group_id: plugin.group_id,
            language_id: plugin.language_id,
            app_label: plugin.app_label,
            model_name: plugin.model_name,
            lock_content: plugin.lock_content,
            lock_position: plugin.lock_position,
            position: plugin.position,
            created_at: now,
            updated_at: now,
        };
        self.working.check_plugin(&record)?;
        let id = self.working.next_id();
        let stored = StoredPlugin {
            record,
            content: plugin.content,
        };
        self.working.plugins.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_plugin(&mut self, plugin: &StoredPlugin) -> Result<StoredPlugin, RepoError> {
        let created_at = self
            .working
            .plugins
            .get(&plugin.record.id)
            .map(|current| current.record.created_at)
            .ok_or(RepoError::NotFound)?;
        let mut stored = plugin.clone();
        stored.record.created_at = created_at;
        stored.record.updated_at = OffsetDateTime::now_utc();
        self.working.check_plugin(&stored.record)?;
        self.working.plugins.insert(stored.record.id, stored.clone());
        Ok(stored)
    }

    async fn delete_plugin(&mut self, id: i64) -> Result<bool, RepoError> {
        Ok(self.working.plugins.remove(&id).is_some())
    }

    async fn delete_plugins(&mut self, container_id: i64) -> Result<u64, RepoError> {
        let before = self.working.plugins.len();
        self.working
            .plugins
            .retain(|_, plugin| plugin.record.container_id != container_id);
        Ok((before - self.working.plugins.len()) as u64)
    }

    async fn insert_language(
        &mut self,
        name: &str,
        position: i32,
    ) -> Result<LanguageRecord, RepoError> {
        if self.working.languages.values().any(|row| row.name == name) {
            return Err(RepoError::duplicate("languages_name_key"));
        }
        let now = OffsetDateTime::now_utc();
        let id = self.working.next_id();
        let record = LanguageRecord {
            id,
            name: name.to_string(),
            position,
            created_at: now,
            updated_at: now,
        };
        self.working.languages.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_category(
        &mut self,
        name: &str,
        position: i32,
    ) -> Result<CategoryRecord, RepoError> {
        if self.working.categories.values().any(|row| row.name == name) {
            return Err(RepoError::duplicate("categories_name_key"));
        }
        let now = OffsetDateTime::now_utc();
        let id = self.working.next_id();
        let record = CategoryRecord {
            id,
            name: name.to_string(),
            position,
            created_at: now,
            updated_at: now,
        };
        self.working.categories.insert(id, record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let MemoryTx {
            shared, working, ..
        } = *self;
        *rw_write(&shared, SOURCE, "commit") = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn container(name: &str, slug: &str) -> NewContainer {
        NewContainer {
            name: name.into(),
            slug: slug.into(),
            cache_key: slug.into(),
            category_id: None,
            is_preview: false,
            preview_url: None,
            transfer_timestamp: None,
            transfer_target_id: None,
            position: 0,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_and_discarded() {
        let repo = MemoryContentRepo::new();
        let mut tx = repo.begin().await.expect("begin");
        let home = tx
            .insert_container(container("Home", "home"))
            .await
            .expect("insert");
        assert!(repo.find_container(home.id).await.expect("find").is_none());
        tx.rollback().await.expect("rollback");
        assert_eq!(repo.container_count(), 0);
    }

    #[tokio::test]
    async fn unique_slug_and_preview_state_are_enforced() {
        let repo = MemoryContentRepo::new();
        let mut tx = repo.begin().await.expect("begin");
        tx.insert_container(container("Home", "home"))
            .await
            .expect("insert");
        let err = tx
            .insert_container(container("Other", "home"))
            .await
            .expect_err("duplicate slug");
        assert!(matches!(err, RepoError::Duplicate { .. }));

        let err = tx
            .insert_container(NewContainer {
                is_preview: true,
                ..container("Preview", "preview")
            })
            .await
            .expect_err("preview without target");
        assert!(matches!(err, RepoError::Integrity { .. }));
    }

    #[tokio::test]
    async fn deleting_a_container_cascades_to_previews() {
        let repo = MemoryContentRepo::new();
        let mut tx = repo.begin().await.expect("begin");
        let home = tx
            .insert_container(container("Home", "home"))
            .await
            .expect("home");
        let preview = tx
            .insert_container(NewContainer {
                is_preview: true,
                transfer_target_id: Some(home.id),
                ..container("Home (1)", "home_1")
            })
            .await
            .expect("preview");
        let group = tx
            .insert_group(NewGroup {
                container_id: preview.id,
                name: "Main".into(),
                slug: "main".into(),
                cache_key: "main".into(),
                description: String::new(),
                plugins_include: String::new(),
                plugins_exclude: String::new(),
                validation: None,
                show_in_menu: false,
                position: 0,
            })
            .await
            .expect("group");
        tx.insert_plugin(NewPlugin {
            container_id: preview.id,
            group_id: Some(group.id),
            language_id: None,
            app_label: "content".into(),
            model_name: "snippet".into(),
            lock_content: false,
            lock_position: false,
            position: 0,
            content: json!({"slug": "a"}),
        })
        .await
        .expect("plugin");
        assert_eq!(tx.list_previews(home.id).await.expect("previews").len(), 1);

        assert!(tx.delete_container(home.id).await.expect("delete"));
        tx.commit().await.expect("commit");
        assert_eq!(repo.container_count(), 0);
        assert_eq!(repo.plugin_count(), 0);
    }

    fn group(container_id: i64, slug: &str, cache_key: &str) -> NewGroup {
        NewGroup {
            container_id,
            name: slug.into(),
            slug: slug.into(),
            cache_key: cache_key.into(),
            description: String::new(),
            plugins_include: String::new(),
            plugins_exclude: String::new(),
            validation: None,
            show_in_menu: false,
            position: 0,
        }
    }

    #[tokio::test]
    async fn cascade_follows_previews_of_previews() {
        let repo = MemoryContentRepo::new();
        let mut tx = repo.begin().await.expect("begin");
        let home = tx
            .insert_container(container("Home", "home"))
            .await
            .expect("home");
        let first = tx
            .insert_container(NewContainer {
                is_preview: true,
                transfer_target_id: Some(home.id),
                ..container("Home (2)", "home_2")
            })
            .await
            .expect("first preview");
        let second = tx
            .insert_container(NewContainer {
                is_preview: true,
                transfer_target_id: Some(first.id),
                ..container("Home (2) (3)", "home_2_3")
            })
            .await
            .expect("second preview");
        let main = tx
            .insert_group(group(second.id, "main", "main"))
            .await
            .expect("group");
        tx.insert_plugin(NewPlugin {
            container_id: second.id,
            group_id: Some(main.id),
            language_id: None,
            app_label: "content".into(),
            model_name: "snippet".into(),
            lock_content: false,
            lock_position: false,
            position: 0,
            content: json!({"slug": "a"}),
        })
        .await
        .expect("plugin");

        assert!(tx.delete_container(home.id).await.expect("delete"));
        tx.commit().await.expect("commit");

        assert!(repo.find_container(second.id).await.expect("find").is_none());
        assert_eq!(repo.container_count(), 0);
        assert_eq!(repo.plugin_count(), 0);
        assert!(repo.find_group(main.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn group_cache_keys_are_unique_per_container() {
        let repo = MemoryContentRepo::new();
        let mut tx = repo.begin().await.expect("begin");
        let home = tx
            .insert_container(container("Home", "home"))
            .await
            .expect("home");
        let about = tx
            .insert_container(container("About", "about"))
            .await
            .expect("about");
        tx.insert_group(group(home.id, "main", "main"))
            .await
            .expect("first group");

        let err = tx
            .insert_group(group(home.id, "body", "main"))
            .await
            .expect_err("scope taken");
        assert!(matches!(
            err,
            RepoError::Duplicate { ref constraint } if constraint == "content_groups_container_cache_key_key"
        ));
        tx.insert_group(group(about.id, "body", "main"))
            .await
            .expect("other container may reuse the scope");
    }

    #[tokio::test]
    async fn injected_failure_trips_after_count() {
        let repo = MemoryContentRepo::new();
        let mut tx = repo.begin().await.expect("begin");
        let home = tx
            .insert_container(container("Home", "home"))
            .await
            .expect("home");
        tx.commit().await.expect("commit");

        repo.fail_plugin_inserts_after(1);
        let mut tx = repo.begin().await.expect("begin");
        let plugin = |position| NewPlugin {
            container_id: home.id,
            group_id: None,
            language_id: None,
            app_label: "content".into(),
            model_name: "snippet".into(),
            lock_content: false,
            lock_position: false,
            position,
            content: json!({}),
        };
        tx.insert_plugin(plugin(0)).await.expect("first insert");
        assert!(tx.insert_plugin(plugin(1)).await.is_err());
    }
}
