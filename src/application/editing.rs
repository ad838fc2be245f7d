//! Batch editing of a group's plugins.
//!
//! A batch is planned in full before anything is written: every edit is
//! checked against the registry, the group's include/exclude lists and the
//! lock flags of the stored plugin, then the group's validator sees the
//! resulting plugin list. Any error rejects the whole batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::permissions::{Actor, PermissionAuthority};
use crate::application::registry::PluginRegistry;
use crate::application::repos::{ContentRepo, ContentTx, NewPlugin, RepoError, settle};
use crate::application::validation::{GroupValidationInput, PlannedPlugin, ValidatorRegistry};
use crate::cache::InvalidationTrigger;
use crate::domain::entities::{ContainerRecord, GroupRecord, StoredPlugin};
use crate::domain::filters::PluginFilter;
use crate::domain::types::{Capability, PluginTypeKey};
use crate::domain::validation::ValidationErrors;

/// One change submitted by an editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PluginEdit {
    Create {
        app_label: String,
        model_name: String,
        position: i32,
        content: Value,
        #[serde(default)]
        lock_content: bool,
        #[serde(default)]
        lock_position: bool,
    },
    Update {
        id: i64,
        position: i32,
        content: Value,
        #[serde(default)]
        lock_content: bool,
        #[serde(default)]
        lock_position: bool,
    },
    Delete {
        id: i64,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

enum Write {
    Create(NewPlugin),
    Update(StoredPlugin),
    Delete(i64),
}

pub struct PluginEditService {
    repo: Arc<dyn ContentRepo>,
    registry: Arc<PluginRegistry>,
    authority: Arc<dyn PermissionAuthority>,
    validators: ValidatorRegistry,
    trigger: Arc<InvalidationTrigger>,
}

impl PluginEditService {
    pub fn new(
        repo: Arc<dyn ContentRepo>,
        registry: Arc<PluginRegistry>,
        authority: Arc<dyn PermissionAuthority>,
        validators: ValidatorRegistry,
        trigger: Arc<InvalidationTrigger>,
    ) -> Self {
        Self {
            repo,
            registry,
            authority,
            validators,
            trigger,
        }
    }

    /// Apply `edits` to the plugins of `group_id` in `language`.
    ///
    /// Either every edit is stored or none is; a rejected batch returns
    /// [`AppError::Validation`] with the problems of each edit and of the
    /// group as a whole.
    pub async fn save_group(
        &self,
        actor: &Actor,
        container_id: i64,
        group_id: i64,
        language: Option<&str>,
        edits: Vec<PluginEdit>,
    ) -> Result<SaveReport, AppError> {
        let container = self
            .repo
            .find_container(container_id)
            .await?
            .ok_or_else(|| AppError::not_found("container", container_id))?;
        let group = self
            .repo
            .find_group(group_id)
            .await?
            .filter(|group| group.container_id == container.id)
            .ok_or_else(|| AppError::not_found("group", group_id))?;
        self.authority
            .ensure(actor, container.id, Capability::ManagePlugins)
            .await?;

        let language_id = match language {
            Some(name) => Some(
                self.repo
                    .find_language_by_name(name)
                    .await?
                    .ok_or_else(|| AppError::not_found("language", name))?
                    .id,
            ),
            None => None,
        };
        let existing = self.repo.list_group_plugins(group.id, language_id).await?;

        let (writes, planned, mut errors) =
            self.plan(&container, &group, language_id, &existing, &edits);
        self.validate_group(actor, &container, &group, &planned, &mut errors);
        if !errors.is_empty() {
            warn!(
                container_id = container.id,
                group_id = group.id,
                errors = errors.len(),
                "Plugin batch rejected"
            );
            return Err(AppError::Validation(errors));
        }

        let mut tx = self.repo.begin().await?;
        let outcome = apply(tx.as_mut(), writes).await;
        let report = settle(tx, outcome).await?;

        self.trigger
            .group_written(&container.cache_key, &group.cache_key)
            .await;
        info!(
            container_id = container.id,
            group_id = group.id,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            "Plugin batch saved"
        );
        Ok(report)
    }

    fn plan(
        &self,
        container: &ContainerRecord,
        group: &GroupRecord,
        language_id: Option<i64>,
        existing: &[StoredPlugin],
        edits: &[PluginEdit],
    ) -> (Vec<Write>, Vec<PlannedPlugin>, ValidationErrors) {
        let stored: HashMap<i64, &StoredPlugin> = existing
            .iter()
            .map(|plugin| (plugin.record.id, plugin))
            .collect();
        let filter = PluginFilter::for_group(group);
        let mut errors = ValidationErrors::new();
        let mut writes = Vec::new();
        let mut planned = Vec::new();
        let mut touched = HashSet::new();

        for (index, edit) in edits.iter().enumerate() {
            match edit {
                PluginEdit::Create {
                    app_label,
                    model_name,
                    position,
                    content,
                    lock_content,
                    lock_position,
                } => {
                    let requested = PluginTypeKey::new(app_label.as_str(), model_name.as_str());
                    let Some(kind) = self.registry.lookup(&requested) else {
                        errors.add_edit(index, format!("Unknown plugin type `{requested}`."));
                        continue;
                    };
                    let key = kind.key();
                    if !filter.allows(&key) {
                        errors.add_edit(
                            index,
                            format!("Plugin type `{key}` is not allowed in this group."),
                        );
                        continue;
                    }
                    let content = match kind.prepare(content) {
                        Ok(content) => content,
                        Err(problems) => {
                            for problem in problems {
                                errors.add_edit(index, problem);
                            }
                            continue;
                        }
                    };

                    planned.push(PlannedPlugin {
                        edit: Some(index),
                        id: None,
                        original_position: None,
                        key: key.clone(),
                        position: *position,
                        lock_content: *lock_content,
                        lock_position: *lock_position,
                        content: content.clone(),
                    });
                    writes.push(Write::Create(NewPlugin {
                        container_id: container.id,
                        group_id: Some(group.id),
                        language_id,
                        app_label: key.app_label,
                        model_name: key.model_name,
                        lock_content: *lock_content,
                        lock_position: *lock_position,
                        position: *position,
                        content,
                    }));
                }
                PluginEdit::Update {
                    id,
                    position,
                    content,
                    lock_content,
                    lock_position,
                } => {
                    let Some(current) = claim(&stored, &mut touched, *id, index, &mut errors)
                    else {
                        continue;
                    };
                    let key = current.record.type_key();
                    let Some(kind) = self.registry.lookup(&key) else {
                        errors.add_edit(index, format!("Unknown plugin type `{key}`."));
                        continue;
                    };
                    if current.record.lock_position && *position != current.record.position {
                        errors.add_edit(index, "The position of this plugin is locked.");
                    }
                    let content = if current.record.lock_content && *lock_content {
                        current.content.clone()
                    } else {
                        match kind.prepare(content) {
                            Ok(content) => content,
                            Err(problems) => {
                                for problem in problems {
                                    errors.add_edit(index, problem);
                                }
                                continue;
                            }
                        }
                    };

                    let mut updated = (*current).clone();
                    updated.record.app_label = key.app_label.clone();
                    updated.record.model_name = key.model_name.clone();
                    updated.record.position = *position;
                    updated.record.lock_content = *lock_content;
                    updated.record.lock_position = *lock_position;
                    updated.content = content.clone();

                    planned.push(PlannedPlugin {
                        edit: Some(index),
                        id: Some(*id),
                        original_position: Some(current.record.position),
                        key,
                        position: *position,
                        lock_content: *lock_content,
                        lock_position: *lock_position,
                        content,
                    });
                    writes.push(Write::Update(updated));
                }
                PluginEdit::Delete { id } => {
                    if claim(&stored, &mut touched, *id, index, &mut errors).is_some() {
                        writes.push(Write::Delete(*id));
                    }
                }
            }
        }

        for plugin in existing
            .iter()
            .filter(|plugin| !touched.contains(&plugin.record.id))
        {
            planned.push(PlannedPlugin {
                edit: None,
                id: Some(plugin.record.id),
                original_position: Some(plugin.record.position),
                key: plugin.record.type_key(),
                position: plugin.record.position,
                lock_content: plugin.record.lock_content,
                lock_position: plugin.record.lock_position,
                content: plugin.content.clone(),
            });
        }
        planned.sort_by_key(|plugin| (plugin.position, plugin.id.unwrap_or(i64::MAX)));

        (writes, planned, errors)
    }

    fn validate_group(
        &self,
        actor: &Actor,
        container: &ContainerRecord,
        group: &GroupRecord,
        planned: &[PlannedPlugin],
        errors: &mut ValidationErrors,
    ) {
        let Some(name) = group
            .validation
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            return;
        };
        match self.validators.get(name) {
            Some(validator) => validator.validate(
                &GroupValidationInput {
                    actor,
                    container,
                    group,
                    plugins: planned,
                },
                errors,
            ),
            None => errors.add_group(format!("Unknown group validator `{name}`.")),
        }
    }
}

/// Look up the stored plugin an edit refers to, recording an error when it
/// does not exist or was already claimed by an earlier edit of the batch.
fn claim<'a>(
    stored: &HashMap<i64, &'a StoredPlugin>,
    touched: &mut HashSet<i64>,
    id: i64,
    index: usize,
    errors: &mut ValidationErrors,
) -> Option<&'a StoredPlugin> {
    let Some(plugin) = stored.get(&id).copied() else {
        errors.add_edit(index, format!("Plugin {id} does not belong to this group."));
        return None;
    };
    if !touched.insert(id) {
        errors.add_edit(index, format!("Plugin {id} is edited more than once."));
        return None;
    }
    Some(plugin)
}

async fn apply(tx: &mut dyn ContentTx, writes: Vec<Write>) -> Result<SaveReport, AppError> {
    let mut report = SaveReport::default();
    for write in writes {
        match write {
            Write::Create(plugin) => {
                tx.insert_plugin(plugin).await?;
                report.created += 1;
            }
            Write::Update(plugin) => {
                tx.update_plugin(&plugin).await?;
                report.updated += 1;
            }
            Write::Delete(id) => {
                if !tx.delete_plugin(id).await? {
                    return Err(AppError::Transaction(RepoError::NotFound));
                }
                report.deleted += 1;
            }
        }
    }
    Ok(report)
}
