//! Preview clone and transfer.
//!
//! `create_preview` deep-copies a container (permissions, groups, plugins)
//! into a new preview container. `transfer_preview` replaces the production
//! container's subtree with the preview's and deletes the preview. Both run
//! in a single storage transaction and bump the touched generation scopes
//! only after it commits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::events::{ContainerEventKind, EventBus};
use crate::application::permissions::{Actor, PermissionAuthority};
use crate::application::repos::{
    ContentRepo, ContentTx, GroupSelector, NewContainer, NewGroup, NewPermission, NewPlugin,
    RepoError, settle,
};
use crate::cache::{InvalidationTrigger, ScopeSet};
use crate::domain::entities::ContainerRecord;
use crate::domain::slug::PreviewNames;
use crate::domain::types::Capability;

pub(crate) const METRIC_CLONE_MS: &str = "vola_preview_clone_ms";
pub(crate) const METRIC_TRANSFER_MS: &str = "vola_preview_transfer_ms";

/// Row counts copied by one subtree copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub permissions: usize,
    pub groups: usize,
    pub plugins: usize,
}

pub struct PreviewService {
    repo: Arc<dyn ContentRepo>,
    authority: Arc<dyn PermissionAuthority>,
    events: Arc<EventBus>,
    trigger: Arc<InvalidationTrigger>,
}

impl PreviewService {
    pub fn new(
        repo: Arc<dyn ContentRepo>,
        authority: Arc<dyn PermissionAuthority>,
        events: Arc<EventBus>,
        trigger: Arc<InvalidationTrigger>,
    ) -> Self {
        Self {
            repo,
            authority,
            events,
            trigger,
        }
    }

    /// Clone `container_id` into a new preview container owned by the same
    /// production container.
    pub async fn create_preview(
        &self,
        actor: &Actor,
        container_id: i64,
    ) -> Result<ContainerRecord, AppError> {
        let original = self
            .repo
            .find_container(container_id)
            .await?
            .ok_or_else(|| AppError::not_found("container", container_id))?;
        self.authority
            .ensure(actor, original.id, Capability::ManagePreview)
            .await?;

        self.events
            .emit(ContainerEventKind::PreCreatePreview, &original);
        let started = Instant::now();

        let mut tx = self.repo.begin().await?;
        let outcome = clone_into_preview(tx.as_mut(), &original).await;
        let (preview, report, scopes) = settle(tx, outcome).await?;

        self.trigger.scopes_written(&scopes).await;
        histogram!(METRIC_CLONE_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            container_id = original.id,
            preview_id = preview.id,
            preview_slug = %preview.slug,
            permissions = report.permissions,
            groups = report.groups,
            plugins = report.plugins,
            "Preview created"
        );

        self.events
            .emit(ContainerEventKind::PostCreatePreview, &preview);
        Ok(preview)
    }

    /// Replace the production container's subtree with the preview's and
    /// delete the preview.
    pub async fn transfer_preview(
        &self,
        actor: &Actor,
        preview_id: i64,
    ) -> Result<ContainerRecord, AppError> {
        let preview = self
            .repo
            .find_container(preview_id)
            .await?
            .filter(|container| container.is_preview)
            .ok_or_else(|| AppError::not_found("preview", preview_id))?;
        let target_id = preview
            .transfer_target_id
            .ok_or_else(|| AppError::not_found("container", "transfer target"))?;
        let production = self
            .repo
            .find_container(target_id)
            .await?
            .ok_or_else(|| AppError::not_found("container", target_id))?;
        self.authority
            .ensure(actor, production.id, Capability::ManagePreview)
            .await?;

        self.events
            .emit(ContainerEventKind::PreTransferPreview, &preview);
        let started = Instant::now();

        let mut tx = self.repo.begin().await?;
        let outcome = replace_with_preview(tx.as_mut(), &preview, target_id).await;
        let (production, report, scopes) = settle(tx, outcome).await?;

        self.trigger.scopes_written(&scopes).await;
        histogram!(METRIC_TRANSFER_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            container_id = production.id,
            preview_id,
            permissions = report.permissions,
            groups = report.groups,
            plugins = report.plugins,
            "Preview transferred"
        );

        self.events
            .emit(ContainerEventKind::PostTransferPreview, &production);
        Ok(production)
    }
}

type Outcome = (ContainerRecord, CopyReport, ScopeSet);

async fn clone_into_preview(
    tx: &mut dyn ContentTx,
    original: &ContainerRecord,
) -> Result<Outcome, AppError> {
    let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
    let stamp = stamp.to_string();

    let provisional = PreviewNames::provisional(&original.name, &original.slug, &stamp);
    let mut preview = tx
        .insert_container(NewContainer {
            name: provisional.name,
            slug: provisional.slug,
            cache_key: provisional.cache_key,
            category_id: original.category_id,
            is_preview: true,
            preview_url: original.preview_url.clone(),
            transfer_timestamp: None,
            transfer_target_id: Some(original.id),
            position: original.position,
        })
        .await?;

    let names = PreviewNames::finalized(&original.name, &original.slug, &stamp, preview.id);
    preview.name = names.name;
    preview.slug = names.slug;
    preview.cache_key = names.cache_key;
    let preview = tx.update_container(&preview).await?;
    preview.check_preview_state()?;

    let mut scopes = ScopeSet::new();
    let report = copy_subtree(tx, original, &preview, &mut scopes).await?;
    Ok((preview, report, scopes))
}

async fn replace_with_preview(
    tx: &mut dyn ContentTx,
    preview: &ContainerRecord,
    target_id: i64,
) -> Result<Outcome, AppError> {
    let production = tx
        .lock_container(target_id)
        .await?
        .ok_or_else(|| AppError::not_found("container", target_id))?;

    let mut scopes = ScopeSet::new();
    for group in tx.list_groups(production.id).await? {
        scopes.insert(&production.cache_key, &group.cache_key);
    }
    for group in tx.list_groups(preview.id).await? {
        scopes.insert(&preview.cache_key, &group.cache_key);
    }

    tx.delete_permissions(production.id).await?;
    tx.delete_plugins(production.id).await?;
    tx.delete_groups(production.id).await?;

    let report = copy_subtree(tx, preview, &production, &mut scopes).await?;

    if !tx.delete_container(preview.id).await? {
        return Err(AppError::Transaction(RepoError::NotFound));
    }
    Ok((production, report, scopes))
}

/// Copy permissions, groups and plugins of `source` onto `target`.
///
/// Groups are copied first and their new identities recorded against the
/// source identities, so each plugin copy can be matched by its source group
/// and re-pointed at the new one. Plugins without a group are copied as-is.
async fn copy_subtree(
    tx: &mut dyn ContentTx,
    source: &ContainerRecord,
    target: &ContainerRecord,
    scopes: &mut ScopeSet,
) -> Result<CopyReport, AppError> {
    let mut report = CopyReport::default();

    for permission in tx.list_permissions(source.id).await? {
        match NewPermission::copy_of(&permission, target.id) {
            Some(copy) => {
                tx.insert_permission(copy).await?;
                report.permissions += 1;
            }
            None => warn!(
                permission_id = permission.id,
                "Skipping permission row without a single grantee"
            ),
        }
    }

    let mut group_ids = HashMap::new();
    let source_groups = tx.list_groups(source.id).await?;
    for group in &source_groups {
        let copy = tx.insert_group(NewGroup::copy_of(group, target.id)).await?;
        scopes.insert(&target.cache_key, &copy.cache_key);
        group_ids.insert(group.id, copy.id);
        report.groups += 1;
    }

    for group in &source_groups {
        let new_group_id = group_ids.get(&group.id).copied();
        for plugin in tx
            .list_plugins(source.id, GroupSelector::Group(group.id))
            .await?
        {
            tx.insert_plugin(NewPlugin::copy_of(&plugin, target.id, new_group_id))
                .await?;
            report.plugins += 1;
        }
    }

    for plugin in tx.list_plugins(source.id, GroupSelector::Ungrouped).await? {
        tx.insert_plugin(NewPlugin::copy_of(&plugin, target.id, None))
            .await?;
        report.plugins += 1;
    }

    Ok(report)
}
