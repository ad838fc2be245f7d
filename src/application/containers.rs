//! Container administration: containers, groups, grants, languages and
//! categories.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::application::error::AppError;
use crate::application::permissions::{Actor, Capabilities, PermissionAuthority};
use crate::application::repos::{
    ContentRepo, ContentTx, NewContainer, NewGroup, NewPermission, RepoError, settle,
};
use crate::cache::{InvalidationTrigger, ScopeSet};
use crate::domain::entities::{
    CategoryRecord, ContainerRecord, GroupRecord, LanguageRecord, PermissionRecord,
};
use crate::domain::error::DomainError;
use crate::domain::filters::PluginPatterns;
use crate::domain::slug::{
    SlugAsyncError, cache_scope, derive_slug, generate_unique_slug_async, validate_slug,
};
use crate::domain::types::{Capability, Grantee};

const LANGUAGE_NAME_MAX: usize = 7;

/// Editor input for a new group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGroupInput {
    pub name: String,
    /// Derived from the name when omitted.
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plugins_include: String,
    #[serde(default)]
    pub plugins_exclude: String,
    pub validation: Option<String>,
    #[serde(default)]
    pub show_in_menu: bool,
    #[serde(default)]
    pub position: i32,
}

pub struct ContainerService {
    repo: Arc<dyn ContentRepo>,
    authority: Arc<dyn PermissionAuthority>,
    trigger: Arc<InvalidationTrigger>,
}

impl ContainerService {
    pub fn new(
        repo: Arc<dyn ContentRepo>,
        authority: Arc<dyn PermissionAuthority>,
        trigger: Arc<InvalidationTrigger>,
    ) -> Self {
        Self {
            repo,
            authority,
            trigger,
        }
    }

    /// Create a production container. Without an explicit slug one is
    /// derived from the name and suffixed until unique.
    pub async fn create_container(
        &self,
        name: &str,
        slug: Option<&str>,
        category_id: Option<i64>,
    ) -> Result<ContainerRecord, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Blank { field: "name" }.into());
        }

        let slug = match slug.map(str::trim).filter(|slug| !slug.is_empty()) {
            Some(slug) => {
                validate_slug(slug).map_err(DomainError::from)?;
                slug.to_string()
            }
            None => {
                let repo = Arc::clone(&self.repo);
                generate_unique_slug_async(name, move |candidate| {
                    let repo = Arc::clone(&repo);
                    async move {
                        let existing = repo.find_container_by_slug(&candidate).await?;
                        Ok::<_, RepoError>(existing.is_none())
                    }
                })
                .await
                .map_err(slug_failure)?
            }
        };

        let mut tx = self.repo.begin().await?;
        let outcome = tx
            .insert_container(NewContainer {
                name: name.to_string(),
                cache_key: cache_scope(&slug),
                slug,
                category_id,
                is_preview: false,
                preview_url: None,
                transfer_timestamp: None,
                transfer_target_id: None,
                position: 0,
            })
            .await
            .map_err(AppError::from);
        let container = settle(tx, outcome).await?;

        info!(
            container_id = container.id,
            container_slug = %container.slug,
            "Container created"
        );
        Ok(container)
    }

    pub async fn create_group(
        &self,
        actor: &Actor,
        container_id: i64,
        input: NewGroupInput,
    ) -> Result<GroupRecord, AppError> {
        let container = self.require(actor, container_id).await?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::Blank { field: "name" }.into());
        }
        PluginPatterns::parse_strict(&input.plugins_include)?;
        PluginPatterns::parse_strict(&input.plugins_exclude)?;

        let slug = match input.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => {
                validate_slug(slug).map_err(DomainError::from)?;
                slug.to_string()
            }
            _ => derive_slug(&name).map_err(DomainError::from)?,
        };

        let mut tx = self.repo.begin().await?;
        let outcome = tx
            .insert_group(NewGroup {
                container_id: container.id,
                name,
                cache_key: cache_scope(&slug),
                slug,
                description: input.description,
                plugins_include: input.plugins_include,
                plugins_exclude: input.plugins_exclude,
                validation: input.validation.filter(|name| !name.trim().is_empty()),
                show_in_menu: input.show_in_menu,
                position: input.position,
            })
            .await
            .map_err(AppError::from);
        let group = settle(tx, outcome).await?;

        // The scope may have served fragments for a group deleted earlier.
        self.trigger
            .group_written(&container.cache_key, &group.cache_key)
            .await;
        info!(
            container_id = container.id,
            group_id = group.id,
            group_slug = %group.slug,
            "Group created"
        );
        Ok(group)
    }

    /// Delete a container with everything it owns, including previews of
    /// its previews. Every scope of the removed containers is bumped.
    pub async fn delete_container(
        &self,
        actor: &Actor,
        container_id: i64,
    ) -> Result<(), AppError> {
        let container = self.require(actor, container_id).await?;

        let mut tx = self.repo.begin().await?;
        let outcome = remove_container(tx.as_mut(), &container).await;
        let scopes = settle(tx, outcome).await?;

        self.trigger.scopes_written(&scopes).await;
        for scope in scopes.iter() {
            self.trigger.dependencies().forget_scope(scope);
        }
        info!(
            container_id = container.id,
            scopes = scopes.len(),
            "Container deleted"
        );
        Ok(())
    }

    /// Grant `capabilities` on a container to a single user or user group.
    pub async fn grant(
        &self,
        actor: &Actor,
        container_id: i64,
        grantee: Grantee,
        capabilities: Capabilities,
    ) -> Result<PermissionRecord, AppError> {
        let container = self.require(actor, container_id).await?;

        let mut tx = self.repo.begin().await?;
        let outcome = insert_grant(tx.as_mut(), container.id, grantee, capabilities).await;
        let permission = settle(tx, outcome).await?;

        info!(
            container_id = container.id,
            permission_id = permission.id,
            grantee = ?grantee,
            "Permission granted"
        );
        Ok(permission)
    }

    pub async fn create_language(
        &self,
        name: &str,
        position: i32,
    ) -> Result<LanguageRecord, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Blank { field: "name" }.into());
        }
        if name.chars().count() > LANGUAGE_NAME_MAX {
            return Err(DomainError::invariant(format!(
                "language name `{name}` is longer than {LANGUAGE_NAME_MAX} characters"
            ))
            .into());
        }

        let mut tx = self.repo.begin().await?;
        let outcome = tx
            .insert_language(name, position)
            .await
            .map_err(AppError::from);
        Ok(settle(tx, outcome).await?)
    }

    pub async fn create_category(
        &self,
        name: &str,
        position: i32,
    ) -> Result<CategoryRecord, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Blank { field: "name" }.into());
        }

        let mut tx = self.repo.begin().await?;
        let outcome = tx
            .insert_category(name, position)
            .await
            .map_err(AppError::from);
        Ok(settle(tx, outcome).await?)
    }

    async fn require(
        &self,
        actor: &Actor,
        container_id: i64,
    ) -> Result<ContainerRecord, AppError> {
        let container = self
            .repo
            .find_container(container_id)
            .await?
            .ok_or_else(|| AppError::not_found("container", container_id))?;
        self.authority
            .ensure(actor, container.id, Capability::ManageContainer)
            .await?;
        Ok(container)
    }
}

async fn remove_container(
    tx: &mut dyn ContentTx,
    container: &ContainerRecord,
) -> Result<ScopeSet, AppError> {
    let mut affected = vec![container.clone()];
    let mut next = 0;
    while let Some(owner) = affected.get(next).map(|owner| owner.id) {
        next += 1;
        for preview in tx.list_previews(owner).await? {
            if affected.iter().all(|seen| seen.id != preview.id) {
                affected.push(preview);
            }
        }
    }

    let mut scopes = ScopeSet::new();
    for owner in &affected {
        for group in tx.list_groups(owner.id).await? {
            scopes.insert(&owner.cache_key, &group.cache_key);
        }
    }

    if !tx.delete_container(container.id).await? {
        return Err(AppError::Transaction(RepoError::NotFound));
    }
    Ok(scopes)
}

async fn insert_grant(
    tx: &mut dyn ContentTx,
    container_id: i64,
    grantee: Grantee,
    capabilities: Capabilities,
) -> Result<PermissionRecord, AppError> {
    let taken = tx
        .list_permissions(container_id)
        .await?
        .iter()
        .any(|row| row.grantee() == Some(grantee));
    if taken {
        return Err(RepoError::duplicate("container_permissions_grantee").into());
    }
    Ok(tx
        .insert_permission(NewPermission {
            container_id,
            grantee,
            manage_container: capabilities.manage_container,
            manage_preview: capabilities.manage_preview,
            manage_plugins: capabilities.manage_plugins,
        })
        .await?)
}

fn slug_failure(err: SlugAsyncError<RepoError>) -> AppError {
    match err {
        SlugAsyncError::Slug(err) => DomainError::from(err).into(),
        SlugAsyncError::Predicate(err) => err.into(),
    }
}
