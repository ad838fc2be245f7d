//! Capability checks on containers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::error::AppError;
use crate::application::repos::ContentRepo;
use crate::domain::types::Capability;

/// The identity performing an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub user_groups: Vec<i64>,
    pub is_superuser: bool,
    /// Global permission to change containers at all.
    pub can_change_containers: bool,
}

impl Actor {
    pub fn superuser(user_id: i64) -> Self {
        Self {
            user_id,
            is_superuser: true,
            can_change_containers: true,
            ..Default::default()
        }
    }

    pub fn editor(user_id: i64, user_groups: Vec<i64>) -> Self {
        Self {
            user_id,
            user_groups,
            is_superuser: false,
            can_change_containers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub manage_container: bool,
    pub manage_preview: bool,
    pub manage_plugins: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        manage_container: true,
        manage_preview: true,
        manage_plugins: true,
    };

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageContainer => self.manage_container,
            Capability::ManagePreview => self.manage_preview,
            Capability::ManagePlugins => self.manage_plugins,
        }
    }
}

#[async_trait]
pub trait PermissionAuthority: Send + Sync {
    async fn capabilities(&self, actor: &Actor, container_id: i64)
    -> Result<Capabilities, AppError>;

    /// Fail with `PermissionDenied` unless `actor` holds `capability`.
    async fn ensure(
        &self,
        actor: &Actor,
        container_id: i64,
        capability: Capability,
    ) -> Result<(), AppError> {
        if self
            .capabilities(actor, container_id)
            .await?
            .allows(capability)
        {
            return Ok(());
        }
        warn!(
            user_id = actor.user_id,
            container_id,
            capability = %capability,
            "Permission denied"
        );
        Err(AppError::denied(capability, container_id))
    }
}

/// Answers from the container's permission rows.
pub struct RowPermissionAuthority {
    repo: Arc<dyn ContentRepo>,
}

impl RowPermissionAuthority {
    pub fn new(repo: Arc<dyn ContentRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PermissionAuthority for RowPermissionAuthority {
    async fn capabilities(
        &self,
        actor: &Actor,
        container_id: i64,
    ) -> Result<Capabilities, AppError> {
        if actor.is_superuser {
            return Ok(Capabilities::ALL);
        }
        if !actor.can_change_containers {
            return Ok(Capabilities::default());
        }

        let rows = self.repo.list_permissions(container_id).await?;
        let mut granted = Capabilities::default();
        for row in rows.iter().filter(|row| {
            row.user_id == Some(actor.user_id)
                || row
                    .user_group_id
                    .is_some_and(|group| actor.user_groups.contains(&group))
        }) {
            granted.manage_container |= row.manage_container;
            granted.manage_preview |= row.manage_preview;
            granted.manage_plugins |= row.manage_plugins;
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{NewContainer, NewPermission};
    use crate::domain::types::Grantee;
    use crate::infra::memory::MemoryContentRepo;

    async fn seeded() -> (Arc<MemoryContentRepo>, i64) {
        let repo = Arc::new(MemoryContentRepo::new());
        let mut tx = repo.begin().await.expect("begin");
        let container = tx
            .insert_container(NewContainer {
                name: "Home".into(),
                slug: "home".into(),
                cache_key: "home".into(),
                category_id: None,
                is_preview: false,
                preview_url: None,
                transfer_timestamp: None,
                transfer_target_id: None,
                position: 0,
            })
            .await
            .expect("container");
        tx.insert_permission(NewPermission {
            container_id: container.id,
            grantee: Grantee::User(7),
            manage_container: false,
            manage_preview: true,
            manage_plugins: false,
        })
        .await
        .expect("user grant");
        tx.insert_permission(NewPermission {
            container_id: container.id,
            grantee: Grantee::UserGroup(3),
            manage_container: false,
            manage_preview: false,
            manage_plugins: true,
        })
        .await
        .expect("group grant");
        tx.commit().await.expect("commit");
        (repo, container.id)
    }

    #[tokio::test]
    async fn superuser_holds_everything() {
        let (repo, id) = seeded().await;
        let authority = RowPermissionAuthority::new(repo);
        let caps = authority
            .capabilities(&Actor::superuser(1), id)
            .await
            .expect("caps");
        assert_eq!(caps, Capabilities::ALL);
    }

    #[tokio::test]
    async fn user_and_group_rows_combine() {
        let (repo, id) = seeded().await;
        let authority = RowPermissionAuthority::new(repo);
        let caps = authority
            .capabilities(&Actor::editor(7, vec![3]), id)
            .await
            .expect("caps");
        assert!(caps.manage_preview);
        assert!(caps.manage_plugins);
        assert!(!caps.manage_container);
    }

    #[tokio::test]
    async fn global_change_permission_is_required() {
        let (repo, id) = seeded().await;
        let authority = RowPermissionAuthority::new(repo);
        let actor = Actor {
            can_change_containers: false,
            ..Actor::editor(7, vec![])
        };
        let err = authority
            .ensure(&actor, id, Capability::ManagePreview)
            .await
            .expect_err("denied");
        assert!(matches!(
            err,
            AppError::PermissionDenied {
                capability: Capability::ManagePreview,
                ..
            }
        ));
    }
}
