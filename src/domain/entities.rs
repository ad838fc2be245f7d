//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::domain::error::DomainError;
use crate::domain::types::{Capability, Grantee, PluginTypeKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRecord {
    pub id: i64,
    pub name: String,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub cache_key: String,
    pub category_id: Option<i64>,
    pub is_preview: bool,
    pub preview_url: Option<String>,
    pub transfer_timestamp: Option<OffsetDateTime>,
    pub transfer_target_id: Option<i64>,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ContainerRecord {
    /// Previews always point at their production container; production
    /// containers carry neither a target nor a transfer timestamp.
    pub fn check_preview_state(&self) -> Result<(), DomainError> {
        check_preview_state(
            self.is_preview,
            self.transfer_target_id,
            self.transfer_timestamp,
        )
    }
}

pub fn check_preview_state(
    is_preview: bool,
    transfer_target_id: Option<i64>,
    transfer_timestamp: Option<OffsetDateTime>,
) -> Result<(), DomainError> {
    match (is_preview, transfer_target_id, transfer_timestamp) {
        (true, None, _) => Err(DomainError::invariant(
            "a preview container must reference its transfer target",
        )),
        (false, Some(_), _) | (false, _, Some(_)) => Err(DomainError::invariant(
            "a production container cannot carry transfer state",
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: i64,
    pub container_id: i64,
    pub name: String,
    pub slug: String,
    pub cache_key: String,
    pub description: String,
    /// Newline-delimited `app.model` / `app.*` patterns.
    pub plugins_include: String,
    pub plugins_exclude: String,
    /// Name of the group validator applied to batch edits.
    pub validation: Option<String>,
    pub show_in_menu: bool,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub id: i64,
    pub container_id: i64,
    pub group_id: Option<i64>,
    pub language_id: Option<i64>,
    pub app_label: String,
    pub model_name: String,
    pub lock_content: bool,
    pub lock_position: bool,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PluginRecord {
    pub fn type_key(&self) -> PluginTypeKey {
        PluginTypeKey::new(self.app_label.clone(), self.model_name.clone())
    }
}

/// A plugin base row together with its subtype extension fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPlugin {
    pub record: PluginRecord,
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: i64,
    pub container_id: i64,
    pub user_id: Option<i64>,
    pub user_group_id: Option<i64>,
    pub manage_container: bool,
    pub manage_preview: bool,
    pub manage_plugins: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PermissionRecord {
    pub fn grantee(&self) -> Option<Grantee> {
        match (self.user_id, self.user_group_id) {
            (Some(user), None) => Some(Grantee::User(user)),
            (None, Some(group)) => Some(Grantee::UserGroup(group)),
            _ => None,
        }
    }

    pub fn grants(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageContainer => self.manage_container,
            Capability::ManagePreview => self.manage_preview,
            Capability::ManagePlugins => self.manage_plugins,
        }
    }
}
