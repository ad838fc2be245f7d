//! Shared domain enumerations and identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Capabilities a permission row can grant on a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageContainer,
    ManagePreview,
    ManagePlugins,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ManageContainer => "manage_container",
            Capability::ManagePreview => "manage_preview",
            Capability::ManagePlugins => "manage_plugins",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single subject a permission row is granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Grantee {
    User(i64),
    UserGroup(i64),
}

/// Identifies a concrete plugin subtype as `app_label.model_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginTypeKey {
    pub app_label: String,
    pub model_name: String,
}

impl PluginTypeKey {
    pub fn new(app_label: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            model_name: model_name.into(),
        }
    }

    /// The `app_label.*` pattern matching every model of this app.
    pub fn wildcard(&self) -> String {
        format!("{}.*", self.app_label)
    }
}

impl fmt::Display for PluginTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model_name)
    }
}
