//! The behaviour contract of concrete plugin subtypes.
//!
//! A subtype is a serde model implementing [`PluginModel`]. Its fields are
//! the extension record stored next to the shared plugin base row; the
//! registry pairs the two back up as a [`ConcretePlugin`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::entities::{PluginRecord, StoredPlugin};
use crate::domain::types::PluginTypeKey;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin type `{key}` is not registered")]
    UnknownType { key: PluginTypeKey },
    #[error("plugin {id} does not hold valid `{key}` content: {source}")]
    Decode {
        id: i64,
        key: PluginTypeKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to render `{key}` plugin {id}: {message}")]
    Render {
        id: i64,
        key: PluginTypeKey,
        message: String,
    },
    #[error("a global plugin registry is already installed")]
    AlreadyInstalled,
}

/// Request-scoped values available to `render` and `data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    /// Query parameters of the inbound request.
    pub query: BTreeMap<String, String>,
    pub language: Option<String>,
    pub values: Map<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Implemented by every concrete plugin subtype.
pub trait PluginModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    const APP_LABEL: &'static str;
    const MODEL_NAME: &'static str;
    const DISPLAY_NAME: &'static str;

    /// Identifier single-plugin lookups match against.
    fn slug(&self) -> &str;

    /// Field-level problems with this content; empty when valid.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    fn render(&self, base: &PluginRecord, context: &RenderContext) -> Result<String, PluginError>;

    /// Structured view of the plugin. Defaults to the serialized fields.
    fn data(&self, base: &PluginRecord, _context: &RenderContext) -> Result<Value, PluginError> {
        serde_json::to_value(self).map_err(|source| PluginError::Decode {
            id: base.id,
            key: base.type_key(),
            source,
        })
    }
}

/// A resolved plugin: base row plus decoded subtype.
pub trait ConcretePlugin: Send + Sync + fmt::Debug {
    fn record(&self) -> &PluginRecord;
    fn display_name(&self) -> &'static str;
    fn slug(&self) -> &str;
    fn validate(&self) -> Vec<String>;
    fn render(&self, context: &RenderContext) -> Result<String, PluginError>;
    fn data(&self, context: &RenderContext) -> Result<Value, PluginError>;

    fn type_key(&self) -> PluginTypeKey {
        self.record().type_key()
    }
}

#[derive(Debug)]
pub struct PluginInstance<M> {
    record: PluginRecord,
    model: M,
}

impl<M: PluginModel> PluginInstance<M> {
    pub fn decode(stored: StoredPlugin) -> Result<Self, PluginError> {
        let StoredPlugin { record, content } = stored;
        let model = serde_json::from_value(content).map_err(|source| PluginError::Decode {
            id: record.id,
            key: record.type_key(),
            source,
        })?;
        Ok(Self { record, model })
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: PluginModel + fmt::Debug> ConcretePlugin for PluginInstance<M> {
    fn record(&self) -> &PluginRecord {
        &self.record
    }

    fn display_name(&self) -> &'static str {
        M::DISPLAY_NAME
    }

    fn slug(&self) -> &str {
        self.model.slug()
    }

    fn validate(&self) -> Vec<String> {
        self.model.validate()
    }

    fn render(&self, context: &RenderContext) -> Result<String, PluginError> {
        self.model.render(&self.record, context)
    }

    fn data(&self, context: &RenderContext) -> Result<Value, PluginError> {
        self.model.data(&self.record, context)
    }
}
