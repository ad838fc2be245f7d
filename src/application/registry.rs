//! Registry of plugin subtypes keyed by `(app_label, model_name)`.
//!
//! Built once at startup and read-only afterwards. Resolving a stored
//! plugin is a map lookup followed by a typed decode of its content.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value;

use crate::application::plugin::{ConcretePlugin, PluginError, PluginInstance, PluginModel};
use crate::domain::entities::StoredPlugin;
use crate::domain::types::PluginTypeKey;

static GLOBAL: OnceCell<Arc<PluginRegistry>> = OnceCell::new();

/// Factory for one concrete plugin subtype.
pub trait PluginKind: Send + Sync {
    fn key(&self) -> PluginTypeKey;

    fn display_name(&self) -> &'static str;

    fn instantiate(&self, stored: StoredPlugin) -> Result<Box<dyn ConcretePlugin>, PluginError>;

    /// Decode and validate submitted content, returning it re-encoded in
    /// canonical form, or every problem found.
    fn prepare(&self, content: &Value) -> Result<Value, Vec<String>>;
}

/// [`PluginKind`] for any [`PluginModel`].
pub struct ModelKind<M>(PhantomData<fn() -> M>);

impl<M> Default for ModelKind<M> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<M: PluginModel + fmt::Debug> PluginKind for ModelKind<M> {
    fn key(&self) -> PluginTypeKey {
        PluginTypeKey::new(M::APP_LABEL, M::MODEL_NAME)
    }

    fn display_name(&self) -> &'static str {
        M::DISPLAY_NAME
    }

    fn instantiate(&self, stored: StoredPlugin) -> Result<Box<dyn ConcretePlugin>, PluginError> {
        Ok(Box::new(PluginInstance::<M>::decode(stored)?))
    }

    fn prepare(&self, content: &Value) -> Result<Value, Vec<String>> {
        let model: M = serde_json::from_value(content.clone())
            .map_err(|err| vec![format!("invalid content: {err}")])?;
        let problems = model.validate();
        if !problems.is_empty() {
            return Err(problems);
        }
        serde_json::to_value(&model).map_err(|err| vec![format!("invalid content: {err}")])
    }
}

/// Listing entry for a registered subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginTypeInfo {
    pub display_name: &'static str,
    pub app_label: String,
    pub model_name: String,
}

#[derive(Default)]
pub struct PluginRegistryBuilder {
    kinds: HashMap<PluginTypeKey, Arc<dyn PluginKind>>,
}

impl PluginRegistryBuilder {
    pub fn register<M: PluginModel + fmt::Debug>(self) -> Self {
        self.register_kind(Arc::new(ModelKind::<M>::default()))
    }

    /// Later registrations under the same key replace earlier ones.
    pub fn register_kind(mut self, kind: Arc<dyn PluginKind>) -> Self {
        self.kinds.insert(kind.key(), kind);
        self
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry { kinds: self.kinds }
    }
}

pub struct PluginRegistry {
    kinds: HashMap<PluginTypeKey, Arc<dyn PluginKind>>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    pub fn lookup(&self, key: &PluginTypeKey) -> Option<&dyn PluginKind> {
        self.kinds.get(key).map(Arc::as_ref)
    }

    pub fn instantiate(&self, stored: StoredPlugin) -> Result<Box<dyn ConcretePlugin>, PluginError> {
        let key = stored.record.type_key();
        let kind = self
            .lookup(&key)
            .ok_or(PluginError::UnknownType { key })?;
        kind.instantiate(stored)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &dyn PluginKind> {
        self.kinds.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Install the process-wide registry. Only the first call succeeds.
    pub fn install_global(self) -> Result<Arc<PluginRegistry>, PluginError> {
        let registry = Arc::new(self);
        GLOBAL
            .set(Arc::clone(&registry))
            .map_err(|_| PluginError::AlreadyInstalled)?;
        Ok(registry)
    }

    pub fn global() -> Option<Arc<PluginRegistry>> {
        GLOBAL.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::plugin::RenderContext;
    use crate::domain::entities::PluginRecord;

    #[derive(Debug, Serialize, Deserialize)]
    struct Quote {
        slug: String,
        text: String,
    }

    impl PluginModel for Quote {
        const APP_LABEL: &'static str = "test";
        const MODEL_NAME: &'static str = "quote";
        const DISPLAY_NAME: &'static str = "Quote";

        fn slug(&self) -> &str {
            &self.slug
        }

        fn validate(&self) -> Vec<String> {
            if self.text.is_empty() {
                vec!["text is required".to_string()]
            } else {
                Vec::new()
            }
        }

        fn render(&self, _base: &PluginRecord, _context: &RenderContext) -> Result<String, PluginError> {
            Ok(format!("<q>{}</q>", self.text))
        }
    }

    fn stored(app: &str, model: &str, content: Value) -> StoredPlugin {
        StoredPlugin {
            record: PluginRecord {
                id: 9,
                container_id: 1,
                group_id: Some(1),
                language_id: None,
                app_label: app.to_string(),
                model_name: model.to_string(),
                lock_content: false,
                lock_position: false,
                position: 0,
                created_at: OffsetDateTime::UNIX_EPOCH,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            },
            content,
        }
    }

    #[test]
    fn instantiate_resolves_registered_subtype() {
        let registry = PluginRegistry::builder().register::<Quote>().build();
        let plugin = registry
            .instantiate(stored("test", "quote", json!({"slug": "q1", "text": "hi"})))
            .expect("instantiate");

        assert_eq!(plugin.slug(), "q1");
        assert_eq!(plugin.display_name(), "Quote");
        assert_eq!(plugin.render(&RenderContext::new()).expect("render"), "<q>hi</q>");
        assert_eq!(
            plugin.data(&RenderContext::new()).expect("data"),
            json!({"slug": "q1", "text": "hi"})
        );
    }

    #[test]
    fn unknown_subtype_is_an_error() {
        let registry = PluginRegistry::builder().register::<Quote>().build();
        let err = registry
            .instantiate(stored("test", "missing", json!({})))
            .expect_err("unknown type");
        assert!(matches!(err, PluginError::UnknownType { .. }));
    }

    #[test]
    fn mismatched_content_fails_to_decode() {
        let registry = PluginRegistry::builder().register::<Quote>().build();
        let err = registry
            .instantiate(stored("test", "quote", json!({"slug": 3})))
            .expect_err("bad content");
        assert!(matches!(err, PluginError::Decode { id: 9, .. }));
    }

    #[test]
    fn prepare_collects_model_validation() {
        let kind = ModelKind::<Quote>::default();
        assert_eq!(
            kind.prepare(&json!({"slug": "q", "text": ""})),
            Err(vec!["text is required".to_string()])
        );
        assert!(kind.prepare(&json!({"slug": "q"})).is_err());
        assert_eq!(
            kind.prepare(&json!({"slug": "q", "text": "x", "extra": 1})),
            Ok(json!({"slug": "q", "text": "x"}))
        );
    }
}
