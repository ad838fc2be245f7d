//! Group validation hooks.
//!
//! A group may name a validator in its `validation` field. The validator
//! sees the group's plugins as they would be after a batch edit and records
//! problems into the batch's [`ValidationErrors`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::application::permissions::Actor;
use crate::domain::entities::{ContainerRecord, GroupRecord};
use crate::domain::types::PluginTypeKey;
use crate::domain::validation::ValidationErrors;

/// A plugin of the group as it would be stored after the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPlugin {
    /// Index of the edit that produced or changed it.
    pub edit: Option<usize>,
    /// Identity of the stored plugin; `None` for plugins being created.
    pub id: Option<i64>,
    /// Position before the batch, for stored plugins.
    pub original_position: Option<i32>,
    pub key: PluginTypeKey,
    pub position: i32,
    pub lock_content: bool,
    pub lock_position: bool,
    pub content: Value,
}

impl PlannedPlugin {
    pub fn moved(&self) -> bool {
        self.original_position
            .is_some_and(|position| position != self.position)
    }
}

pub struct GroupValidationInput<'a> {
    pub actor: &'a Actor,
    pub container: &'a ContainerRecord,
    pub group: &'a GroupRecord,
    /// Surviving plugins ordered by position.
    pub plugins: &'a [PlannedPlugin],
}

pub trait GroupValidator: Send + Sync {
    fn validate(&self, input: &GroupValidationInput<'_>, errors: &mut ValidationErrors);
}

/// Requires the group to hold exactly `expected` plugins.
#[derive(Debug, Clone, Copy)]
pub struct PluginCountValidator {
    pub expected: usize,
}

impl GroupValidator for PluginCountValidator {
    fn validate(&self, input: &GroupValidationInput<'_>, errors: &mut ValidationErrors) {
        if input.plugins.len() != self.expected {
            errors.add_group(format!("Exactly {} plugins are needed.", self.expected));
        }
    }
}

/// Rejects any edit that moves an existing plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenOrderValidator;

impl GroupValidator for FrozenOrderValidator {
    fn validate(&self, input: &GroupValidationInput<'_>, errors: &mut ValidationErrors) {
        for plugin in input.plugins.iter().filter(|plugin| plugin.moved()) {
            if let Some(edit) = plugin.edit {
                errors.add_edit(edit, "Moving plugin is not allowed.");
            }
        }
    }
}

/// Validators addressable by the name stored on a group.
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn GroupValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        validator: impl GroupValidator + 'static,
    ) -> Self {
        self.validators.insert(name.into(), Arc::new(validator));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GroupValidator>> {
        self.validators.get(name).cloned()
    }
}
