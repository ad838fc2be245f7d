//! Include/exclude filtering of plugin types on a group.
//!
//! Each list holds one pattern per line: either an exact `app.model`
//! identifier or an `app.*` wildcard. An empty include list admits every
//! type; the exclude list is applied afterwards and can veto types the
//! include list admitted.

use crate::domain::entities::GroupRecord;
use crate::domain::error::DomainError;
use crate::domain::types::PluginTypeKey;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginPatterns {
    entries: Vec<String>,
}

impl PluginPatterns {
    /// Split a newline-delimited list, ignoring blank lines and surrounding
    /// whitespace.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    /// Like [`PluginPatterns::parse`] but rejects malformed lines.
    pub fn parse_strict(text: &str) -> Result<Self, DomainError> {
        let patterns = Self::parse(text);
        for entry in &patterns.entries {
            let well_formed = entry
                .split_once('.')
                .is_some_and(|(app, model)| !app.is_empty() && !model.is_empty() && !model.contains('.'));
            if !well_formed {
                return Err(DomainError::invalid_pattern(entry.clone()));
            }
        }
        Ok(patterns)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matches(&self, key: &PluginTypeKey) -> bool {
        let exact = key.to_string();
        let wildcard = key.wildcard();
        self.entries
            .iter()
            .any(|entry| *entry == exact || *entry == wildcard)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginFilter {
    include: PluginPatterns,
    exclude: PluginPatterns,
}

impl PluginFilter {
    pub fn new(include: PluginPatterns, exclude: PluginPatterns) -> Self {
        Self { include, exclude }
    }

    pub fn for_group(group: &GroupRecord) -> Self {
        Self::new(
            PluginPatterns::parse(&group.plugins_include),
            PluginPatterns::parse(&group.plugins_exclude),
        )
    }

    pub fn allows(&self, key: &PluginTypeKey) -> bool {
        if !self.include.is_empty() && !self.include.matches(key) {
            return false;
        }
        self.exclude.is_empty() || !self.exclude.matches(key)
    }
}
