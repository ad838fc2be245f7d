//! Collected validation failures for a batch of plugin edits.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Errors gathered across a whole batch: per-edit messages keyed by the
/// edit's index in the submitted batch, plus aggregate group-level messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub edits: BTreeMap<usize, Vec<String>>,
    pub group: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edit(&mut self, index: usize, message: impl Into<String>) {
        self.edits.entry(index).or_default().push(message.into());
    }

    pub fn add_group(&mut self, message: impl Into<String>) {
        self.group.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.group.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.values().map(Vec::len).sum::<usize>() + self.group.len()
    }

    pub fn for_edit(&self, index: usize) -> &[String] {
        self.edits.get(&index).map(Vec::as_slice).unwrap_or_default()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.len())?;
        for message in &self.group {
            write!(f, "; {message}")?;
        }
        for (index, messages) in &self.edits {
            for message in messages {
                write!(f, "; edit {index}: {message}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_edit_and_group_errors() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add_edit(2, "title is required");
        errors.add_edit(2, "slug is required");
        errors.add_group("Exactly 3 plugins are required");

        assert_eq!(errors.len(), 3);
        assert_eq!(errors.for_edit(2).len(), 2);
        assert!(errors.for_edit(0).is_empty());
        assert_eq!(
            errors.to_string(),
            "3 validation error(s); Exactly 3 plugins are required; edit 2: title is required; edit 2: slug is required"
        );
    }
}
