use thiserror::Error;

use crate::domain::slug::SlugError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invariant violated: {message}")]
    Invariant { message: String },
    #[error("`{pattern}` is not an `app.model` or `app.*` plugin pattern")]
    InvalidPattern { pattern: String },
    #[error("`{field}` must not be empty")]
    Blank { field: &'static str },
    #[error(transparent)]
    Slug(#[from] SlugError),
}

impl DomainError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
        }
    }
}
