use std::error::Error as StdError;

use thiserror::Error;

use crate::application::plugin::PluginError;
use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::domain::error::DomainError;
use crate::domain::types::Capability;
use crate::domain::validation::ValidationErrors;

/// The four failure categories callers react to differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing capability; never retried.
    PermissionDenied,
    /// Referenced entity does not exist; never retried.
    NotFound,
    /// Rejected input, reported as a whole.
    Validation,
    /// Storage or infrastructure failure; state was rolled back and the
    /// operation may be retried.
    Transaction,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing `{capability}` capability on container {container_id}")]
    PermissionDenied {
        capability: Capability,
        container_id: i64,
    },
    #[error("{entity} `{key}` not found")]
    NotFound { entity: &'static str, key: String },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("storage transaction failed: {0}")]
    Transaction(#[source] RepoError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AppError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn denied(capability: Capability, container_id: i64) -> Self {
        Self::PermissionDenied {
            capability,
            container_id,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::Validation(_) | AppError::Domain(_) => ErrorKind::Validation,
            AppError::Transaction(RepoError::NotFound) => ErrorKind::NotFound,
            AppError::Transaction(_) | AppError::Plugin(_) | AppError::Cache(_) => {
                ErrorKind::Transaction
            }
        }
    }

    /// Messages of this error and its sources, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        Self::Transaction(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
