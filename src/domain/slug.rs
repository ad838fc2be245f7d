//! Slug and cache-scope derivation for containers and groups.
//!
//! Cache scopes are the namespaces fragment keys live under. They are derived
//! from slugs, so a slug rename moves every fragment of that container or
//! group into a fresh namespace.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;

/// Errors that can occur while generating or validating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("`{slug}` is not a valid slug (lowercase letters, digits, `-` and `_` only)")]
    Invalid { slug: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors raised by [`generate_unique_slug_async`].
#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a slug from human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Check an editor-supplied slug. Underscores are accepted because preview
/// slugs are joined with them.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    let valid = !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(SlugError::Invalid {
            slug: slug.to_string(),
        })
    }
}

/// Cache scope for a container or group with the given slug.
pub fn cache_scope(slug: &str) -> String {
    slug.to_string()
}

/// Produce a slug the supplied async predicate accepts as unique, suffixing
/// `-2`, `-3`, ... on collision.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(base.clone())
        .await
        .map_err(SlugAsyncError::Predicate)?
    {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(candidate.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

/// Names written onto a preview container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewNames {
    pub name: String,
    pub slug: String,
    pub cache_key: String,
}

impl PreviewNames {
    /// Names used for the first insert, before the preview has an identity.
    pub fn provisional(name: &str, slug: &str, stamp: &str) -> Self {
        let slug = format!("{slug}_{stamp}");
        Self {
            name: format!("{name} ({stamp})"),
            cache_key: cache_scope(&slug),
            slug,
        }
    }

    /// Stable names once the preview identity is known: `"{name} ({id})"` and
    /// `{slug}_{stamp}_{id}`.
    pub fn finalized(name: &str, slug: &str, stamp: &str, id: i64) -> Self {
        let slug = format!("{slug}_{stamp}_{id}");
        Self {
            name: format!("{name} ({id})"),
            cache_key: cache_scope(&slug),
            slug,
        }
    }
}
