//! Cached render-tag lookups.
//!
//! Each lookup derives a fragment key for its purpose under the group's
//! current generation, serves a hit directly and otherwise resolves, renders
//! and stores the result. Cache failures degrade to uncached rendering.

use std::future::Future;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

use crate::application::error::AppError;
use crate::application::plugin::RenderContext;
use crate::application::resolver::PluginResolver;
use crate::cache::{CacheKeyDeriver, FragmentCache, FragmentPurpose, KeyRequest};
use crate::domain::entities::StoredPlugin;
use crate::domain::slug::cache_scope;

pub struct FragmentService {
    resolver: PluginResolver,
    cache: Arc<FragmentCache>,
    deriver: CacheKeyDeriver,
}

impl FragmentService {
    pub fn new(resolver: PluginResolver, cache: Arc<FragmentCache>) -> Self {
        let deriver = CacheKeyDeriver::new(Arc::clone(&cache));
        Self {
            resolver,
            cache,
            deriver,
        }
    }

    pub async fn plugin_list(
        &self,
        context: &RenderContext,
        container_slug: &str,
        group_slug: &str,
    ) -> Result<Vec<StoredPlugin>, AppError> {
        let container_slug = preview_slug(context, container_slug);
        let request = key_request(
            FragmentPurpose::PluginList,
            context,
            container_slug,
            group_slug,
            None,
        );
        let plugins = self
            .cached(request, || async move {
                self.resolver
                    .resolve_stored(container_slug, group_slug, context.language.as_deref())
                    .await
                    .map(Some)
            })
            .await?;
        Ok(plugins.unwrap_or_default())
    }

    pub async fn rendered_plugin_list(
        &self,
        context: &RenderContext,
        container_slug: &str,
        group_slug: &str,
    ) -> Result<Vec<String>, AppError> {
        let container_slug = preview_slug(context, container_slug);
        let request = key_request(
            FragmentPurpose::RenderedPluginList,
            context,
            container_slug,
            group_slug,
            None,
        );
        let rendered = self
            .cached(request, || async move {
                let plugins = self
                    .resolver
                    .resolve(container_slug, group_slug, context.language.as_deref())
                    .await?;
                let markup = plugins
                    .iter()
                    .map(|plugin| plugin.render(context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, AppError>(Some(markup))
            })
            .await?;
        Ok(rendered.unwrap_or_default())
    }

    pub async fn data_plugin_list(
        &self,
        context: &RenderContext,
        container_slug: &str,
        group_slug: &str,
    ) -> Result<Vec<Value>, AppError> {
        let container_slug = preview_slug(context, container_slug);
        let request = key_request(
            FragmentPurpose::DataPluginList,
            context,
            container_slug,
            group_slug,
            None,
        );
        let data = self
            .cached(request, || async move {
                let plugins = self
                    .resolver
                    .resolve(container_slug, group_slug, context.language.as_deref())
                    .await?;
                let values = plugins
                    .iter()
                    .map(|plugin| plugin.data(context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok::<_, AppError>(Some(values))
            })
            .await?;
        Ok(data.unwrap_or_default())
    }

    pub async fn plugin(
        &self,
        context: &RenderContext,
        container_slug: &str,
        group_slug: &str,
        plugin_slug: &str,
    ) -> Result<Option<StoredPlugin>, AppError> {
        let container_slug = preview_slug(context, container_slug);
        let request = key_request(
            FragmentPurpose::Plugin,
            context,
            container_slug,
            group_slug,
            Some(plugin_slug),
        );
        self.cached(request, || async move {
            for stored in self
                .resolver
                .resolve_stored(container_slug, group_slug, context.language.as_deref())
                .await?
            {
                if self.resolver.instantiate(stored.clone())?.slug() == plugin_slug {
                    return Ok(Some(stored));
                }
            }
            Ok::<_, AppError>(None)
        })
        .await
    }

    pub async fn rendered_plugin(
        &self,
        context: &RenderContext,
        container_slug: &str,
        group_slug: &str,
        plugin_slug: &str,
    ) -> Result<Option<String>, AppError> {
        let container_slug = preview_slug(context, container_slug);
        let request = key_request(
            FragmentPurpose::RenderedPlugin,
            context,
            container_slug,
            group_slug,
            Some(plugin_slug),
        );
        self.cached(request, || async move {
            let plugins = self
                .resolver
                .resolve(container_slug, group_slug, context.language.as_deref())
                .await?;
            match plugins.iter().find(|plugin| plugin.slug() == plugin_slug) {
                Some(plugin) => Ok(Some(plugin.render(context)?)),
                None => Ok::<_, AppError>(None),
            }
        })
        .await
    }

    pub async fn data_plugin(
        &self,
        context: &RenderContext,
        container_slug: &str,
        group_slug: &str,
        plugin_slug: &str,
    ) -> Result<Option<Value>, AppError> {
        let container_slug = preview_slug(context, container_slug);
        let request = key_request(
            FragmentPurpose::DataPlugin,
            context,
            container_slug,
            group_slug,
            Some(plugin_slug),
        );
        self.cached(request, || async move {
            let plugins = self
                .resolver
                .resolve(container_slug, group_slug, context.language.as_deref())
                .await?;
            match plugins.iter().find(|plugin| plugin.slug() == plugin_slug) {
                Some(plugin) => Ok(Some(plugin.data(context)?)),
                None => Ok::<_, AppError>(None),
            }
        })
        .await
    }

    /// Serve `request` from the cache or compute and store it. `None`
    /// results are not stored.
    async fn cached<T, F, Fut>(
        &self,
        request: KeyRequest,
        compute: F,
    ) -> Result<Option<T>, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, AppError>>,
    {
        let key = match self.deriver.derive(&request).await {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(
                    scope = %request.scope,
                    purpose = %request.purpose,
                    error = %err,
                    "Fragment key derivation failed; rendering uncached"
                );
                None
            }
        };

        if let Some(key) = key.as_ref() {
            match self.cache.get::<T>(key).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => {}
                Err(err) => warn!(key = %key, error = %err, "Fragment cache read failed"),
            }
        }

        let value = compute().await?;
        if let (Some(key), Some(value)) = (key.as_ref(), value.as_ref()) {
            if let Err(err) = self.cache.set(key, value, None).await {
                warn!(key = %key, error = %err, "Fragment cache write failed");
            }
        }
        Ok(value)
    }
}

/// The container slug to read, honouring a `?{slug}=<preview slug>` override.
fn preview_slug<'a>(context: &'a RenderContext, container_slug: &'a str) -> &'a str {
    context.query_param(container_slug).unwrap_or(container_slug)
}

fn key_request(
    purpose: FragmentPurpose,
    context: &RenderContext,
    container_slug: &str,
    group_slug: &str,
    item: Option<&str>,
) -> KeyRequest {
    let mut request = KeyRequest::new(
        purpose.as_str(),
        cache_scope(container_slug),
        cache_scope(group_slug),
    );
    if let Some(item) = item {
        request = request.with_item(item);
    }
    if let Some(language) = context.language.as_deref() {
        request = request.with_arg("language", language);
    }
    request
}
