use askama::Template;
use serde::{Deserialize, Serialize};

use crate::application::plugin::{PluginError, PluginModel, RenderContext};
use crate::domain::entities::PluginRecord;

/// A titled block of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Template)]
#[template(path = "plugins/snippet.html")]
struct SnippetTemplate<'a> {
    slug: &'a str,
    title: &'a str,
    body: &'a str,
    language: &'a str,
}

impl PluginModel for Snippet {
    const APP_LABEL: &'static str = "content";
    const MODEL_NAME: &'static str = "snippet";
    const DISPLAY_NAME: &'static str = "Snippet";

    fn slug(&self) -> &str {
        &self.slug
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.slug.trim().is_empty() {
            problems.push("slug: This field is required.".to_string());
        }
        if self.title.trim().is_empty() {
            problems.push("title: This field is required.".to_string());
        }
        problems
    }

    fn render(&self, base: &PluginRecord, context: &RenderContext) -> Result<String, PluginError> {
        SnippetTemplate {
            slug: &self.slug,
            title: &self.title,
            body: &self.body,
            language: context.language.as_deref().unwrap_or_default(),
        }
        .render()
        .map_err(|err| PluginError::Render {
            id: base.id,
            key: base.type_key(),
            message: err.to_string(),
        })
    }
}
