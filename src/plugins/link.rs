use askama::Template;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::application::plugin::{PluginError, PluginModel, RenderContext};
use crate::domain::entities::PluginRecord;

/// A labelled hyperlink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub slug: String,
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub new_tab: bool,
}

#[derive(Template)]
#[template(path = "plugins/link.html")]
struct LinkTemplate<'a> {
    slug: &'a str,
    label: &'a str,
    url: &'a str,
    new_tab: bool,
}

impl PluginModel for Link {
    const APP_LABEL: &'static str = "content";
    const MODEL_NAME: &'static str = "link";
    const DISPLAY_NAME: &'static str = "Link";

    fn slug(&self) -> &str {
        &self.slug
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.label.trim().is_empty() {
            problems.push("label: This field is required.".to_string());
        }
        let url = self.url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with('/')) {
            problems.push("url: Enter an absolute http(s) URL or a site path.".to_string());
        }
        problems
    }

    fn render(&self, base: &PluginRecord, _context: &RenderContext) -> Result<String, PluginError> {
        LinkTemplate {
            slug: &self.slug,
            label: &self.label,
            url: &self.url,
            new_tab: self.new_tab,
        }
        .render()
        .map_err(|err| PluginError::Render {
            id: base.id,
            key: base.type_key(),
            message: err.to_string(),
        })
    }

    fn data(&self, _base: &PluginRecord, _context: &RenderContext) -> Result<Value, PluginError> {
        Ok(json!({
            "slug": self.slug,
            "label": self.label,
            "href": self.url,
            "external": !self.url.starts_with('/'),
            "new_tab": self.new_tab,
        }))
    }
}
