//! HTML document assembly.
//!
//! Wraps a rendered page body in a full document: doctype, metadata, and the
//! page's collected stylesheets and scripts.

use std::path::{Path, PathBuf};

use pagesmith_core::{CollectedAssets, Config, PageMetadata};
use pagesmith_render::{Markup, Template, TemplateError};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// HTML generation errors.
#[derive(Debug, Error)]
pub enum HtmlError {
    /// Template error.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
}

/// Result type for HTML generation.
pub type Result<T> = std::result::Result<T, HtmlError>;

const DOCUMENT: &str = r#"<!DOCTYPE html>
<html lang="{{ lang }}">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{ title }}</title>
{{ head | raw }}</head>
<body>
{{ body | raw }}
{{ scripts | raw }}</body>
</html>
"#;

/// Builds complete documents for rendered pages.
#[derive(Debug)]
pub struct HtmlGenerator {
    config: Config,
    document: Template,
}

impl HtmlGenerator {
    /// Create a generator for the given site.
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            document: Template::parse("document", DOCUMENT)?,
        })
    }

    /// Site configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Assemble the document for `path`.
    pub fn document(
        &self,
        path: &str,
        body: &Markup,
        metadata: &PageMetadata,
        assets: &CollectedAssets,
    ) -> Result<String> {
        debug!(path, "assembling document");

        let site = &self.config.site;
        let title = match &metadata.title {
            Some(title) if title != &site.title => format!("{title} | {}", site.title),
            _ => site.title.clone(),
        };

        let mut head = Markup::new();
        let description = metadata.description.as_ref().or(site.description.as_ref());
        if let Some(description) = description {
            meta_tag(&mut head, "name", "description", description);
        }
        if !metadata.keywords.is_empty() {
            meta_tag(&mut head, "name", "keywords", &metadata.keywords.join(", "));
        }
        if let Some(author) = &site.author {
            meta_tag(&mut head, "name", "author", author);
        }

        let canonical = metadata
            .canonical_url
            .clone()
            .unwrap_or_else(|| self.config.url_for(path));
        head.push_raw("<link rel=\"canonical\" href=\"");
        head.push_text(&canonical);
        head.push_raw("\">\n");

        meta_tag(&mut head, "property", "og:title", &title);
        meta_tag(&mut head, "property", "og:url", &canonical);
        if let Some(image) = &metadata.image {
            meta_tag(&mut head, "property", "og:image", image);
        }

        for stylesheet in &assets.stylesheets {
            head.push_raw("<link rel=\"stylesheet\" href=\"");
            head.push_text(&self.config.asset_url(&stylesheet.url_path));
            head.push_raw("\">\n");
        }

        let mut scripts = Markup::new();
        for script in &assets.scripts {
            scripts.push_raw("<script type=\"module\" src=\"");
            scripts.push_text(&self.config.asset_url(&script.url_path));
            scripts.push_raw("\"></script>\n");
        }

        let html = self.document.render_static(&json!({
            "lang": site.language,
            "title": title,
            "head": head.as_str(),
            "body": body.as_str(),
            "scripts": scripts.as_str(),
        }))?;
        Ok(html.into_string())
    }
}

fn meta_tag(head: &mut Markup, attr: &str, name: &str, content: &str) {
    head.push_raw(&format!("<meta {attr}=\"{name}\" content=\""));
    head.push_text(content);
    head.push_raw("\">\n");
}

/// Output file for a concrete path: `<root>/<path>/index.html`.
#[must_use]
pub fn output_path(output_dir: &Path, path: &str) -> PathBuf {
    let relative = path.trim_matches('/');

    if relative.is_empty() {
        output_dir.join("index.html")
    } else {
        relative
            .split('/')
            .fold(output_dir.to_path_buf(), |dir, segment| dir.join(segment))
            .join("index.html")
    }
}
