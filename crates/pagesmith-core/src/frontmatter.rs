//! Frontmatter parsing for page and component files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    deps::AssetFilter,
    error::{CoreError, Result},
    page::{CachePolicy, PageMetadata, Params, Props},
};

/// Frontmatter metadata for page and component files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    /// Route pattern (e.g. `/blog/[slug]`); derived from the file path when absent.
    #[serde(default)]
    pub route: Option<String>,

    /// Page title.
    #[serde(default)]
    pub title: Option<String>,

    /// Page description for meta tags.
    #[serde(default)]
    pub description: Option<String>,

    /// Social preview image.
    #[serde(default)]
    pub image: Option<String>,

    /// Meta keywords.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Canonical URL override.
    #[serde(default)]
    pub canonical: Option<String>,

    /// Cache policy for the rendered output.
    #[serde(default)]
    pub cache: Option<CachePolicy>,

    /// Stylesheets, relative to the asset root.
    #[serde(default)]
    pub stylesheets: Vec<PathBuf>,

    /// Scripts, relative to the asset root.
    #[serde(default)]
    pub scripts: Vec<PathBuf>,

    /// Components whose assets this file depends on.
    #[serde(default)]
    pub components: Vec<ComponentUse>,

    /// Props passed to every render of this page.
    #[serde(default)]
    pub props: Option<Props>,

    /// Static paths for a dynamic route.
    #[serde(default)]
    pub paths: Option<Vec<PathSpec>>,
}

impl Frontmatter {
    /// Page metadata declared by this frontmatter.
    #[must_use]
    pub fn metadata(&self) -> PageMetadata {
        PageMetadata {
            title: self.title.clone(),
            description: self.description.clone(),
            image: self.image.clone(),
            keywords: self.keywords.clone(),
            canonical_url: self.canonical.clone(),
        }
    }
}

/// A component reference in frontmatter: `card` or `{ name: card, only: stylesheets }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentUse {
    /// Reference with all assets.
    Name(String),
    /// Reference restricted to some asset kinds.
    Filtered {
        /// Component name.
        name: String,
        /// Asset kinds to pull in.
        #[serde(default)]
        only: AssetFilter,
    },
}

impl ComponentUse {
    /// Referenced component name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Filtered { name, .. } => name,
        }
    }

    /// Asset kinds pulled in through this reference.
    #[must_use]
    pub fn filter(&self) -> AssetFilter {
        match self {
            Self::Name(_) => AssetFilter::All,
            Self::Filtered { only, .. } => *only,
        }
    }
}

/// One declared static path with optional per-path props.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSpec {
    /// Route parameter values.
    pub params: Params,

    /// Props merged over the page props for this path.
    #[serde(default)]
    pub props: Option<Props>,

    /// Title override for this path.
    #[serde(default)]
    pub title: Option<String>,

    /// Description override for this path.
    #[serde(default)]
    pub description: Option<String>,
}

/// Delimiter types for frontmatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontmatterFormat {
    /// YAML frontmatter delimited by `---`.
    Yaml,
    /// TOML frontmatter delimited by `+++`.
    Toml,
}

impl FrontmatterFormat {
    /// Get the delimiter string for this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Yaml => "---",
            Self::Toml => "+++",
        }
    }
}

/// Split content into frontmatter and body.
pub fn split_frontmatter(content: &str) -> Option<(FrontmatterFormat, &str, &str)> {
    let content = content.trim_start();

    let format = if content.starts_with("---") {
        FrontmatterFormat::Yaml
    } else if content.starts_with("+++") {
        FrontmatterFormat::Toml
    } else {
        return None;
    };

    let delimiter = format.delimiter();

    let after_first = &content[delimiter.len()..];
    let closing_pos = after_first.find(delimiter)?;

    let frontmatter = after_first[..closing_pos].trim();
    let body = after_first[closing_pos + delimiter.len()..].trim_start();

    Some((format, frontmatter, body))
}

/// Parse frontmatter from a string, returning it with the remaining body.
pub fn parse_frontmatter(content: &str, path: &Path) -> Result<(Frontmatter, String)> {
    let Some((format, fm_str, body)) = split_frontmatter(content) else {
        return Ok((Frontmatter::default(), content.to_string()));
    };

    let frontmatter: Frontmatter = match format {
        FrontmatterFormat::Yaml if fm_str.is_empty() => Frontmatter::default(),
        FrontmatterFormat::Yaml => {
            serde_yaml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
        FrontmatterFormat::Toml => {
            toml::from_str(fm_str).map_err(|e| CoreError::frontmatter(path, e.to_string()))?
        }
    };

    Ok((frontmatter, body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_yaml() {
        let content = "---\ntitle: Hello\n---\n<p>body</p>";
        let (format, fm, body) = split_frontmatter(content).unwrap();
        assert_eq!(format, FrontmatterFormat::Yaml);
        assert_eq!(fm, "title: Hello");
        assert_eq!(body, "<p>body</p>");
    }

    #[test]
    fn test_no_frontmatter() {
        let (fm, body) = parse_frontmatter("<p>plain</p>", Path::new("a.html")).unwrap();
        assert!(fm.title.is_none());
        assert_eq!(body, "<p>plain</p>");
    }

    #[test]
    fn test_parse_page_frontmatter() {
        let content = r#"---
route: /dynamic/[slug]
title: Dynamic
keywords: [a, b]
cache:
  revalidate: 30
  tags: [posts]
stylesheets: [css/page.css]
components:
  - header
  - name: counter
    only: stylesheets
props:
  greeting: hi
paths:
  - params: { slug: a }
    title: Page A
  - params: { slug: b }
    props: { extra: 1 }
---
<h1>{{ greeting }}</h1>"#;

        let (fm, body) = parse_frontmatter(content, Path::new("pages/x.html")).unwrap();
        assert_eq!(fm.route.as_deref(), Some("/dynamic/[slug]"));
        assert_eq!(fm.cache, Some(CachePolicy::timed(30, ["posts"])));
        assert_eq!(fm.stylesheets, vec![PathBuf::from("css/page.css")]);
        assert_eq!(fm.components[0], ComponentUse::Name("header".to_string()));
        assert_eq!(fm.components[1].name(), "counter");
        assert_eq!(fm.components[1].filter(), AssetFilter::Stylesheets);
        assert_eq!(fm.props.as_ref().unwrap()["greeting"], "hi");

        let paths = fm.paths.as_ref().unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].params["slug"], "a");
        assert_eq!(paths[0].title.as_deref(), Some("Page A"));
        assert_eq!(paths[1].props.as_ref().unwrap()["extra"], 1);

        assert_eq!(fm.metadata().title.as_deref(), Some("Dynamic"));
        assert_eq!(fm.metadata().keywords, vec!["a", "b"]);
        assert_eq!(body, "<h1>{{ greeting }}</h1>");
    }

    #[test]
    fn test_parse_toml_frontmatter() {
        let content = "+++\ntitle = \"Toml\"\ncache = \"none\"\n+++\nBody";
        let (fm, body) = parse_frontmatter(content, Path::new("a.md")).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Toml"));
        assert_eq!(fm.cache, Some(CachePolicy::NoCache));
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_invalid_frontmatter_reports_path() {
        let content = "---\ncache: [1, 2\n---\nBody";
        let err = parse_frontmatter(content, Path::new("pages/bad.md")).unwrap_err();
        assert!(err.to_string().contains("pages/bad.md"));
    }
}
