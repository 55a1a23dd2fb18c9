//! Site configuration management.

use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Characters escaped in an asset URL path segment: all but RFC 3986 unreserved.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Main configuration structure for Pagesmith.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Site-wide settings.
    pub site: SiteConfig,

    /// Build settings.
    #[serde(default)]
    pub build: BuildConfig,

    /// Page cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site title, used when a page declares none.
    pub title: String,

    /// Base URL for the site (e.g., "https://example.com").
    pub base_url: String,

    /// Document language code.
    #[serde(default = "default_language")]
    pub language: String,

    /// Site description for meta tags.
    #[serde(default)]
    pub description: Option<String>,

    /// Site author name.
    #[serde(default)]
    pub author: Option<String>,
}

/// Build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Output directory for the generated site.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory holding page definitions.
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,

    /// Directory holding reusable component definitions.
    #[serde(default = "default_components_dir")]
    pub components_dir: PathBuf,

    /// Root that stylesheet and script paths resolve against.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Maximum number of paths rendered at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Remove the output directory before building.
    #[serde(default = "default_true")]
    pub clean: bool,

    /// Whether to write `sitemap.xml`.
    #[serde(default = "default_true")]
    pub sitemap: bool,
}

/// How a stale timed entry is refreshed when it is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevalidateMode {
    /// Serve the stale HTML and refresh it in the background.
    #[default]
    Background,
    /// Wait for the refresh and serve its result.
    Blocking,
}

/// Page cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Stale entry refresh strategy.
    #[serde(default)]
    pub revalidate: RevalidateMode,

    /// File the cache is imported from before a build and exported to after it.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_language() -> String {
    "en".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

fn default_components_dir() -> PathBuf {
    PathBuf::from("components")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_concurrency() -> usize {
    8
}

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            pages_dir: default_pages_dir(),
            components_dir: default_components_dir(),
            assets_dir: default_assets_dir(),
            concurrency: default_concurrency(),
            clean: true,
            sitemap: true,
        }
    }
}

impl Config {
    /// Create a configuration with default build settings.
    pub fn new(title: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            site: SiteConfig {
                title: title.into(),
                base_url: base_url.into(),
                language: default_language(),
                description: None,
                author: None,
            },
            build: BuildConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            CoreError::config_with_source(
                format!("Failed to parse config file: {}", path.display()),
                e,
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration layered with `PAGESMITH__*` environment variables.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("PAGESMITH").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.site.title.is_empty() {
            return Err(CoreError::config("site.title cannot be empty"));
        }

        if self.site.base_url.is_empty() {
            return Err(CoreError::config("site.base_url cannot be empty"));
        }

        if self.build.concurrency == 0 {
            return Err(CoreError::config("build.concurrency must be at least 1"));
        }

        if self.site.base_url.ends_with('/') {
            tracing::warn!("site.base_url should not have a trailing slash");
        }

        Ok(())
    }

    /// Get the full URL for a path.
    pub fn url_for(&self, path: &str) -> String {
        let base = self.site.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Get the public URL of an asset given its path relative to the asset root.
    ///
    /// Each path segment is percent-encoded.
    pub fn asset_url(&self, url_path: &str) -> String {
        let encoded: Vec<String> = url_path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect();
        self.url_for(&encoded.join("/"))
    }
}
