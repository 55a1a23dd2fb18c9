//! Sitemap generation.

use std::io::Write;

use chrono::{DateTime, Utc};
use pagesmith_core::Config;
use thiserror::Error;
use tracing::debug;

/// Sitemap generation errors.
#[derive(Debug, Error)]
pub enum SitemapError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sitemap operations.
pub type Result<T> = std::result::Result<T, SitemapError>;

/// One sitemap entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapUrl {
    /// Concrete page path.
    pub path: String,

    /// When the page was last rendered.
    pub lastmod: Option<DateTime<Utc>>,
}

impl SitemapUrl {
    /// Entry for a path with no modification time.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            lastmod: None,
        }
    }

    /// Set the modification time.
    #[must_use]
    pub fn with_lastmod(mut self, lastmod: DateTime<Utc>) -> Self {
        self.lastmod = Some(lastmod);
        self
    }
}

/// Sitemap generator.
#[derive(Debug)]
pub struct SitemapGenerator {
    config: Config,
}

impl SitemapGenerator {
    /// Create a new sitemap generator.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Generate sitemap XML; entries are sorted by path.
    #[must_use]
    pub fn generate(&self, urls: &[SitemapUrl]) -> String {
        debug!(count = urls.len(), "generating sitemap");

        let mut sorted: Vec<&SitemapUrl> = urls.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        xml.push('\n');

        for url in sorted {
            xml.push_str("  <url>\n");
            xml.push_str(&format!(
                "    <loc>{}</loc>\n",
                escape_xml(&self.config.url_for(&url.path))
            ));
            if let Some(lastmod) = &url.lastmod {
                xml.push_str(&format!(
                    "    <lastmod>{}</lastmod>\n",
                    lastmod.format("%Y-%m-%d")
                ));
            }
            let priority = if url.path == "/" { 1.0 } else { 0.5 };
            xml.push_str(&format!("    <priority>{priority:.1}</priority>\n"));
            xml.push_str("  </url>\n");
        }

        xml.push_str("</urlset>\n");
        xml
    }

    /// Write sitemap to a writer.
    pub fn write_to<W: Write>(&self, urls: &[SitemapUrl], writer: &mut W) -> Result<()> {
        writer.write_all(self.generate(urls).as_bytes())?;
        Ok(())
    }
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
