//! Asset copying and the asset manifest.
//!
//! Every collected stylesheet and script is copied to `<output>/<url_path>`
//! once per build, and `asset-manifest.json` records which page pulls in
//! which files.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use pagesmith_core::{Asset, CollectedAssets};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// File name of the manifest written to the output root.
pub const MANIFEST_FILE: &str = "asset-manifest.json";

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest serialization error.
    #[error("manifest error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid asset path.
    #[error("invalid asset path: {0}")]
    InvalidPath(String),
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Assets referenced by one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAssets {
    /// Stylesheet URL paths in link order.
    pub stylesheets: Vec<String>,

    /// Script URL paths in load order.
    pub scripts: Vec<String>,
}

impl From<&CollectedAssets> for PageAssets {
    fn from(assets: &CollectedAssets) -> Self {
        Self {
            stylesheets: assets.stylesheets.iter().map(|a| a.url_path.clone()).collect(),
            scripts: assets.scripts.iter().map(|a| a.url_path.clone()).collect(),
        }
    }
}

/// Record of copied assets and their use by pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// URL path to source file.
    pub files: BTreeMap<String, PathBuf>,

    /// Concrete page path to its assets.
    pub pages: BTreeMap<String, PageAssets>,
}

impl AssetManifest {
    /// Create a new empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a page's assets.
    pub fn add_page(&mut self, path: impl Into<String>, assets: &CollectedAssets) {
        for asset in assets.iter() {
            self.files
                .entry(asset.url_path.clone())
                .or_insert_with(|| asset.source.clone());
        }
        self.pages.insert(path.into(), PageAssets::from(assets));
    }

    /// Number of distinct files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Serialize manifest to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Copies collected assets into the output directory.
#[derive(Debug)]
pub struct AssetProcessor {
    output_dir: PathBuf,
}

impl AssetProcessor {
    /// Create a processor writing under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Copy every file in the manifest and write the manifest itself.
    ///
    /// Returns the number of files copied.
    pub fn process(&self, manifest: &AssetManifest) -> Result<usize> {
        info!(
            dest = %self.output_dir.display(),
            files = manifest.len(),
            "copying assets"
        );

        for (url_path, source) in &manifest.files {
            let asset = Asset {
                source: source.clone(),
                url_path: url_path.clone(),
            };
            self.copy(&asset)?;
        }

        fs::create_dir_all(&self.output_dir)?;
        fs::write(self.output_dir.join(MANIFEST_FILE), manifest.to_json()?)?;

        Ok(manifest.len())
    }

    fn copy(&self, asset: &Asset) -> Result<()> {
        let dest = self.destination(&asset.url_path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&asset.source, &dest)?;
        debug!(src = %asset.source.display(), dest = %dest.display(), "copied asset");
        Ok(())
    }

    fn destination(&self, url_path: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = url_path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() || segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(AssetError::InvalidPath(url_path.to_string()));
        }
        Ok(segments
            .iter()
            .fold(self.output_dir.clone(), |dir, segment| dir.join(segment)))
    }

    /// Output root.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
