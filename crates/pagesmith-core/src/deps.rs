//! Dependency descriptors attached to pages and components.
//!
//! A [`DependencyDescriptor`] lists the stylesheets and scripts a component
//! needs directly, plus references to the components it renders. Descriptors
//! are shared through [`Arc`], and the allocation is the component's identity
//! during collection: two pages pulling in the same `Arc` share one node.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Which asset kinds a component reference pulls in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFilter {
    /// Stylesheets and scripts.
    #[default]
    All,
    /// Stylesheets only; the component's scripts load independently.
    Stylesheets,
    /// Scripts only.
    Scripts,
}

impl AssetFilter {
    /// Whether stylesheets pass this filter.
    #[must_use]
    pub fn stylesheets(self) -> bool {
        matches!(self, Self::All | Self::Stylesheets)
    }

    /// Whether scripts pass this filter.
    #[must_use]
    pub fn scripts(self) -> bool {
        matches!(self, Self::All | Self::Scripts)
    }

    /// Narrow this filter by a nested one.
    ///
    /// Returns `None` when nothing passes both.
    #[must_use]
    pub fn intersect(self, other: Self) -> Option<Self> {
        match (self.stylesheets() && other.stylesheets(), self.scripts() && other.scripts()) {
            (true, true) => Some(Self::All),
            (true, false) => Some(Self::Stylesheets),
            (false, true) => Some(Self::Scripts),
            (false, false) => None,
        }
    }
}

/// A reference from one descriptor to another.
#[derive(Debug, Clone)]
pub struct ComponentRef {
    /// The referenced component's descriptor.
    pub descriptor: Arc<DependencyDescriptor>,

    /// Asset kinds pulled in through this reference.
    pub filter: AssetFilter,
}

impl ComponentRef {
    /// Reference a component with all of its assets.
    #[must_use]
    pub fn all(descriptor: Arc<DependencyDescriptor>) -> Self {
        Self {
            descriptor,
            filter: AssetFilter::All,
        }
    }

    /// Reference only a component's stylesheets (e.g. a lazily hydrated island).
    #[must_use]
    pub fn stylesheets_only(descriptor: Arc<DependencyDescriptor>) -> Self {
        Self {
            descriptor,
            filter: AssetFilter::Stylesheets,
        }
    }

    /// Reference only a component's scripts.
    #[must_use]
    pub fn scripts_only(descriptor: Arc<DependencyDescriptor>) -> Self {
        Self {
            descriptor,
            filter: AssetFilter::Scripts,
        }
    }
}

/// Declared CSS/JS assets and sub-components of a page or component.
#[derive(Debug, Clone, Default)]
pub struct DependencyDescriptor {
    /// Name of the component owning this descriptor, used in diagnostics.
    pub owner: String,

    /// Stylesheets in cascade order.
    pub stylesheets: Vec<PathBuf>,

    /// Scripts in load order.
    pub scripts: Vec<PathBuf>,

    /// Referenced sub-components.
    pub components: Vec<ComponentRef>,
}

impl DependencyDescriptor {
    /// Create an empty descriptor for the named component.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Add a stylesheet.
    #[must_use]
    pub fn stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.stylesheets.push(path.into());
        self
    }

    /// Add a script.
    #[must_use]
    pub fn script(mut self, path: impl Into<PathBuf>) -> Self {
        self.scripts.push(path.into());
        self
    }

    /// Add a component reference.
    #[must_use]
    pub fn component(mut self, reference: ComponentRef) -> Self {
        self.components.push(reference);
        self
    }

    /// Freeze the descriptor so it can be shared between components.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Whether the descriptor declares nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty() && self.scripts.is_empty() && self.components.is_empty()
    }
}

/// A resolved asset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Absolute path of the file on disk.
    pub source: PathBuf,

    /// Path relative to the asset root, with `/` separators.
    pub url_path: String,
}

impl Asset {
    /// Build an asset from a resolved file and the asset root it lives under.
    ///
    /// Files outside the root keep their file name only.
    #[must_use]
    pub fn new(source: PathBuf, root: &Path) -> Self {
        let relative = source
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(source.file_name().unwrap_or_default()));
        let url_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Self { source, url_path }
    }
}

/// Ordered, deduplicated output of a dependency collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedAssets {
    /// Stylesheets in first-seen order.
    pub stylesheets: Vec<Asset>,

    /// Scripts in first-seen order.
    pub scripts: Vec<Asset>,
}

impl CollectedAssets {
    /// Total number of assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stylesheets.len() + self.scripts.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty() && self.scripts.is_empty()
    }

    /// Iterate over every asset, stylesheets first.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.stylesheets.iter().chain(self.scripts.iter())
    }
}
