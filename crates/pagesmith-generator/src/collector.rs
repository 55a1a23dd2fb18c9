//! Transitive asset dependency collection.
//!
//! Walks a page's dependency descriptors depth-first and produces the ordered,
//! deduplicated list of stylesheets and scripts the page needs. A component
//! reached through several parents contributes its assets once, at the
//! position where it is first reached.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use pagesmith_core::{Asset, AssetFilter, CollectedAssets, DependencyDescriptor};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

/// Collector errors.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A declared asset does not exist under the asset root.
    #[error("asset {path} declared by {component} not found")]
    MissingAsset { component: String, path: PathBuf },

    /// Components reference each other in a loop.
    #[error("component dependency cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}

/// Result type for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Asset kinds a descriptor has already contributed in one walk.
#[derive(Debug, Clone, Copy, Default)]
struct Contributed {
    stylesheets: bool,
    scripts: bool,
}

#[derive(Default)]
struct Walk {
    contributed: HashMap<usize, Contributed>,
    stack: Vec<(usize, String)>,
}

/// Resolves dependency descriptors against an asset root.
#[derive(Debug, Clone)]
pub struct DependencyCollector {
    asset_root: PathBuf,
}

impl DependencyCollector {
    /// Create a collector resolving relative asset paths under `asset_root`.
    #[must_use]
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        let asset_root = asset_root.into();
        let asset_root = asset_root.canonicalize().unwrap_or(asset_root);
        Self { asset_root }
    }

    /// The asset root.
    #[must_use]
    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    /// Collect the transitive assets of `descriptor`.
    ///
    /// Paths already present in `seen` are skipped and every path emitted is
    /// added to it, so one `seen` set can be threaded through several calls.
    pub fn collect(
        &self,
        descriptor: &Arc<DependencyDescriptor>,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<CollectedAssets> {
        let mut out = CollectedAssets::default();
        let mut walk = Walk::default();
        self.visit(descriptor, AssetFilter::All, &mut walk, seen, &mut out)?;

        debug!(
            component = %descriptor.owner,
            stylesheets = out.stylesheets.len(),
            scripts = out.scripts.len(),
            "collected assets"
        );
        Ok(out)
    }

    /// Collect a single page's assets starting from an empty `seen` set.
    pub fn collect_page(&self, descriptor: &Arc<DependencyDescriptor>) -> Result<CollectedAssets> {
        self.collect(descriptor, &mut HashSet::new())
    }

    /// Collect several pages in parallel, preserving input order.
    pub fn collect_pages(
        &self,
        descriptors: &[Arc<DependencyDescriptor>],
    ) -> Result<Vec<CollectedAssets>> {
        descriptors
            .par_iter()
            .map(|descriptor| self.collect_page(descriptor))
            .collect()
    }

    fn visit(
        &self,
        descriptor: &Arc<DependencyDescriptor>,
        filter: AssetFilter,
        walk: &mut Walk,
        seen: &mut HashSet<PathBuf>,
        out: &mut CollectedAssets,
    ) -> Result<()> {
        let id = Arc::as_ptr(descriptor) as usize;

        if let Some(pos) = walk.stack.iter().position(|(active, _)| *active == id) {
            let mut chain: Vec<String> = walk.stack[pos..].iter().map(|(_, n)| n.clone()).collect();
            chain.push(descriptor.owner.clone());
            return Err(CollectorError::Cycle { chain });
        }

        let done = walk.contributed.entry(id).or_default();
        let stylesheets = filter.stylesheets() && !done.stylesheets;
        let scripts = filter.scripts() && !done.scripts;
        let Some(pending) = kinds(stylesheets, scripts) else {
            return Ok(());
        };
        done.stylesheets |= stylesheets;
        done.scripts |= scripts;

        if stylesheets {
            for path in &descriptor.stylesheets {
                if let Some(asset) = self.resolve(descriptor, path, seen)? {
                    out.stylesheets.push(asset);
                }
            }
        }
        if scripts {
            for path in &descriptor.scripts {
                if let Some(asset) = self.resolve(descriptor, path, seen)? {
                    out.scripts.push(asset);
                }
            }
        }

        walk.stack.push((id, descriptor.owner.clone()));
        for child in &descriptor.components {
            if let Some(child_filter) = pending.intersect(child.filter) {
                self.visit(&child.descriptor, child_filter, walk, seen, out)?;
            }
        }
        walk.stack.pop();

        Ok(())
    }

    fn resolve(
        &self,
        descriptor: &DependencyDescriptor,
        path: &Path,
        seen: &mut HashSet<PathBuf>,
    ) -> Result<Option<Asset>> {
        let missing = || CollectorError::MissingAsset {
            component: descriptor.owner.clone(),
            path: path.to_path_buf(),
        };

        let joined = self.asset_root.join(path);
        if !joined.is_file() {
            return Err(missing());
        }
        let resolved = joined.canonicalize().map_err(|_| missing())?;
        if !resolved.starts_with(&self.asset_root) {
            return Err(missing());
        }

        if !seen.insert(resolved.clone()) {
            return Ok(None);
        }
        Ok(Some(Asset::new(resolved, &self.asset_root)))
    }
}

fn kinds(stylesheets: bool, scripts: bool) -> Option<AssetFilter> {
    match (stylesheets, scripts) {
        (true, true) => Some(AssetFilter::All),
        (true, false) => Some(AssetFilter::Stylesheets),
        (false, true) => Some(AssetFilter::Scripts),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pagesmith_core::ComponentRef;
    use tempfile::TempDir;

    use super::*;

    fn asset_dir(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "/* asset */").unwrap();
        }
        dir
    }

    fn urls(assets: &[Asset]) -> Vec<&str> {
        assets.iter().map(|a| a.url_path.as_str()).collect()
    }

    #[test]
    fn test_depth_first_order_and_dedup() {
        let dir = asset_dir(&["page.css", "header.css", "nav.css", "footer.css", "nav.js"]);
        let nav = DependencyDescriptor::new("nav")
            .stylesheet("nav.css")
            .script("nav.js")
            .shared();
        let header = DependencyDescriptor::new("header")
            .stylesheet("header.css")
            .component(ComponentRef::all(Arc::clone(&nav)))
            .shared();
        let footer = DependencyDescriptor::new("footer")
            .stylesheet("footer.css")
            .component(ComponentRef::all(Arc::clone(&nav)))
            .shared();
        let page = DependencyDescriptor::new("page")
            .stylesheet("page.css")
            .component(ComponentRef::all(header))
            .component(ComponentRef::all(footer))
            .shared();

        let assets = DependencyCollector::new(dir.path()).collect_page(&page).unwrap();

        assert_eq!(
            urls(&assets.stylesheets),
            vec!["page.css", "header.css", "nav.css", "footer.css"]
        );
        assert_eq!(urls(&assets.scripts), vec!["nav.js"]);
    }

    #[test]
    fn test_same_file_declared_twice() {
        let dir = asset_dir(&["shared.css"]);
        let child = DependencyDescriptor::new("child")
            .stylesheet("shared.css")
            .shared();
        let page = DependencyDescriptor::new("page")
            .stylesheet("shared.css")
            .stylesheet("./shared.css")
            .component(ComponentRef::all(child))
            .shared();

        let assets = DependencyCollector::new(dir.path()).collect_page(&page).unwrap();
        assert_eq!(urls(&assets.stylesheets), vec!["shared.css"]);
    }

    #[test]
    fn test_filters_apply_to_subtree() {
        let dir = asset_dir(&["island.css", "island.js", "inner.css", "inner.js"]);
        let inner = DependencyDescriptor::new("inner")
            .stylesheet("inner.css")
            .script("inner.js")
            .shared();
        let island = DependencyDescriptor::new("island")
            .stylesheet("island.css")
            .script("island.js")
            .component(ComponentRef::all(inner))
            .shared();

        let styles_page = DependencyDescriptor::new("page")
            .component(ComponentRef::stylesheets_only(Arc::clone(&island)))
            .shared();
        let scripts_page = DependencyDescriptor::new("page")
            .component(ComponentRef::scripts_only(Arc::clone(&island)))
            .shared();

        let collector = DependencyCollector::new(dir.path());

        let styles = collector.collect_page(&styles_page).unwrap();
        assert_eq!(urls(&styles.stylesheets), vec!["island.css", "inner.css"]);
        assert!(styles.scripts.is_empty());

        let scripts = collector.collect_page(&scripts_page).unwrap();
        assert!(scripts.stylesheets.is_empty());
        assert_eq!(urls(&scripts.scripts), vec!["island.js", "inner.js"]);
    }

    #[test]
    fn test_wider_revisit_adds_missing_kinds() {
        let dir = asset_dir(&["w.css", "w.js"]);
        let widget = DependencyDescriptor::new("widget")
            .stylesheet("w.css")
            .script("w.js")
            .shared();
        let page = DependencyDescriptor::new("page")
            .component(ComponentRef::stylesheets_only(Arc::clone(&widget)))
            .component(ComponentRef::all(widget))
            .shared();

        let assets = DependencyCollector::new(dir.path()).collect_page(&page).unwrap();
        assert_eq!(urls(&assets.stylesheets), vec!["w.css"]);
        assert_eq!(urls(&assets.scripts), vec!["w.js"]);
    }

    #[test]
    fn test_missing_asset() {
        let dir = asset_dir(&[]);
        let page = DependencyDescriptor::new("page")
            .stylesheet("missing.css")
            .shared();

        let err = DependencyCollector::new(dir.path())
            .collect_page(&page)
            .unwrap_err();
        assert!(matches!(
            err,
            CollectorError::MissingAsset { component, path }
                if component == "page" && path == Path::new("missing.css")
        ));
    }

    #[test]
    fn test_asset_outside_root_is_rejected() {
        let dir = asset_dir(&["assets/site.css", "secret.css"]);
        let page = DependencyDescriptor::new("page")
            .stylesheet("../secret.css")
            .shared();

        let err = DependencyCollector::new(dir.path().join("assets"))
            .collect_page(&page)
            .unwrap_err();
        assert!(matches!(err, CollectorError::MissingAsset { .. }));
    }

    #[test]
    fn test_seen_set_spans_calls() {
        let dir = asset_dir(&["base.css", "extra.css"]);
        let first = DependencyDescriptor::new("first")
            .stylesheet("base.css")
            .shared();
        let second = DependencyDescriptor::new("second")
            .stylesheet("base.css")
            .stylesheet("extra.css")
            .shared();

        let collector = DependencyCollector::new(dir.path());
        let mut seen = HashSet::new();
        collector.collect(&first, &mut seen).unwrap();
        let assets = collector.collect(&second, &mut seen).unwrap();

        assert_eq!(urls(&assets.stylesheets), vec!["extra.css"]);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_collect_pages_in_parallel() {
        let dir = asset_dir(&["a.css", "b.css"]);
        let pages = vec![
            DependencyDescriptor::new("a").stylesheet("a.css").shared(),
            DependencyDescriptor::new("b").stylesheet("b.css").shared(),
        ];

        let collected = DependencyCollector::new(dir.path())
            .collect_pages(&pages)
            .unwrap();
        assert_eq!(urls(&collected[0].stylesheets), vec!["a.css"]);
        assert_eq!(urls(&collected[1].stylesheets), vec!["b.css"]);
    }
}
