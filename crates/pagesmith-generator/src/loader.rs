//! Loads pages and components from a site directory.
//!
//! Layout:
//!
//! - `components/` holds reusable components, named by their path without
//!   extension (`components/layout/header.html` is `layout/header`)
//! - `pages/` holds pages; the route comes from frontmatter `route` or from
//!   the file path (`pages/blog/[slug].md` is `/blog/[slug]`, `index` files map
//!   to their directory)
//!
//! Component references, both declared in frontmatter and implied by
//! `{{> name }}` includes, must form a DAG.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::FutureExt;
use pagesmith_core::{
    AssetFilter, ComponentRef, Config, CoreError, DependencyDescriptor, Frontmatter, PageMetadata,
    PageProps, Props, StaticPathEntry, frontmatter::parse_frontmatter,
};
use pagesmith_render::{Adapter, AdapterRegistry, Body, Component, ComponentRegistry, TemplateError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    page::PageDefinition,
    route::RouteError,
};

/// Loader errors.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Frontmatter error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Template syntax error.
    #[error("template error in {path}: {source}")]
    Template {
        path: PathBuf,
        source: TemplateError,
    },

    /// Invalid route.
    #[error("{path}: {source}")]
    Route { path: PathBuf, source: RouteError },

    /// Reference to a component that does not exist.
    #[error("{referrer} references unknown component `{name}`")]
    UnknownComponent { referrer: String, name: String },

    /// Components reference each other in a loop.
    #[error("component reference cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// Two files define the same component.
    #[error("component `{name}` defined by both {first} and {second}")]
    DuplicateComponent {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A component includes one rendered by a different adapter.
    #[error("{path} ({kind}) includes {include} ({include_kind}); included components must have the same kind")]
    MixedInclude {
        path: PathBuf,
        kind: &'static str,
        include: PathBuf,
        include_kind: &'static str,
    },

    /// The file's adapter cannot be loaded from disk.
    #[error("{path}: {adapter} definitions must be registered in code")]
    Unsupported { path: PathBuf, adapter: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Pages and components loaded from disk.
#[derive(Debug, Default)]
pub struct Site {
    /// Page definitions in path order.
    pub pages: Vec<PageDefinition>,

    /// Reusable components.
    pub components: ComponentRegistry,
}

/// A parsed file before its dependencies are resolved.
struct Source {
    name: String,
    path: PathBuf,
    frontmatter: Frontmatter,
    component: Component,
}

impl Source {
    /// Components rendered inline through `{{> name }}`.
    fn includes(&self) -> Vec<&str> {
        match self.component.body() {
            Body::Template(template) | Body::Markdown(template) => template.includes().collect(),
            Body::Tree(_) => Vec::new(),
        }
    }

    /// Included components render through this file's adapter, so they must
    /// share its body kind.
    fn check_includes(&self, sources: &HashMap<String, Source>) -> Result<()> {
        let kind = self.component.body().kind();
        for name in self.includes() {
            let Some(target) = sources.get(name) else {
                continue;
            };
            let include_kind = target.component.body().kind();
            if include_kind != kind {
                return Err(LoaderError::MixedInclude {
                    path: self.path.clone(),
                    kind,
                    include: target.path.clone(),
                    include_kind,
                });
            }
        }
        Ok(())
    }

    /// Referenced components: frontmatter order first, then template includes.
    fn references(&self) -> Vec<(String, AssetFilter)> {
        let mut refs: Vec<(String, AssetFilter)> = self
            .frontmatter
            .components
            .iter()
            .map(|c| (c.name().to_string(), c.filter()))
            .collect();

        for name in self.includes() {
            if !refs.iter().any(|(known, _)| known == name) {
                refs.push((name.to_string(), AssetFilter::All));
            }
        }
        refs
    }
}

/// Reads a site directory into page definitions.
#[derive(Debug)]
pub struct SiteLoader<'a> {
    config: &'a Config,
    root: PathBuf,
    adapters: &'a AdapterRegistry,
}

impl<'a> SiteLoader<'a> {
    /// Create a loader for the site rooted at `root`; configured directories are relative to it.
    #[must_use]
    pub fn new(config: &'a Config, root: impl Into<PathBuf>, adapters: &'a AdapterRegistry) -> Self {
        Self {
            config,
            root: root.into(),
            adapters,
        }
    }

    /// Load every component and page.
    pub fn load(&self) -> Result<Site> {
        let components_dir = self.root.join(&self.config.build.components_dir);
        let pages_dir = self.root.join(&self.config.build.pages_dir);

        let mut sources: HashMap<String, Source> = HashMap::new();
        for source in self.read_dir(&components_dir)? {
            if let Some(existing) = sources.get(&source.name) {
                return Err(LoaderError::DuplicateComponent {
                    name: source.name.clone(),
                    first: existing.path.clone(),
                    second: source.path,
                });
            }
            sources.insert(source.name.clone(), source);
        }

        let mut resolved: HashMap<String, Arc<DependencyDescriptor>> = HashMap::new();
        let mut names: Vec<&String> = sources.keys().collect();
        names.sort();
        for name in names {
            descriptor(name, &sources, &mut resolved, &mut Vec::new())?;
        }

        let page_sources = self.read_dir(&pages_dir)?;
        for source in &page_sources {
            source.check_includes(&sources)?;
        }

        let mut components = ComponentRegistry::new();
        for (name, source) in sources {
            let deps = resolved
                .get(&name)
                .cloned()
                .unwrap_or_else(|| DependencyDescriptor::new(name.clone()).shared());
            components.register(source.component.with_dependencies(deps));
        }

        let mut pages = Vec::new();
        for source in page_sources {
            pages.push(self.page(source, &resolved)?);
        }

        info!(
            pages = pages.len(),
            components = components.len(),
            "loaded site"
        );
        Ok(Site { pages, components })
    }

    fn read_dir(&self, dir: &Path) -> Result<Vec<Source>> {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "directory not found, skipping");
            return Ok(Vec::new());
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(adapter) = self.adapters.select(path) else {
                debug!(path = %path.display(), "no adapter for file, skipping");
                continue;
            };

            let relative = path.strip_prefix(dir).unwrap_or(path);
            let name = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let content = fs::read_to_string(path)?;
            let (frontmatter, body) = parse_frontmatter(&content, path)?;
            let template_error = |source| LoaderError::Template {
                path: path.to_path_buf(),
                source,
            };
            let component = match adapter {
                Adapter::Template(_) => {
                    Component::template(name.clone(), path, &body).map_err(template_error)?
                }
                Adapter::Markdown(_) => {
                    Component::markdown(name.clone(), path, &body).map_err(template_error)?
                }
                Adapter::Component(_) => {
                    return Err(LoaderError::Unsupported {
                        path: path.to_path_buf(),
                        adapter: "component".to_string(),
                    });
                }
            };

            debug!(name = %name, path = %path.display(), "loaded definition");
            sources.push(Source {
                name,
                path: path.to_path_buf(),
                frontmatter,
                component,
            });
        }
        Ok(sources)
    }

    fn page(
        &self,
        source: Source,
        components: &HashMap<String, Arc<DependencyDescriptor>>,
    ) -> Result<PageDefinition> {
        let route = source
            .frontmatter
            .route
            .clone()
            .unwrap_or_else(|| route_from_name(&source.name));
        let page_name = format!("page:{}", source.name);

        let mut deps = own_assets(&page_name, &source.frontmatter);
        for (name, filter) in source.references() {
            let descriptor = components.get(&name).ok_or_else(|| LoaderError::UnknownComponent {
                referrer: page_name.clone(),
                name: name.clone(),
            })?;
            deps = deps.component(ComponentRef {
                descriptor: Arc::clone(descriptor),
                filter,
            });
        }

        let Source {
            path,
            frontmatter,
            component,
            ..
        } = source;
        let component = Arc::new(component.with_dependencies(deps.shared()));
        let route_error = |source| LoaderError::Route {
            path: path.clone(),
            source,
        };

        let base_props = frontmatter
            .props
            .clone()
            .unwrap_or_else(|| Props::Object(serde_json::Map::new()));
        let mut page = PageDefinition::new(&route, component)
            .map_err(route_error)?
            .with_cache(frontmatter.cache.clone().unwrap_or_default())
            .with_metadata(frontmatter.metadata())
            .with_props(base_props.clone());

        if let Some(specs) = frontmatter.paths {
            let entries: Vec<StaticPathEntry> = specs
                .iter()
                .map(|spec| StaticPathEntry {
                    params: spec.params.clone(),
                })
                .collect();
            let specs = Arc::new(specs);

            page = page.with_paths(entries).with_static_props(move |params| {
                let specs = Arc::clone(&specs);
                let base = base_props.clone();
                async move {
                    let spec = specs.iter().find(|spec| spec.params == params);
                    let mut props = merge_props(&base, spec.and_then(|s| s.props.as_ref()));
                    if let Value::Object(map) = &mut props {
                        map.insert("params".to_string(), serde_json::to_value(&params).unwrap_or_default());
                    }
                    Ok(PageProps {
                        props,
                        metadata: PageMetadata {
                            title: spec.and_then(|s| s.title.clone()),
                            description: spec.and_then(|s| s.description.clone()),
                            ..PageMetadata::default()
                        },
                    })
                }
                .boxed()
            });
        }

        debug!(route = %route, path = %path.display(), "loaded page");
        Ok(page)
    }
}

fn own_assets(owner: &str, frontmatter: &Frontmatter) -> DependencyDescriptor {
    let mut deps = DependencyDescriptor::new(owner);
    deps.stylesheets = frontmatter.stylesheets.clone();
    deps.scripts = frontmatter.scripts.clone();
    deps
}

/// Resolve a component's descriptor, resolving its references first.
fn descriptor(
    name: &str,
    sources: &HashMap<String, Source>,
    resolved: &mut HashMap<String, Arc<DependencyDescriptor>>,
    stack: &mut Vec<String>,
) -> Result<Arc<DependencyDescriptor>> {
    if let Some(done) = resolved.get(name) {
        return Ok(Arc::clone(done));
    }
    if let Some(pos) = stack.iter().position(|active| active == name) {
        let mut chain = stack[pos..].to_vec();
        chain.push(name.to_string());
        return Err(LoaderError::Cycle { chain });
    }

    let source = sources.get(name).ok_or_else(|| LoaderError::UnknownComponent {
        referrer: stack.last().cloned().unwrap_or_default(),
        name: name.to_string(),
    })?;

    source.check_includes(sources)?;

    stack.push(name.to_string());
    let mut deps = own_assets(name, &source.frontmatter);
    for (child, filter) in source.references() {
        if !sources.contains_key(&child) {
            return Err(LoaderError::UnknownComponent {
                referrer: name.to_string(),
                name: child,
            });
        }
        deps = deps.component(ComponentRef {
            descriptor: descriptor(&child, sources, resolved, stack)?,
            filter,
        });
    }
    stack.pop();

    let deps = deps.shared();
    resolved.insert(name.to_string(), Arc::clone(&deps));
    Ok(deps)
}

/// Route for a page file name: `blog/index` is `/blog`, `index` is `/`.
fn route_from_name(name: &str) -> String {
    let trimmed = match name.strip_suffix("index") {
        Some(rest) if rest.is_empty() || rest.ends_with('/') => rest.trim_end_matches('/'),
        _ => name,
    };
    format!("/{trimmed}")
}

/// Shallow merge of object props; a non-object overlay replaces the base.
fn merge_props(base: &Props, overlay: Option<&Props>) -> Props {
    match (base, overlay) {
        (Value::Object(base), Some(Value::Object(overlay))) => {
            let mut merged = base.clone();
            merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(merged)
        }
        (_, Some(overlay)) => overlay.clone(),
        (base, None) => base.clone(),
    }
}
