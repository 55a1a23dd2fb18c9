//! Build orchestration.
//!
//! Resolves every page into concrete paths, collects each page's assets,
//! renders paths with bounded parallelism through the page cache, and writes
//! `<output>/<path>/index.html` plus copied assets and the sitemap.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use futures::{
    future::FutureExt,
    stream::{self, StreamExt},
};
use pagesmith_core::{CollectedAssets, Config};
use pagesmith_render::{AdapterRegistry, ComponentRegistry, RenderContext};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    assets::{AssetError, AssetManifest, AssetProcessor},
    cache::{CacheError, Lookup, PageCache, RenderFuture, SharedError},
    collector::{CollectorError, DependencyCollector},
    html::{HtmlError, HtmlGenerator, output_path},
    page::PageDefinition,
    route::{self, ResolvedPath, RouteError},
    sitemap::{SitemapGenerator, SitemapUrl},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Collector error.
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Route error.
    #[error("route error: {0}")]
    Route(#[from] RouteError),

    /// HTML generation error.
    #[error("HTML error: {0}")]
    Html(#[from] HtmlError),

    /// Asset error.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// Cache error outside a single path's render.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Two pages produce the same concrete path.
    #[error("path {path} produced by both {first} and {second}")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// The build was aborted before every path started.
    #[error("build aborted")]
    Aborted,
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Shared flag that stops a build from starting further paths.
#[derive(Debug, Clone, Default)]
pub struct BuildAbort(Arc<AtomicBool>);

impl BuildAbort {
    /// Create a handle that is not yet triggered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop starting new paths; paths already rendering complete.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether abort was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Number of page files written.
    pub pages: usize,

    /// Paths rendered during this build.
    pub rendered: usize,

    /// Paths served from fresh cache entries.
    pub cached: usize,

    /// Paths served stale while refreshing.
    pub stale: usize,

    /// Paths that failed to render.
    pub failed: usize,

    /// Number of assets copied.
    pub assets: usize,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// A path that failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFailure {
    /// Concrete path.
    pub path: String,

    /// Error message.
    pub error: String,
}

/// Outcome of a build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Counters.
    pub stats: BuildStats,

    /// Paths whose file was written, sorted.
    pub paths: Vec<String>,

    /// Paths that failed to render.
    pub failures: Vec<PathFailure>,
}

impl BuildReport {
    /// Whether every path rendered.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Rendered(String),
    Cached(String),
    Stale(String),
    Failed(PathFailure),
    Skipped,
}

struct Job<'a> {
    page: &'a PageDefinition,
    resolved: ResolvedPath,
    assets: &'a CollectedAssets,
}

/// Site builder that orchestrates the build process.
#[derive(Debug)]
pub struct Builder {
    config: Config,
    adapters: Arc<AdapterRegistry>,
    components: Arc<ComponentRegistry>,
    html: Arc<HtmlGenerator>,
    cache: PageCache,
    abort: BuildAbort,
}

impl Builder {
    /// Create a builder with the default adapters, no shared components and a
    /// cache configured from `config`.
    pub fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| BuildError::Config(e.to_string()))?;

        Ok(Self {
            html: Arc::new(HtmlGenerator::new(config.clone())?),
            cache: PageCache::from_config(&config.cache),
            adapters: Arc::new(AdapterRegistry::with_defaults()),
            components: Arc::new(ComponentRegistry::new()),
            abort: BuildAbort::new(),
            config,
        })
    }

    /// Use a custom adapter registry.
    #[must_use]
    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Arc::new(adapters);
        self
    }

    /// Set the components pages may include.
    #[must_use]
    pub fn with_components(mut self, components: ComponentRegistry) -> Self {
        self.components = Arc::new(components);
        self
    }

    /// Use an existing cache, e.g. one shared across builds.
    #[must_use]
    pub fn with_cache(mut self, cache: PageCache) -> Self {
        self.cache = cache;
        self
    }

    /// Use an existing abort handle.
    #[must_use]
    pub fn with_abort(mut self, abort: BuildAbort) -> Self {
        self.abort = abort;
        self
    }

    /// Handle that aborts this builder's builds.
    #[must_use]
    pub fn abort_handle(&self) -> BuildAbort {
        self.abort.clone()
    }

    /// The page cache.
    #[must_use]
    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    fn output_dir(&self) -> &Path {
        &self.config.build.output_dir
    }

    /// Build every page.
    ///
    /// Per-path render failures are reported in [`BuildReport::failures`];
    /// configuration problems abort the whole build.
    pub async fn build(&self, pages: &[PageDefinition]) -> Result<BuildReport> {
        let start = Instant::now();
        let output_dir = self.output_dir().to_path_buf();

        info!(
            pages = pages.len(),
            output = %output_dir.display(),
            "starting build"
        );

        self.clean_output()?;

        let collector = DependencyCollector::new(&self.config.build.assets_dir);
        let descriptors: Vec<_> = pages
            .iter()
            .map(|page| Arc::clone(page.component().dependencies()))
            .collect();
        let collected = collector.collect_pages(&descriptors)?;

        let mut jobs = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut manifest = AssetManifest::new();
        for (page, assets) in pages.iter().zip(&collected) {
            for resolved in route::resolve(page).await? {
                if let Some(first) = owners.insert(resolved.path.clone(), page.route().to_string()) {
                    return Err(BuildError::DuplicatePath {
                        path: resolved.path,
                        first,
                        second: page.route().to_string(),
                    });
                }
                manifest.add_page(resolved.path.clone(), assets);
                jobs.push(Job {
                    page,
                    resolved,
                    assets,
                });
            }
        }
        debug!(paths = jobs.len(), "resolved paths");

        let outcomes: Vec<Outcome> = stream::iter(jobs)
            .map(|job| self.build_path(job))
            .buffer_unordered(self.config.build.concurrency.max(1))
            .collect()
            .await;

        self.cache.drain().await;

        let mut report = BuildReport::default();
        let mut aborted = false;
        for outcome in outcomes {
            match outcome {
                Outcome::Rendered(path) => {
                    report.stats.rendered += 1;
                    report.paths.push(path);
                }
                Outcome::Cached(path) => {
                    report.stats.cached += 1;
                    report.paths.push(path);
                }
                Outcome::Stale(path) => {
                    if let Some(entry) = self.cache.get(&path) {
                        write_page(&output_path(&output_dir, &path), &entry.html).await?;
                    }
                    report.stats.stale += 1;
                    report.paths.push(path);
                }
                Outcome::Failed(failure) => {
                    warn!(path = %failure.path, error = %failure.error, "render failed");
                    report.stats.failed += 1;
                    report.failures.push(failure);
                }
                Outcome::Skipped => aborted = true,
            }
        }

        if aborted {
            warn!(written = report.paths.len(), "build aborted");
            return Err(BuildError::Aborted);
        }

        report.paths.sort();
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        report.stats.pages = report.paths.len();

        report.stats.assets = AssetProcessor::new(&output_dir).process(&manifest)?;

        if self.config.build.sitemap {
            self.write_sitemap(&report.paths)?;
        }

        report.stats.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            pages = report.stats.pages,
            rendered = report.stats.rendered,
            cached = report.stats.cached,
            stale = report.stats.stale,
            failed = report.stats.failed,
            assets = report.stats.assets,
            duration_ms = report.stats.duration_ms,
            "build complete"
        );

        Ok(report)
    }

    async fn build_path(&self, job: Job<'_>) -> Outcome {
        if self.abort.is_aborted() {
            return Outcome::Skipped;
        }

        let path = job.resolved.path.clone();
        let file = output_path(self.output_dir(), &path);
        let render = self.render_fn(job.page, job.resolved, job.assets, file.clone());

        let lookup = self.cache.get_or_render(&path, &job.page.cache, render).await;
        let written = match lookup {
            Ok(Lookup::Rendered(_)) => return Outcome::Rendered(path),
            Ok(Lookup::Hit(html)) => write_page(&file, &html).await.map(|()| Outcome::Cached(path.clone())),
            Ok(Lookup::Stale(html)) => write_page(&file, &html).await.map(|()| Outcome::Stale(path.clone())),
            Err(CacheError::Render { cause, .. }) => {
                return Outcome::Failed(PathFailure {
                    path,
                    error: cause.to_string(),
                });
            }
            Err(err) => {
                return Outcome::Failed(PathFailure {
                    path,
                    error: err.to_string(),
                });
            }
        };

        written.unwrap_or_else(|err| {
            Outcome::Failed(PathFailure {
                path,
                error: err.to_string(),
            })
        })
    }

    /// Render one path: props, component, document, file.
    fn render_fn(
        &self,
        page: &PageDefinition,
        resolved: ResolvedPath,
        assets: &CollectedAssets,
        file: PathBuf,
    ) -> impl FnOnce() -> RenderFuture {
        let page = page.clone();
        let assets = assets.clone();
        let adapters = Arc::clone(&self.adapters);
        let components = Arc::clone(&self.components);
        let html = Arc::clone(&self.html);

        move || -> RenderFuture {
            async move {
                debug!(path = %resolved.path, route = %page.route(), "rendering path");
                let props = route::props(&page, &resolved.entry).await.map_err(shared)?;

                let context = RenderContext::new(resolved.path.clone())
                    .with_params(resolved.entry.params.clone())
                    .with_query(page.query.clone())
                    .with_assets(assets.clone())
                    .with_metadata(props.metadata.clone());
                let body = adapters
                    .render(page.component(), props.props, &components, context)
                    .await
                    .map_err(shared)?;

                let document = html
                    .document(&resolved.path, &body, &props.metadata, &assets)
                    .map_err(shared)?;
                write_page(&file, &document).await.map_err(shared)?;
                Ok::<_, SharedError>(document)
            }
            .boxed()
        }
    }

    fn clean_output(&self) -> Result<()> {
        let output_dir = self.output_dir();
        if self.config.build.clean && output_dir.exists() {
            debug!(dir = %output_dir.display(), "cleaning output directory");
            fs::remove_dir_all(output_dir)?;
        }
        fs::create_dir_all(output_dir)?;
        Ok(())
    }

    fn write_sitemap(&self, paths: &[String]) -> Result<()> {
        let urls: Vec<SitemapUrl> = paths
            .iter()
            .map(|path| {
                let url = SitemapUrl::new(path.clone());
                match self.cache.get(path) {
                    Some(entry) => url.with_lastmod(entry.created_at),
                    None => url,
                }
            })
            .collect();

        let xml = SitemapGenerator::new(self.config.clone()).generate(&urls);
        fs::write(self.output_dir().join("sitemap.xml"), xml)?;
        Ok(())
    }
}

fn shared<E: std::error::Error + Send + Sync + 'static>(err: E) -> SharedError {
    Arc::new(err)
}

async fn write_page(file: &Path, html: &str) -> std::io::Result<()> {
    if let Some(parent) = file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(file, html).await
}
