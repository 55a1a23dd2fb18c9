//! Build command - renders every page of the site

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use color_eyre::eyre::{Result, WrapErr, bail};
use pagesmith_generator::{BuildReport, Builder, PageCache, SiteLoader};
use pagesmith_render::AdapterRegistry;
use tracing::{debug, info, warn};

use super::load_config;

/// Command-line overrides for a build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Output directory override.
    pub output: Option<PathBuf>,

    /// Site base URL override.
    pub base_url: Option<String>,

    /// Concurrent render limit override.
    pub concurrency: Option<usize>,
}

/// Run the build command.
///
/// Loads the site next to `config_path`, restores the page cache when a cache
/// file is configured, and builds every page. Ctrl-C stops the build from
/// starting further pages. Fails when any page fails to render.
pub async fn run(config_path: &Path, options: &BuildOptions) -> Result<()> {
    let start = Instant::now();
    info!(?config_path, ?options, "starting build");

    let (mut config, root) = load_config(config_path)?;
    if let Some(output) = &options.output {
        config.build.output_dir = output.clone();
    }
    if let Some(base_url) = &options.base_url {
        info!(base_url, "overriding site base_url from CLI");
        config.site.base_url = base_url.clone();
    }
    if let Some(concurrency) = options.concurrency {
        config.build.concurrency = concurrency;
    }
    debug!(?config, "loaded configuration");

    let adapters = AdapterRegistry::with_defaults();
    let site = SiteLoader::new(&config, &root, &adapters)
        .load()
        .wrap_err("failed to load site")?;

    let cache = PageCache::from_config(&config.cache);
    let cache_file = config.cache.file.clone();
    if let Some(file) = cache_file.as_deref().filter(|f| f.exists()) {
        let entries = cache
            .import(file)
            .wrap_err_with(|| format!("failed to read page cache {}", file.display()))?;
        info!(entries, file = %file.display(), "restored page cache");
    }

    let output_dir = config.build.output_dir.clone();
    let builder = Builder::new(config)
        .wrap_err("invalid configuration")?
        .with_adapters(adapters)
        .with_components(site.components)
        .with_cache(cache.clone());

    let abort = builder.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing pages already rendering");
            abort.abort();
        }
    });
    let result = builder.build(&site.pages).await;
    interrupt.abort();

    if let Some(file) = &cache_file {
        let entries = cache
            .export(file)
            .wrap_err_with(|| format!("failed to write page cache {}", file.display()))?;
        info!(entries, file = %file.display(), "saved page cache");
    }

    let report = result.wrap_err("build failed")?;
    print_report(&report, &output_dir, start);

    if !report.is_success() {
        bail!("{} page(s) failed to render", report.failures.len());
    }
    Ok(())
}

fn print_report(report: &BuildReport, output: &Path, start: Instant) {
    let stats = &report.stats;
    println!();
    if report.is_success() {
        println!("  Build completed successfully!");
    } else {
        println!("  Build completed with errors");
    }
    println!();
    println!("  Pages:      {}", stats.pages);
    println!("  Rendered:   {}", stats.rendered);
    println!("  Cached:     {}", stats.cached);
    println!("  Stale:      {}", stats.stale);
    println!("  Assets:     {}", stats.assets);
    println!();
    println!("  Duration:   {:.2}s", start.elapsed().as_secs_f64());
    println!("  Output:     {}", output.display());
    println!();

    for failure in &report.failures {
        println!("  ✗ {}: {}", failure.path, failure.error);
    }
}
