//! Invalidate command - drops cached pages by tag

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr, eyre};
use pagesmith_generator::PageCache;
use tracing::info;

use super::load_config;

/// Run the invalidate command.
///
/// Removes every entry carrying one of `tags` from the saved page cache, so
/// the next build renders those pages again. The cache file comes from
/// `cache_file` or, when absent, from the configuration.
pub fn run(config_path: &Path, tags: &[String], cache_file: Option<&Path>) -> Result<usize> {
    let file: PathBuf = match cache_file {
        Some(file) => file.to_path_buf(),
        None => load_config(config_path)?
            .0
            .cache
            .file
            .ok_or_else(|| eyre!("no cache file configured; set cache.file or pass --cache-file"))?,
    };

    let cache = PageCache::new();
    let loaded = cache
        .import(&file)
        .wrap_err_with(|| format!("failed to read page cache {}", file.display()))?;

    let removed: usize = tags.iter().map(|tag| cache.invalidate_by_tag(tag)).sum();
    cache
        .export(&file)
        .wrap_err_with(|| format!("failed to write page cache {}", file.display()))?;

    info!(?tags, loaded, removed, file = %file.display(), "invalidated cached pages");
    println!("  Removed {removed} of {loaded} cached page(s)");
    Ok(removed)
}
