//! Command implementations.

pub mod build;
pub mod check;
pub mod invalidate;

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use pagesmith_core::Config;

/// Load the configuration and resolve its directories against the site root.
///
/// The site root is the directory holding the configuration file. Returns the
/// rebased configuration and the root.
pub(crate) fn load_config(path: &Path) -> Result<(Config, PathBuf)> {
    let config = Config::load_with_env(path)
        .wrap_err_with(|| format!("failed to load configuration from {}", path.display()))?;
    let root = site_root(path);
    Ok((rebase(config, &root), root))
}

fn site_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Make relative configured paths relative to `root`.
fn rebase(mut config: Config, root: &Path) -> Config {
    let build = &mut config.build;
    for dir in [
        &mut build.output_dir,
        &mut build.pages_dir,
        &mut build.components_dir,
        &mut build.assets_dir,
    ] {
        if dir.is_relative() {
            *dir = root.join(&*dir);
        }
    }
    if let Some(file) = config.cache.file.as_mut().filter(|f| f.is_relative()) {
        *file = root.join(&*file);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_root() {
        assert_eq!(site_root(Path::new("pagesmith.toml")), PathBuf::from("."));
        assert_eq!(
            site_root(Path::new("site/pagesmith.toml")),
            PathBuf::from("site")
        );
    }

    #[test]
    fn test_rebase_keeps_absolute_paths() {
        let mut config = Config::new("Site", "https://example.com");
        config.build.output_dir = PathBuf::from("/srv/www");
        config.cache.file = Some(PathBuf::from(".cache/pages.json"));

        let config = rebase(config, Path::new("site"));
        assert_eq!(config.build.output_dir, PathBuf::from("/srv/www"));
        assert_eq!(config.build.pages_dir, PathBuf::from("site/pages"));
        assert_eq!(
            config.cache.file,
            Some(PathBuf::from("site/.cache/pages.json"))
        );
    }
}
