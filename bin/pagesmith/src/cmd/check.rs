//! Check command - validate configuration, pages and their dependencies

use std::{collections::HashMap, path::Path};

use color_eyre::eyre::{Result, bail};
use pagesmith_generator::{DependencyCollector, SiteLoader, route};
use pagesmith_render::AdapterRegistry;

use super::load_config;

/// Run the check command.
///
/// Loads the site, expands every route and collects every page's assets
/// without rendering or writing anything.
pub async fn run(config_path: &Path) -> Result<()> {
    tracing::info!(?config_path, "checking site");

    println!("Checking configuration...");
    let (config, root) = load_config(config_path)?;
    println!("  ✓ Configuration valid");

    println!("\nLoading pages and components...");
    let adapters = AdapterRegistry::with_defaults();
    let site = SiteLoader::new(&config, &root, &adapters).load()?;
    println!(
        "  ✓ {} page(s), {} component(s)",
        site.pages.len(),
        site.components.len()
    );

    let mut errors = Vec::new();
    let mut owners: HashMap<String, String> = HashMap::new();
    let collector = DependencyCollector::new(&config.build.assets_dir);

    println!("\nResolving routes and assets...");
    for page in &site.pages {
        let route = page.route().to_string();
        match route::resolve(page).await {
            Ok(paths) => {
                for resolved in paths {
                    if let Some(first) = owners.insert(resolved.path.clone(), route.clone()) {
                        errors.push(format!(
                            "{} is produced by both {first} and {route}",
                            resolved.path
                        ));
                    }
                }
            }
            Err(e) => errors.push(format!("{route}: {e}")),
        }

        if let Err(e) = collector.collect_page(page.component().dependencies()) {
            errors.push(format!("{route}: {e}"));
        }
    }

    println!();
    println!("Summary:");
    println!("  Paths:    {}", owners.len());
    println!("  Errors:   {}", errors.len());

    if !errors.is_empty() {
        println!();
        println!("Errors:");
        for err in &errors {
            println!("  ✗ {err}");
        }
        bail!("Validation failed with {} error(s)", errors.len());
    }

    println!();
    println!("✓ All checks passed");
    Ok(())
}
