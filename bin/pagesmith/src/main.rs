//! Pagesmith CLI
//!
//! Static site builder with cached, incrementally revalidated pages.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use pagesmith::cmd::build::BuildOptions;

/// Command-line interface for Pagesmith.
#[derive(Parser)]
#[command(
    name = "pagesmith",
    version,
    about = "Static site builder with cached, incrementally revalidated pages"
)]
struct Cli {
    /// Path to configuration file; the site root is its directory
    #[arg(short, long, default_value = "pagesmith.toml")]
    config: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build every page of the site
    Build {
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override site base URL (e.g., https://example.com)
        #[arg(long)]
        base_url: Option<String>,
        /// Maximum number of pages rendering at once
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Validate configuration, routes and asset references
    Check,
    /// Drop cached pages carrying any of the given tags
    Invalidate {
        /// Tags to invalidate
        #[arg(required = true)]
        tags: Vec<String>,
        /// Cache file (defaults to cache.file from the configuration)
        #[arg(long)]
        cache_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    pagesmith::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            output,
            base_url,
            jobs,
        } => {
            let options = BuildOptions {
                output,
                base_url,
                concurrency: jobs,
            };
            pagesmith::cmd::build::run(&cli.config, &options).await?;
        }
        Commands::Check => {
            pagesmith::cmd::check::run(&cli.config).await?;
        }
        Commands::Invalidate { tags, cache_file } => {
            pagesmith::cmd::invalidate::run(&cli.config, &tags, cache_file.as_deref())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_build_command_parsing() {
        let args = ["pagesmith", "build", "--output", "dist", "-j", "4"];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.config, PathBuf::from("pagesmith.toml"));
        assert_eq!(cli.verbose, 0);

        match cli.command {
            Commands::Build {
                output,
                base_url,
                jobs,
            } => {
                assert_eq!(output, Some(PathBuf::from("dist")));
                assert!(base_url.is_none());
                assert_eq!(jobs, Some(4));
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_build_with_base_url() {
        let args = ["pagesmith", "build", "--base-url", "https://example.com"];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Build { base_url, .. } => {
                assert_eq!(base_url.as_deref(), Some("https://example.com"));
            }
            _ => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_invalidate_command_parsing() {
        let args = [
            "pagesmith",
            "invalidate",
            "posts",
            "blog",
            "--cache-file",
            ".cache/pages.json",
        ];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Invalidate { tags, cache_file } => {
                assert_eq!(tags, vec!["posts", "blog"]);
                assert_eq!(cache_file, Some(PathBuf::from(".cache/pages.json")));
            }
            _ => panic!("Expected Invalidate command"),
        }
    }

    #[test]
    fn test_cli_invalidate_requires_tag() {
        let args = ["pagesmith", "invalidate"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let args = ["pagesmith", "-vvv", "check"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.verbose, 3);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_custom_config_path() {
        let args = ["pagesmith", "--config", "site/pagesmith.toml", "build"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.config, PathBuf::from("site/pagesmith.toml"));
    }
}
