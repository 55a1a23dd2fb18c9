//! Pagesmith CLI Library
//!
//! Command implementations behind the `pagesmith` binary.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, check, invalidate)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! # async fn demo() -> color_eyre::eyre::Result<()> {
//! pagesmith::cmd::build::run(Path::new("pagesmith.toml"), &Default::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cmd;

pub use pagesmith_core::Config;
pub use pagesmith_generator::{BuildReport, BuildStats, Builder, PageCache, SiteLoader};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
