//! Pagesmith Generator Library
//!
//! Build engine for Pagesmith sites.
//!
//! # Modules
//!
//! - [`collector`] - Transitive, deduplicated asset collection
//! - [`route`] - Route patterns and static path expansion
//! - [`page`] - Page definitions
//! - [`cache`] - Rendered page cache with revalidation and tag invalidation
//! - [`html`] - Document assembly
//! - [`assets`] - Asset copying and manifest
//! - [`sitemap`] - XML sitemap generation
//! - [`loader`] - Pages and components from a site directory
//! - [`build`] - Build orchestration

pub mod assets;
pub mod build;
pub mod cache;
pub mod collector;
pub mod html;
pub mod loader;
pub mod page;
pub mod route;
pub mod sitemap;

pub use assets::{AssetManifest, AssetProcessor};
pub use build::{BuildAbort, BuildError, BuildReport, BuildStats, Builder, PathFailure};
pub use cache::{CacheEntry, CacheError, Clock, Lookup, ManualClock, PageCache, SystemClock};
pub use collector::{CollectorError, DependencyCollector};
pub use html::HtmlGenerator;
pub use loader::{LoaderError, Site, SiteLoader};
pub use page::PageDefinition;
pub use route::{ResolvedPath, RouteError, RoutePattern};
pub use sitemap::SitemapGenerator;
