//! Pagesmith Core Library
//!
//! Configuration, error handling and the shared data model of the Pagesmith
//! build engine: dependency descriptors, page metadata and cache policies.

pub mod config;
pub mod deps;
pub mod error;
pub mod frontmatter;
pub mod page;

pub use config::{Config, RevalidateMode};
pub use deps::{Asset, AssetFilter, CollectedAssets, ComponentRef, DependencyDescriptor};
pub use error::{CoreError, Result};
pub use frontmatter::{ComponentUse, Frontmatter, PathSpec};
pub use page::{CachePolicy, PageMetadata, PageProps, Params, Props, Query, StaticPathEntry};
