//! Page definitions: a route pattern bound to a renderable component.

use std::{fmt, sync::Arc};

use futures::future::{BoxFuture, FutureExt};
use pagesmith_core::{CachePolicy, PageMetadata, PageProps, Params, Props, Query, StaticPathEntry};
use pagesmith_render::{Component, RenderError};

use crate::route::{RouteError, RoutePattern};

/// Boxed error returned by user-supplied path functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the concrete parameter sets of a dynamic page.
pub type StaticPathsFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<StaticPathEntry>, BoxError>> + Send + Sync>;

/// Produces props and metadata for one concrete path.
pub type StaticPropsFn =
    Arc<dyn Fn(Params) -> BoxFuture<'static, Result<PageProps, RenderError>> + Send + Sync>;

/// A page: route pattern, component and build-time data hooks.
#[derive(Clone)]
pub struct PageDefinition {
    route: RoutePattern,
    component: Arc<Component>,
    static_paths: Option<StaticPathsFn>,
    static_props: Option<StaticPropsFn>,
    props: Props,

    /// Caching policy for rendered output.
    pub cache: CachePolicy,

    /// Page-level metadata; per-path props may override fields.
    pub metadata: PageMetadata,

    /// Query parameters exposed to the render context.
    pub query: Query,
}

impl PageDefinition {
    /// Bind a component to a route pattern such as `/blog/[slug]`.
    pub fn new(route: &str, component: Arc<Component>) -> Result<Self, RouteError> {
        Ok(Self {
            route: RoutePattern::parse(route)?,
            component,
            static_paths: None,
            static_props: None,
            props: Props::Object(serde_json::Map::new()),
            cache: CachePolicy::default(),
            metadata: PageMetadata::default(),
            query: Query::new(),
        })
    }

    /// Set the async function listing the page's parameter sets.
    #[must_use]
    pub fn with_static_paths<F>(mut self, paths: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Vec<StaticPathEntry>, BoxError>> + Send + Sync + 'static,
    {
        self.static_paths = Some(Arc::new(paths));
        self
    }

    /// Use a fixed list of parameter sets.
    #[must_use]
    pub fn with_paths(self, entries: Vec<StaticPathEntry>) -> Self {
        self.with_static_paths(move || {
            let entries = entries.clone();
            async move { Ok(entries) }.boxed()
        })
    }

    /// Set the async function computing props for each path.
    #[must_use]
    pub fn with_static_props<F>(mut self, props: F) -> Self
    where
        F: Fn(Params) -> BoxFuture<'static, Result<PageProps, RenderError>> + Send + Sync + 'static,
    {
        self.static_props = Some(Arc::new(props));
        self
    }

    /// Set props used when no static-props function is present.
    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Set the cache policy.
    #[must_use]
    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Set the page metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: PageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    /// The parsed route pattern.
    #[must_use]
    pub fn route(&self) -> &RoutePattern {
        &self.route
    }

    /// The page component.
    #[must_use]
    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    /// Default props.
    #[must_use]
    pub fn props(&self) -> &Props {
        &self.props
    }

    pub(crate) fn static_paths(&self) -> Option<&StaticPathsFn> {
        self.static_paths.as_ref()
    }

    pub(crate) fn static_props(&self) -> Option<&StaticPropsFn> {
        self.static_props.as_ref()
    }
}

impl fmt::Debug for PageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDefinition")
            .field("route", &self.route.as_str())
            .field("component", &self.component.name())
            .field("static_paths", &self.static_paths.is_some())
            .field("static_props", &self.static_props.is_some())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
