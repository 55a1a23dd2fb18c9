//! Per-render state.
//!
//! A [`RenderContext`] is built for one render invocation and dropped once
//! its HTML exists. Nested components see it read-only through the
//! [`RenderScope`] that also carries the adapter and component registry.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use pagesmith_core::{CollectedAssets, PageMetadata, Params, Props, Query};

use crate::{
    Adapter, RenderAdapter, RenderError, Result,
    component::{Component, ComponentRegistry},
    markup::Markup,
};

/// Maximum component nesting depth.
pub const MAX_DEPTH: usize = 32;

/// Data available to every component rendered for one path.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Concrete route path (e.g. `/dynamic/a`).
    pub route_path: String,

    /// Dynamic route parameters.
    pub params: Params,

    /// Query parameters.
    pub query: Query,

    /// Assets collected for the page.
    pub assets: CollectedAssets,

    /// Page-level metadata.
    pub metadata: PageMetadata,
}

impl RenderContext {
    /// Create a context for a route path.
    #[must_use]
    pub fn new(route_path: impl Into<String>) -> Self {
        Self {
            route_path: route_path.into(),
            ..Self::default()
        }
    }

    /// Set the route parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set the query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    /// Set the collected assets.
    #[must_use]
    pub fn with_assets(mut self, assets: CollectedAssets) -> Self {
        self.assets = assets;
        self
    }

    /// Set the page metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: PageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Look up a route parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First value of a query parameter.
    #[must_use]
    pub fn query_first(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Handle passed to an adapter while it renders one component.
///
/// Child components render through [`RenderScope::render_child`], which uses
/// the same adapter as the parent.
#[derive(Debug)]
pub struct RenderScope<'a> {
    adapter: &'a Adapter,
    components: &'a ComponentRegistry,
    context: Arc<RenderContext>,
    depth: usize,
}

impl<'a> RenderScope<'a> {
    /// Create the scope for a top-level render.
    #[must_use]
    pub fn new(
        adapter: &'a Adapter,
        components: &'a ComponentRegistry,
        context: RenderContext,
    ) -> Self {
        Self {
            adapter,
            components,
            context: Arc::new(context),
            depth: 0,
        }
    }

    /// The render context shared by this render.
    #[must_use]
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    /// Current nesting depth; zero for the page itself.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The adapter rendering this tree.
    #[must_use]
    pub fn adapter(&self) -> &'a Adapter {
        self.adapter
    }

    /// Render a component at the root of this scope.
    pub async fn render(&self, component: &Component, props: Props) -> Result<Markup> {
        self.adapter.render(component, props, self).await
    }

    /// Render a registered component by name with the given props.
    pub fn render_child<'s>(&'s self, name: &'s str, props: Props) -> BoxFuture<'s, Result<Markup>> {
        async move {
            let component =
                self.components
                    .get(name)
                    .ok_or_else(|| RenderError::UnknownComponent {
                        name: name.to_string(),
                    })?;

            if self.depth + 1 > MAX_DEPTH {
                return Err(RenderError::DepthExceeded {
                    component: name.to_string(),
                    limit: MAX_DEPTH,
                });
            }

            let child = RenderScope {
                adapter: self.adapter,
                components: self.components,
                context: Arc::clone(&self.context),
                depth: self.depth + 1,
            };
            self.adapter.render(&component, props, &child).await
        }
        .boxed()
    }
}
