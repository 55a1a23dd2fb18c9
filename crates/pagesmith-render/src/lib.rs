//! Pagesmith Render Library
//!
//! Render adapters turn a component definition plus props into an HTML
//! fragment. Each templating technology is one variant of the closed
//! [`Adapter`] set; the [`AdapterRegistry`] picks the first registered adapter
//! claiming a source file's extension.

pub mod component;
pub mod context;
pub mod markdown;
pub mod markup;
pub mod node;
pub mod template;

use std::path::Path;

pub use component::{Body, Component, ComponentRegistry, TreeFn};
pub use context::{MAX_DEPTH, RenderContext, RenderScope};
use futures::future::{BoxFuture, FutureExt};
pub use markdown::MarkdownAdapter;
pub use markup::{Markup, escape};
pub use node::{Hydrate, Node, render_node};
use pagesmith_core::Props;
pub use template::{Piece, Template, TemplateError};
use thiserror::Error;
use tracing::debug;

/// Render errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template interpolation failed.
    #[error("template error in {component}: {source}")]
    Template {
        component: String,
        source: TemplateError,
    },

    /// A nested component is not registered.
    #[error("unknown component `{name}`")]
    UnknownComponent { name: String },

    /// The adapter cannot render this kind of body.
    #[error("{adapter} adapter cannot render {kind} body of {component}")]
    UnsupportedBody {
        adapter: String,
        component: String,
        kind: &'static str,
    },

    /// No registered adapter claims the source file.
    #[error("no adapter registered for {path}")]
    NoAdapter { path: String },

    /// Components nest deeper than the limit.
    #[error("component nesting exceeds {limit} levels at {component}")]
    DepthExceeded { component: String, limit: usize },

    /// An element or attribute name that cannot be written as HTML.
    #[error("invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },

    /// Failure reported by a render function.
    #[error("{0}")]
    Custom(String),
}

impl RenderError {
    /// Create an error from a render function's own message.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Capability set shared by every templating technology.
pub trait RenderAdapter: Send + Sync {
    /// Adapter name, for diagnostics.
    fn name(&self) -> &str;

    /// Whether this adapter handles the given source file.
    fn supports_extension(&self, path: &Path) -> bool;

    /// Render a component with props.
    fn render<'a>(
        &'a self,
        component: &'a Component,
        props: Props,
        scope: &'a RenderScope<'_>,
    ) -> BoxFuture<'a, Result<Markup>>;
}

pub(crate) fn extension_matches(extensions: &[String], path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Tagged-template-string adapter.
#[derive(Debug, Clone)]
pub struct TemplateAdapter {
    extensions: Vec<String>,
}

impl Default for TemplateAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateAdapter {
    /// Create a template adapter for `.html` and `.tpl` files.
    pub fn new() -> Self {
        Self::with_extensions(["html", "tpl"])
    }

    /// Create a template adapter claiming custom extensions.
    pub fn with_extensions<S: Into<String>>(extensions: impl IntoIterator<Item = S>) -> Self {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl RenderAdapter for TemplateAdapter {
    fn name(&self) -> &str {
        "template"
    }

    fn supports_extension(&self, path: &Path) -> bool {
        extension_matches(&self.extensions, path)
    }

    fn render<'a>(
        &'a self,
        component: &'a Component,
        props: Props,
        scope: &'a RenderScope<'_>,
    ) -> BoxFuture<'a, Result<Markup>> {
        async move {
            match component.body() {
                Body::Template(template) => template.render(&props, scope).await,
                other => Err(RenderError::UnsupportedBody {
                    adapter: self.name().to_string(),
                    component: component.name().to_string(),
                    kind: other.kind(),
                }),
            }
        }
        .boxed()
    }
}

/// Component-tree adapter for async render functions.
#[derive(Debug, Clone)]
pub struct ComponentAdapter {
    extensions: Vec<String>,
}

impl Default for ComponentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentAdapter {
    /// Create a component adapter for `.tsx`, `.jsx` and `.rs` definitions.
    pub fn new() -> Self {
        Self::with_extensions(["tsx", "jsx", "rs"])
    }

    /// Create a component adapter claiming custom extensions.
    pub fn with_extensions<S: Into<String>>(extensions: impl IntoIterator<Item = S>) -> Self {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

impl RenderAdapter for ComponentAdapter {
    fn name(&self) -> &str {
        "component"
    }

    fn supports_extension(&self, path: &Path) -> bool {
        extension_matches(&self.extensions, path)
    }

    fn render<'a>(
        &'a self,
        component: &'a Component,
        props: Props,
        scope: &'a RenderScope<'_>,
    ) -> BoxFuture<'a, Result<Markup>> {
        async move {
            let Body::Tree(render) = component.body() else {
                return Err(RenderError::UnsupportedBody {
                    adapter: self.name().to_string(),
                    component: component.name().to_string(),
                    kind: component.body().kind(),
                });
            };

            let tree = render(props, scope.context().clone()).await?;
            render_node(&tree, scope).await
        }
        .boxed()
    }
}

/// The closed set of render adapters.
#[derive(Debug, Clone)]
pub enum Adapter {
    /// Tagged-template strings.
    Template(TemplateAdapter),
    /// Markdown with interpolation.
    Markdown(MarkdownAdapter),
    /// Async function components with hydration islands.
    Component(ComponentAdapter),
}

impl RenderAdapter for Adapter {
    fn name(&self) -> &str {
        match self {
            Self::Template(a) => a.name(),
            Self::Markdown(a) => a.name(),
            Self::Component(a) => a.name(),
        }
    }

    fn supports_extension(&self, path: &Path) -> bool {
        match self {
            Self::Template(a) => a.supports_extension(path),
            Self::Markdown(a) => a.supports_extension(path),
            Self::Component(a) => a.supports_extension(path),
        }
    }

    fn render<'a>(
        &'a self,
        component: &'a Component,
        props: Props,
        scope: &'a RenderScope<'_>,
    ) -> BoxFuture<'a, Result<Markup>> {
        match self {
            Self::Template(a) => a.render(component, props, scope),
            Self::Markdown(a) => a.render(component, props, scope),
            Self::Component(a) => a.render(component, props, scope),
        }
    }
}

impl From<TemplateAdapter> for Adapter {
    fn from(adapter: TemplateAdapter) -> Self {
        Self::Template(adapter)
    }
}

impl From<MarkdownAdapter> for Adapter {
    fn from(adapter: MarkdownAdapter) -> Self {
        Self::Markdown(adapter)
    }
}

impl From<ComponentAdapter> for Adapter {
    fn from(adapter: ComponentAdapter) -> Self {
        Self::Component(adapter)
    }
}

/// Ordered adapter registry; earlier registrations win extension matches.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Adapter>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the component, template and markdown adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(ComponentAdapter::new())
            .register(TemplateAdapter::new())
            .register(MarkdownAdapter::new());
        registry
    }

    /// Append an adapter at the lowest priority.
    pub fn register(&mut self, adapter: impl Into<Adapter>) -> &mut Self {
        self.adapters.push(adapter.into());
        self
    }

    /// First registered adapter claiming the file's extension.
    pub fn select(&self, path: &Path) -> Option<&Adapter> {
        self.adapters.iter().find(|a| a.supports_extension(path))
    }

    /// Registered adapters in priority order.
    pub fn adapters(&self) -> &[Adapter] {
        &self.adapters
    }

    /// Render a component at the root of a fresh scope with the adapter selected for it.
    pub async fn render(
        &self,
        component: &Component,
        props: Props,
        components: &ComponentRegistry,
        context: RenderContext,
    ) -> Result<Markup> {
        let adapter = self
            .select(component.source())
            .ok_or_else(|| RenderError::NoAdapter {
                path: component.source().display().to_string(),
            })?;
        debug!(component = component.name(), adapter = adapter.name(), "rendering component");
        RenderScope::new(adapter, components, context)
            .render(component, props)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use serde_json::json;

    use super::*;

    fn registry_with(components: Vec<Component>) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for component in components {
            registry.register(component);
        }
        registry
    }

    #[test]
    fn test_select_by_registration_order() {
        let mut registry = AdapterRegistry::new();
        registry
            .register(ComponentAdapter::with_extensions(["tsx"]))
            .register(TemplateAdapter::with_extensions(["tsx", "html"]));

        assert_eq!(registry.select(Path::new("a.tsx")).unwrap().name(), "component");
        assert_eq!(registry.select(Path::new("a.html")).unwrap().name(), "template");
        assert!(registry.select(Path::new("a.md")).is_none());

        let mut reversed = AdapterRegistry::new();
        reversed
            .register(TemplateAdapter::with_extensions(["tsx", "html"]))
            .register(ComponentAdapter::with_extensions(["tsx"]));
        assert_eq!(reversed.select(Path::new("a.tsx")).unwrap().name(), "template");
    }

    #[test]
    fn test_default_registry_order() {
        let registry = AdapterRegistry::with_defaults();
        let names: Vec<_> = registry.adapters().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["component", "template", "markdown"]);
    }

    #[tokio::test]
    async fn test_template_renders_nested_components() {
        let components = registry_with(vec![
            Component::template("card", "card.html", "<div class=\"card\">{{ title }}</div>").unwrap(),
        ]);
        let page = Component::template(
            "page",
            "page.html",
            "<h1>{{ heading }}</h1>{{> card with post }}",
        )
        .unwrap();

        let html = AdapterRegistry::with_defaults()
            .render(
                &page,
                json!({ "heading": "Tom & Jerry", "post": { "title": "<b>bold</b>" } }),
                &components,
                RenderContext::new("/"),
            )
            .await
            .unwrap();

        assert_eq!(
            html.as_str(),
            "<h1>Tom &amp; Jerry</h1><div class=\"card\">&lt;b&gt;bold&lt;/b&gt;</div>"
        );
    }

    #[tokio::test]
    async fn test_unknown_child_component() {
        let page = Component::template("page", "page.html", "{{> missing }}").unwrap();
        let err = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &ComponentRegistry::new(), RenderContext::new("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownComponent { name } if name == "missing"));
    }

    #[tokio::test]
    async fn test_self_include_hits_depth_limit() {
        let components = registry_with(vec![
            Component::template("loop", "loop.html", "x{{> loop }}").unwrap(),
        ]);
        let page = components.get("loop").unwrap();
        let err = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &components, RenderContext::new("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::DepthExceeded { limit: MAX_DEPTH, .. }));
    }

    #[tokio::test]
    async fn test_markdown_escapes_props() {
        let page = Component::markdown("post", "post.md", "# {{ title }}\n\n{{ body }}").unwrap();
        let html = AdapterRegistry::with_defaults()
            .render(
                &page,
                json!({ "title": "Hello", "body": "<img src=x onerror=alert(1)>" }),
                &ComponentRegistry::new(),
                RenderContext::new("/post"),
            )
            .await
            .unwrap();

        assert!(html.as_str().contains("<h1>Hello</h1>"));
        assert!(!html.as_str().contains("<img"));
        assert!(html.as_str().contains("&lt;img"));
    }

    #[tokio::test]
    async fn test_unclaimed_extension() {
        let page = Component::template("page", "page.vue", "x").unwrap();
        let err = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &ComponentRegistry::new(), RenderContext::new("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::NoAdapter { path } if path == "page.vue"));
    }

    #[tokio::test]
    async fn test_adapter_rejects_foreign_body() {
        let page = Component::markdown("post", "post.html", "text").unwrap();
        let err = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &ComponentRegistry::new(), RenderContext::new("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedBody { kind: "markdown", .. }));
    }

    #[tokio::test]
    async fn test_component_tree_with_island_and_context() {
        let counter = Component::tree("counter", "counter.tsx", |props, _ctx| {
            async move {
                let start = props["start"].as_i64().unwrap_or_default();
                Ok(Node::element("button").child(Node::text(format!("count: {start}"))))
            }
            .boxed()
        });
        let page = Component::tree("home", "home.tsx", |_props, ctx| {
            async move {
                Ok(Node::element("main")
                    .attr("data-path", ctx.route_path.clone())
                    .child(Node::text("<hi>"))
                    .child(Node::island("counter", json!({ "start": 2 }), Hydrate::Visible)))
            }
            .boxed()
        });
        let components = registry_with(vec![counter]);

        let html = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &components, RenderContext::new("/home"))
            .await
            .unwrap();

        assert_eq!(
            html.as_str(),
            "<main data-path=\"/home\">&lt;hi&gt;\
             <pagesmith-island component=\"counter\" client=\"visible\" props=\"{&quot;start&quot;:2}\">\
             <button>count: 2</button></pagesmith-island></main>"
        );
    }

    #[tokio::test]
    async fn test_tree_rejects_unsafe_names() {
        let cases = [
            (Node::element("img src=x onerror=alert(1)"), "tag"),
            (Node::element("div").attr("onclick=\"x\" id", "y"), "attribute"),
            (Node::element("p").attr("", "y"), "attribute"),
            (Node::element("1h"), "tag"),
        ];
        for (node, expected) in cases {
            let page = Component::tree("bad", "bad.rs", move |_props, _ctx| {
                let node = node.clone();
                async move { Ok(node) }.boxed()
            });
            let err = AdapterRegistry::with_defaults()
                .render(&page, json!({}), &ComponentRegistry::new(), RenderContext::new("/"))
                .await
                .unwrap_err();
            assert!(
                matches!(&err, RenderError::InvalidName { kind, .. } if *kind == expected),
                "{err}"
            );
        }
    }

    #[tokio::test]
    async fn test_tree_accepts_hyphenated_names() {
        let page = Component::tree("ok", "ok.rs", |_props, _ctx| {
            async { Ok(Node::element("my-widget").attr("data-id", "7").attr("aria-label", "w")) }.boxed()
        });
        let html = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &ComponentRegistry::new(), RenderContext::new("/"))
            .await
            .unwrap();
        assert_eq!(html.as_str(), "<my-widget data-id=\"7\" aria-label=\"w\"></my-widget>");
    }

    #[tokio::test]
    async fn test_tree_render_may_await_and_fail() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let page = Component::tree("slow", "slow.rs", move |_props, _ctx| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::task::yield_now().await;
                seen.fetch_add(1, Ordering::SeqCst);
                Err(RenderError::custom("upstream unavailable"))
            }
            .boxed()
        });

        let err = AdapterRegistry::with_defaults()
            .render(&page, json!({}), &ComponentRegistry::new(), RenderContext::new("/"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "upstream unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
