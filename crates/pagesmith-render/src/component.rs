//! Renderable component definitions.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use pagesmith_core::{DependencyDescriptor, Props};

use crate::{
    Result,
    context::RenderContext,
    node::Node,
    template::{Template, TemplateError},
};

/// Render function of a component-tree definition.
pub type TreeFn =
    Arc<dyn Fn(Props, Arc<RenderContext>) -> BoxFuture<'static, Result<Node>> + Send + Sync>;

/// What a component renders from.
#[derive(Clone)]
pub enum Body {
    /// Interpolated HTML template.
    Template(Template),
    /// Markdown with template interpolation.
    Markdown(Template),
    /// Async function producing a node tree.
    Tree(TreeFn),
}

impl Body {
    /// Short name of the body kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Template(_) => "template",
            Self::Markdown(_) => "markdown",
            Self::Tree(_) => "tree",
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(&t.name()).finish(),
            Self::Markdown(t) => f.debug_tuple("Markdown").field(&t.name()).finish(),
            Self::Tree(_) => f.write_str("Tree(..)"),
        }
    }
}

/// A page or component definition.
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    source: PathBuf,
    body: Body,
    dependencies: Arc<DependencyDescriptor>,
}

impl Component {
    /// Create a component from an explicit body.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, body: Body) -> Self {
        let name = name.into();
        Self {
            dependencies: Arc::new(DependencyDescriptor::new(name.clone())),
            name,
            source: source.into(),
            body,
        }
    }

    /// Create a template component.
    pub fn template(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        content: &str,
    ) -> std::result::Result<Self, TemplateError> {
        let name = name.into();
        let template = Template::parse(name.clone(), content)?;
        Ok(Self::new(name, source, Body::Template(template)))
    }

    /// Create a markdown component.
    pub fn markdown(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        content: &str,
    ) -> std::result::Result<Self, TemplateError> {
        let name = name.into();
        let template = Template::parse(name.clone(), content)?;
        Ok(Self::new(name, source, Body::Markdown(template)))
    }

    /// Create a component-tree component from an async render function.
    pub fn tree<F>(name: impl Into<String>, source: impl Into<PathBuf>, render: F) -> Self
    where
        F: Fn(Props, Arc<RenderContext>) -> BoxFuture<'static, Result<Node>> + Send + Sync + 'static,
    {
        Self::new(name, source, Body::Tree(Arc::new(render)))
    }

    /// Attach the component's dependency descriptor.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Arc<DependencyDescriptor>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file; its extension selects the adapter.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Render body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Dependency descriptor.
    #[must_use]
    pub fn dependencies(&self) -> &Arc<DependencyDescriptor> {
        &self.dependencies
    }
}

/// Components addressable by name from templates and node trees.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<Component>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, replacing any with the same name.
    pub fn register(&mut self, component: Component) -> Arc<Component> {
        let component = Arc::new(component);
        self.components
            .insert(component.name().to_string(), Arc::clone(&component));
        component
    }

    /// Look up a component.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Component>> {
        self.components.get(name).cloned()
    }

    /// Whether a component is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterate over registered components.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Component>> {
        self.components.values()
    }
}
