//! Component trees produced by function components.

use futures::future::{BoxFuture, FutureExt};
use pagesmith_core::Props;
use serde::{Deserialize, Serialize};

use crate::{
    RenderError, Result,
    context::RenderScope,
    markup::{Markup, escape},
};

/// Elements written without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Tag wrapping hydration islands.
pub const ISLAND_TAG: &str = "pagesmith-island";

/// When an island's client script attaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hydrate {
    /// As soon as the page loads.
    Load,
    /// When the browser is idle.
    #[default]
    Idle,
    /// When the island scrolls into view.
    Visible,
}

impl Hydrate {
    fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Idle => "idle",
            Self::Visible => "visible",
        }
    }
}

/// A node in a component tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// HTML element.
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
    /// Text, escaped on output.
    Text(String),
    /// Trusted HTML, emitted as-is.
    Raw(Markup),
    /// Nested component rendered through the current adapter.
    Component { name: String, props: Props },
    /// Nested component wrapped in a hydration marker.
    Island {
        name: String,
        props: Props,
        hydrate: Hydrate,
    },
    /// Sequence of siblings.
    Fragment(Vec<Node>),
}

impl Node {
    /// Element with no attributes or children.
    #[must_use]
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Text node.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Component node.
    #[must_use]
    pub fn component(name: impl Into<String>, props: Props) -> Self {
        Self::Component {
            name: name.into(),
            props,
        }
    }

    /// Island node.
    #[must_use]
    pub fn island(name: impl Into<String>, props: Props, hydrate: Hydrate) -> Self {
        Self::Island {
            name: name.into(),
            props,
            hydrate,
        }
    }

    /// Add an attribute; no-op on non-elements.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attrs, .. } = &mut self {
            attrs.push((name.into(), value.into()));
        }
        self
    }

    /// Add a child; no-op on non-elements.
    #[must_use]
    pub fn child(mut self, child: Node) -> Self {
        match &mut self {
            Self::Element { children, .. } | Self::Fragment(children) => children.push(child),
            _ => {}
        }
        self
    }

    /// Add several children.
    #[must_use]
    pub fn children(self, children: impl IntoIterator<Item = Node>) -> Self {
        children.into_iter().fold(self, Node::child)
    }
}

/// Serialize a node tree, rendering nested components through `scope`.
pub fn render_node<'a>(node: &'a Node, scope: &'a RenderScope<'_>) -> BoxFuture<'a, Result<Markup>> {
    async move {
        let mut out = Markup::new();
        match node {
            Node::Text(text) => out.push_text(text),
            Node::Raw(markup) => out.push(markup),
            Node::Fragment(children) => {
                for child in children {
                    out.push(&render_node(child, scope).await?);
                }
            }
            Node::Element {
                tag,
                attrs,
                children,
            } => {
                check_name("tag", tag)?;
                out.push_raw("<");
                out.push_raw(tag);
                for (name, value) in attrs {
                    check_name("attribute", name)?;
                    out.push_raw(" ");
                    out.push_raw(name);
                    out.push_raw("=\"");
                    out.push_raw(&escape(value));
                    out.push_raw("\"");
                }
                out.push_raw(">");
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return Ok(out);
                }
                for child in children {
                    out.push(&render_node(child, scope).await?);
                }
                out.push_raw("</");
                out.push_raw(tag);
                out.push_raw(">");
            }
            Node::Component { name, props } => {
                out.push(&scope.render_child(name, props.clone()).await?);
            }
            Node::Island {
                name,
                props,
                hydrate,
            } => {
                let inner = scope.render_child(name, props.clone()).await?;
                out.push_raw(&format!(
                    r#"<{ISLAND_TAG} component="{}" client="{}" props="{}">"#,
                    escape(name),
                    hydrate.as_str(),
                    escape(&props.to_string()),
                ));
                out.push(&inner);
                out.push_raw(&format!("</{ISLAND_TAG}>"));
            }
        }
        Ok(out)
    }
    .boxed()
}

/// Names are emitted unescaped, so they must match `[A-Za-z][A-Za-z0-9-]*`.
fn check_name(kind: &'static str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RenderError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}
