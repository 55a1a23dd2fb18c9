//! Route patterns and static path expansion.
//!
//! A route such as `/blog/[slug]` or `/docs/[...path]` expands into one
//! concrete path per [`StaticPathEntry`] the page declares.

use std::{collections::HashSet, fmt};

use pagesmith_core::{PageProps, Params, StaticPathEntry};
use pagesmith_render::RenderError;
use thiserror::Error;
use tracing::debug;

use crate::page::{BoxError, PageDefinition};

/// Route errors.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Malformed route pattern.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A static path entry lacks a declared parameter.
    #[error("route {route}: static path is missing parameter `{param}`")]
    MissingParam { route: String, param: String },

    /// A parameter value is empty.
    #[error("route {route}: parameter `{param}` is empty")]
    EmptyParam { route: String, param: String },

    /// A single-segment parameter contains `/`.
    #[error("route {route}: parameter `{param}` contains '/' in `{value}`")]
    SlashInParam {
        route: String,
        param: String,
        value: String,
    },

    /// A parameter value is `.` or `..`.
    #[error("route {route}: parameter `{param}` has reserved segment `{value}`")]
    DotSegment {
        route: String,
        param: String,
        value: String,
    },

    /// A route without parameters declares static paths.
    #[error("route {route} has no parameters but declares static paths")]
    UnexpectedPaths { route: String },

    /// A dynamic route has no static-paths function.
    #[error("dynamic route {route} declares no static paths")]
    NoPaths { route: String },

    /// Two entries expand to one concrete path.
    #[error("duplicate path {path} from route {route}")]
    DuplicatePath { route: String, path: String },

    /// The static-paths function failed.
    #[error("static paths for {route} failed: {source}")]
    StaticPaths {
        route: String,
        #[source]
        source: BoxError,
    },
}

/// Result type for route operations.
pub type Result<T> = std::result::Result<T, RouteError>;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Static(String),
    /// `[name]`, one path segment.
    Param(String),
    /// `[...name]`, one or more trailing segments.
    CatchAll(String),
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse a pattern; it must start with `/`.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names = HashSet::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
                Some(inner) => {
                    let (name, catch_all) = match inner.strip_prefix("...") {
                        Some(name) => (name, true),
                        None => (inner, false),
                    };
                    if !is_param_name(name) {
                        return Err(invalid(&format!("bad parameter name `{name}`")));
                    }
                    if !names.insert(name) {
                        return Err(invalid(&format!("parameter `{name}` repeated")));
                    }
                    if catch_all && i + 1 != parts.len() {
                        return Err(invalid("catch-all parameter must be last"));
                    }
                    if catch_all {
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(name.to_string())
                    }
                }
                None if part.contains(['[', ']']) => {
                    return Err(invalid(&format!("stray bracket in `{part}`")));
                }
                None => Segment::Static((*part).to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the pattern has parameters.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Static(_)))
    }

    /// Declared parameter names in order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) | Segment::CatchAll(name) => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }

    /// Substitute parameters, producing a concrete path.
    pub fn expand(&self, params: &Params) -> Result<String> {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Static(text) => path.push_str(text),
                Segment::Param(name) => {
                    let value = self.value(params, name)?;
                    if value.contains('/') {
                        return Err(RouteError::SlashInParam {
                            route: self.raw.clone(),
                            param: name.clone(),
                            value: value.to_string(),
                        });
                    }
                    self.check_dots(name, value)?;
                    path.push_str(value);
                }
                Segment::CatchAll(name) => {
                    let value = self.value(params, name)?.trim_matches('/');
                    let parts: Vec<&str> = value.split('/').filter(|s| !s.is_empty()).collect();
                    if parts.is_empty() {
                        return Err(RouteError::EmptyParam {
                            route: self.raw.clone(),
                            param: name.clone(),
                        });
                    }
                    for part in &parts {
                        self.check_dots(name, part)?;
                    }
                    path.push_str(&parts.join("/"));
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    fn value<'p>(&self, params: &'p Params, name: &str) -> Result<&'p str> {
        let value = params.get(name).ok_or_else(|| RouteError::MissingParam {
            route: self.raw.clone(),
            param: name.to_string(),
        })?;
        if value.is_empty() {
            return Err(RouteError::EmptyParam {
                route: self.raw.clone(),
                param: name.to_string(),
            });
        }
        Ok(value)
    }

    fn check_dots(&self, name: &str, value: &str) -> Result<()> {
        if value == "." || value == ".." {
            return Err(RouteError::DotSegment {
                route: self.raw.clone(),
                param: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_param_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// A static path entry with its concrete path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Concrete path, e.g. `/dynamic/a`.
    pub path: String,

    /// The parameters that produced it.
    pub entry: StaticPathEntry,
}

/// Expand a page into its concrete paths.
///
/// Pages without parameters produce one entry with empty params. Dynamic pages
/// call their static-paths function and every entry is validated.
pub async fn resolve(page: &PageDefinition) -> Result<Vec<ResolvedPath>> {
    let route = page.route();

    if !route.is_dynamic() {
        if page.static_paths().is_some() {
            return Err(RouteError::UnexpectedPaths {
                route: route.to_string(),
            });
        }
        let entry = StaticPathEntry::default();
        return Ok(vec![ResolvedPath {
            path: route.expand(&entry.params)?,
            entry,
        }]);
    }

    let paths = page.static_paths().ok_or_else(|| RouteError::NoPaths {
        route: route.to_string(),
    })?;
    let entries = paths().await.map_err(|source| RouteError::StaticPaths {
        route: route.to_string(),
        source,
    })?;

    let mut seen = HashSet::with_capacity(entries.len());
    let mut resolved = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = route.expand(&entry.params)?;
        if !seen.insert(path.clone()) {
            return Err(RouteError::DuplicatePath {
                route: route.to_string(),
                path,
            });
        }
        resolved.push(ResolvedPath { path, entry });
    }

    debug!(route = %route, paths = resolved.len(), "resolved static paths");
    Ok(resolved)
}

/// Compute props and metadata for one entry of a page.
///
/// Calls the page's static-props function when present; otherwise uses the
/// page's default props. Page metadata is overlaid with the entry's own.
pub async fn props(
    page: &PageDefinition,
    entry: &StaticPathEntry,
) -> std::result::Result<PageProps, RenderError> {
    let computed = match page.static_props() {
        Some(props) => props(entry.params.clone()).await?,
        None => PageProps {
            props: page.props().clone(),
            ..PageProps::default()
        },
    };

    Ok(PageProps {
        props: computed.props,
        metadata: page.metadata.clone().merge(computed.metadata),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::FutureExt;
    use pagesmith_core::PageMetadata;
    use pagesmith_render::Component;
    use serde_json::json;

    use super::*;

    fn component() -> Arc<Component> {
        Arc::new(Component::template("page", "page.html", "<p>{{ slug? }}</p>").unwrap())
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_segments() {
        let pattern = RoutePattern::parse("/docs/[version]/[...path]").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Static("docs".to_string()),
                Segment::Param("version".to_string()),
                Segment::CatchAll("path".to_string()),
            ]
        );
        assert!(pattern.is_dynamic());
        assert_eq!(pattern.params().collect::<Vec<_>>(), vec!["version", "path"]);
        assert!(!RoutePattern::parse("/").unwrap().is_dynamic());
    }

    #[test]
    fn test_parse_rejects_bad_patterns() {
        for bad in [
            "blog/[slug]",
            "/[...path]/edit",
            "/[]",
            "/[a b]",
            "/x[slug]",
            "/[id]/[id]",
        ] {
            assert!(
                matches!(RoutePattern::parse(bad), Err(RouteError::InvalidPattern { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_expand() {
        let blog = RoutePattern::parse("/blog/[slug]").unwrap();
        assert_eq!(blog.expand(&params(&[("slug", "hello")])).unwrap(), "/blog/hello");

        let docs = RoutePattern::parse("/docs/[...path]").unwrap();
        assert_eq!(
            docs.expand(&params(&[("path", "/guide/install/")])).unwrap(),
            "/docs/guide/install"
        );

        assert_eq!(RoutePattern::parse("/").unwrap().expand(&Params::new()).unwrap(), "/");
    }

    #[test]
    fn test_expand_validation() {
        let blog = RoutePattern::parse("/blog/[slug]").unwrap();
        assert!(matches!(
            blog.expand(&Params::new()),
            Err(RouteError::MissingParam { param, .. }) if param == "slug"
        ));
        assert!(matches!(
            blog.expand(&params(&[("slug", "")])),
            Err(RouteError::EmptyParam { .. })
        ));
        assert!(matches!(
            blog.expand(&params(&[("slug", "a/b")])),
            Err(RouteError::SlashInParam { .. })
        ));
        assert!(matches!(
            blog.expand(&params(&[("slug", "..")])),
            Err(RouteError::DotSegment { .. })
        ));

        let docs = RoutePattern::parse("/docs/[...path]").unwrap();
        assert!(matches!(
            docs.expand(&params(&[("path", "a/../../etc")])),
            Err(RouteError::DotSegment { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_static_page() {
        let page = PageDefinition::new("/about", component()).unwrap();
        let resolved = resolve(&page).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].path, "/about");
        assert!(resolved[0].entry.params.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_dynamic_page() {
        let page = PageDefinition::new("/dynamic/[slug]", component())
            .unwrap()
            .with_paths(vec![
                StaticPathEntry::new([("slug", "a")]),
                StaticPathEntry::new([("slug", "b")]),
            ]);

        let paths: Vec<_> = resolve(&page).await.unwrap().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/dynamic/a", "/dynamic/b"]);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let missing = PageDefinition::new("/blog/[slug]", component())
            .unwrap()
            .with_paths(vec![StaticPathEntry::new([("id", "1")])]);
        assert!(matches!(
            resolve(&missing).await,
            Err(RouteError::MissingParam { .. })
        ));

        let duplicate = PageDefinition::new("/blog/[slug]", component())
            .unwrap()
            .with_paths(vec![
                StaticPathEntry::new([("slug", "a")]),
                StaticPathEntry::new([("slug", "a")]),
            ]);
        assert!(matches!(
            resolve(&duplicate).await,
            Err(RouteError::DuplicatePath { path, .. }) if path == "/blog/a"
        ));

        let unexpected = PageDefinition::new("/about", component())
            .unwrap()
            .with_paths(vec![StaticPathEntry::new([("slug", "a")])]);
        assert!(matches!(
            resolve(&unexpected).await,
            Err(RouteError::UnexpectedPaths { .. })
        ));

        let none = PageDefinition::new("/blog/[slug]", component()).unwrap();
        assert!(matches!(resolve(&none).await, Err(RouteError::NoPaths { .. })));

        let failing = PageDefinition::new("/blog/[slug]", component())
            .unwrap()
            .with_static_paths(|| async { Err("backend down".into()) }.boxed());
        let err = resolve(&failing).await.unwrap_err();
        assert!(err.to_string().contains("backend down"));
    }

    #[tokio::test]
    async fn test_props_called_once_per_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let page = PageDefinition::new("/blog/[slug]", component())
            .unwrap()
            .with_metadata(PageMetadata {
                title: Some("Blog".to_string()),
                description: Some("All posts".to_string()),
                ..PageMetadata::default()
            })
            .with_static_props(move |params| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    let slug = params.get("slug").cloned().unwrap_or_default();
                    Ok(PageProps {
                        props: json!({ "slug": slug }),
                        metadata: PageMetadata {
                            title: Some(format!("Post {slug}")),
                            ..PageMetadata::default()
                        },
                    })
                }
                .boxed()
            });

        let a = props(&page, &StaticPathEntry::new([("slug", "a")])).await.unwrap();
        let b = props(&page, &StaticPathEntry::new([("slug", "b")])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(a.props, json!({ "slug": "a" }));
        assert_eq!(b.metadata.title.as_deref(), Some("Post b"));
        assert_eq!(b.metadata.description.as_deref(), Some("All posts"));
    }

    #[tokio::test]
    async fn test_props_default_to_page_props() {
        let page = PageDefinition::new("/", component())
            .unwrap()
            .with_props(json!({ "greeting": "hi" }));
        let computed = props(&page, &StaticPathEntry::default()).await.unwrap();
        assert_eq!(computed.props, json!({ "greeting": "hi" }));
    }
}
