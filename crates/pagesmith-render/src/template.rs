//! Tagged-template strings with escaped interpolation.
//!
//! Tags are written as `{{ ... }}`:
//!
//! - `{{ post.title }}` interpolates a prop, HTML-escaped; a missing prop is an error
//! - `{{ subtitle? }}` is optional and renders nothing when missing
//! - `{{ body | raw }}` inserts the prop without escaping
//! - `{{> card }}` renders the `card` component with the current props
//! - `{{> card with post }}` renders it with the prop at `post`

use std::borrow::Cow;

use pagesmith_core::Props;
use serde_json::Value;
use thiserror::Error;

use crate::{RenderError, context::RenderScope, markup::Markup};

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Missing required variable.
    #[error("missing required variable: {0}")]
    MissingVariable(String),

    /// Invalid template syntax.
    #[error("invalid template syntax: {0}")]
    InvalidSyntax(String),

    /// Component include in a template rendered without a scope.
    #[error("component include `{0}` is not allowed here")]
    IncludeNotAllowed(String),
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var {
        path: String,
        optional: bool,
        raw: bool,
    },
    Include {
        component: String,
        with: Option<String>,
    },
}

/// One part of a rendered template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Template source text.
    Literal(String),
    /// Prop text, not yet escaped.
    Text(String),
    /// Trusted HTML: a `raw` prop or an included component.
    Html(Markup),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template, rejecting malformed tags up front.
    pub fn parse(name: impl Into<String>, content: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = content;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| TemplateError::InvalidSyntax("unclosed {{ delimiter".to_string()))?;

            segments.push(parse_tag(after[..end].trim())?);
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            name: name.into(),
            segments,
        })
    }

    /// Get the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of components included by this template.
    pub fn includes(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Include { component, .. } => Some(component.as_str()),
            _ => None,
        })
    }

    /// Render a template that includes no components.
    pub fn render_static(&self, props: &Props) -> Result<Markup> {
        let mut out = Markup::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_raw(text),
                Segment::Var {
                    path,
                    optional,
                    raw,
                } => write_var(&mut out, props, path, *optional, *raw)?,
                Segment::Include { component, .. } => {
                    return Err(TemplateError::IncludeNotAllowed(component.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Render the template, rendering included components through `scope`.
    pub async fn render(&self, props: &Props, scope: &RenderScope<'_>) -> crate::Result<Markup> {
        let mut out = Markup::new();
        for piece in self.render_pieces(props, scope).await? {
            match piece {
                Piece::Literal(text) => out.push_raw(&text),
                Piece::Text(text) => out.push_text(&text),
                Piece::Html(html) => out.push(&html),
            }
        }
        Ok(out)
    }

    /// Render the template without joining the result.
    ///
    /// Prop values stay separate from template text, so callers that run
    /// the template text through another parser can insert them afterwards.
    pub async fn render_pieces(
        &self,
        props: &Props,
        scope: &RenderScope<'_>,
    ) -> crate::Result<Vec<Piece>> {
        let mut pieces = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pieces.push(Piece::Literal(text.clone())),
                Segment::Var {
                    path,
                    optional,
                    raw,
                } => {
                    match lookup(props, path).and_then(value_text) {
                        Some(text) if *raw => pieces.push(Piece::Html(Markup::raw(text))),
                        Some(text) => pieces.push(Piece::Text(text.into_owned())),
                        None if *optional => {}
                        None => {
                            return Err(self.error(TemplateError::MissingVariable(path.clone())));
                        }
                    }
                }
                Segment::Include { component, with } => {
                    let child_props = match with {
                        Some(key) => lookup(props, key)
                            .cloned()
                            .ok_or_else(|| self.error(TemplateError::MissingVariable(key.clone())))?,
                        None => props.clone(),
                    };
                    pieces.push(Piece::Html(scope.render_child(component, child_props).await?));
                }
            }
        }
        Ok(pieces)
    }

    fn error(&self, source: TemplateError) -> RenderError {
        RenderError::Template {
            component: self.name.clone(),
            source,
        }
    }
}

fn parse_tag(tag: &str) -> Result<Segment> {
    if let Some(include) = tag.strip_prefix('>') {
        let include = include.trim();
        let (component, with) = match include.split_once(" with ") {
            Some((component, key)) => (component.trim(), Some(key.trim().to_string())),
            None => (include, None),
        };
        if component.is_empty() || with.as_deref() == Some("") {
            return Err(TemplateError::InvalidSyntax(format!("empty include `{{{{{tag}}}}}`")));
        }
        return Ok(Segment::Include {
            component: component.to_string(),
            with,
        });
    }

    let mut parts = tag.split('|').map(str::trim);
    let name = parts.next().unwrap_or_default();
    let mut raw = false;
    for filter in parts {
        match filter {
            "raw" => raw = true,
            other => {
                return Err(TemplateError::InvalidSyntax(format!("unknown filter `{other}`")));
            }
        }
    }

    let (path, optional) = match name.strip_suffix('?') {
        Some(stripped) => (stripped.trim(), true),
        None => (name, false),
    };
    if path.is_empty() {
        return Err(TemplateError::InvalidSyntax("empty {{ }} tag".to_string()));
    }

    Ok(Segment::Var {
        path: path.to_string(),
        optional,
        raw,
    })
}

fn write_var(out: &mut Markup, props: &Props, path: &str, optional: bool, raw: bool) -> Result<()> {
    match lookup(props, path).and_then(value_text) {
        Some(text) if raw => out.push_raw(&text),
        Some(text) => out.push_text(&text),
        None if optional => {}
        None => return Err(TemplateError::MissingVariable(path.to_string())),
    }
    Ok(())
}

/// Look up a dotted path (`post.author.name`) in props.
///
/// Array elements are addressed by index (`items.0`).
pub fn lookup<'v>(props: &'v Props, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(props, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Text form of a prop; `null` counts as missing.
fn value_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Array(_) | Value::Object(_) => Some(Cow::Owned(value.to_string())),
    }
}
