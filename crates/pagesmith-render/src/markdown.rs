//! Markdown adapter using pulldown-cmark.

use std::path::Path;

use futures::future::{BoxFuture, FutureExt};
use pagesmith_core::Props;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, TextMergeStream, html};

use crate::{
    RenderAdapter, RenderError, Result,
    component::{Body, Component},
    context::RenderScope,
    extension_matches,
    markup::{Markup, escape},
    template::Piece,
};

/// Opens a marker standing in for an interpolated piece in markdown source.
const MARK_OPEN: char = '\u{E000}';

/// Closes a marker.
const MARK_CLOSE: char = '\u{E001}';

/// Renders markdown bodies, interpolating props after parsing.
///
/// The parser only sees the template's own text with a private-use marker in
/// place of each prop. Prop values are put back into the parsed events as
/// plain text, so they never become markdown syntax, HTML or attributes.
/// Raw props and included components are inserted as HTML.
#[derive(Debug, Clone)]
pub struct MarkdownAdapter {
    extensions: Vec<String>,
    options: Options,
}

impl Default for MarkdownAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownAdapter {
    /// Create a markdown adapter for `.md` and `.markdown` files.
    pub fn new() -> Self {
        Self::with_extensions(["md", "markdown"])
    }

    /// Create a markdown adapter claiming custom extensions.
    pub fn with_extensions<S: Into<String>>(extensions: impl IntoIterator<Item = S>) -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
            options,
        }
    }

    /// Convert markdown source to HTML.
    pub fn to_html(&self, source: &str) -> String {
        let parser = Parser::new_ext(source, self.options);
        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }

    /// Convert rendered template pieces to HTML.
    pub fn pieces_to_html(&self, pieces: &[Piece]) -> String {
        let source = with_markers(pieces);
        let events: Vec<Event<'_>> =
            TextMergeStream::new(Parser::new_ext(&source, self.options)).collect();

        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, substitute(events, pieces).into_iter());
        out
    }
}

fn with_markers(pieces: &[Piece]) -> String {
    let mut source = String::new();
    for (index, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(text) => source.push_str(text),
            Piece::Text(_) | Piece::Html(_) => {
                source.push(MARK_OPEN);
                source.push_str(&index.to_string());
                source.push(MARK_CLOSE);
            }
        }
    }
    source
}

/// Part of an event's text: source text or the piece behind a marker.
enum Chunk<'s, 'p> {
    Source(&'s str),
    Piece(&'p Piece),
}

fn chunks<'s, 'p>(text: &'s str, pieces: &'p [Piece]) -> Vec<Chunk<'s, 'p>> {
    let mut chunks = Vec::new();
    let mut rest = text;
    let mut scanned = 0;

    while let Some(open) = rest[scanned..].find(MARK_OPEN).map(|i| i + scanned) {
        let body = open + MARK_OPEN.len_utf8();
        let piece = rest[body..].find(MARK_CLOSE).and_then(|close| {
            let index: usize = rest[body..body + close].parse().ok()?;
            let piece = pieces.get(index).filter(|p| !matches!(p, Piece::Literal(_)))?;
            Some((piece, body + close + MARK_CLOSE.len_utf8()))
        });

        match piece {
            Some((piece, end)) => {
                if open > 0 {
                    chunks.push(Chunk::Source(&rest[..open]));
                }
                chunks.push(Chunk::Piece(piece));
                rest = &rest[end..];
                scanned = 0;
            }
            None => scanned = body,
        }
    }

    if !rest.is_empty() {
        chunks.push(Chunk::Source(rest));
    }
    chunks
}

/// Replace markers with their values; `escape_text` is set inside literal HTML.
fn fill(text: &str, pieces: &[Piece], escape_text: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for chunk in chunks(text, pieces) {
        match chunk {
            Chunk::Source(source) => out.push_str(source),
            Chunk::Piece(Piece::Text(value)) if escape_text => out.push_str(&escape(value)),
            Chunk::Piece(Piece::Text(value) | Piece::Literal(value)) => out.push_str(value),
            Chunk::Piece(Piece::Html(html)) => out.push_str(html.as_str()),
        }
    }
    out
}

fn fill_cow<'e>(text: CowStr<'e>, pieces: &[Piece]) -> CowStr<'e> {
    if text.contains(MARK_OPEN) {
        fill(&text, pieces, false).into()
    } else {
        text
    }
}

/// Link targets built from props may not run script.
fn fill_url<'e>(url: CowStr<'e>, pieces: &[Piece]) -> CowStr<'e> {
    if !url.contains(MARK_OPEN) {
        return url;
    }
    let url = fill(&url, pieces, false);
    let scheme: String = url
        .chars()
        .take_while(|c| *c != ':')
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if url.contains(':') && matches!(scheme.as_str(), "javascript" | "vbscript" | "data") {
        CowStr::from("#")
    } else {
        url.into()
    }
}

fn substitute<'e>(events: Vec<Event<'e>>, pieces: &[Piece]) -> Vec<Event<'e>> {
    let mut out: Vec<Event<'e>> = Vec::with_capacity(events.len());
    let mut events = events.into_iter().peekable();

    while let Some(event) = events.next() {
        match event {
            Event::Text(text) if text.contains(MARK_OPEN) => {
                let parts = chunks(&text, pieces);

                // An included component alone in a paragraph replaces the paragraph.
                if let [Chunk::Piece(Piece::Html(html))] = parts.as_slice() {
                    if matches!(out.last(), Some(Event::Start(Tag::Paragraph)))
                        && matches!(events.peek(), Some(Event::End(TagEnd::Paragraph)))
                    {
                        out.pop();
                        events.next();
                        out.push(Event::Html(html.as_str().to_string().into()));
                        continue;
                    }
                }

                for part in parts {
                    out.push(match part {
                        Chunk::Source(source) => Event::Text(source.to_string().into()),
                        Chunk::Piece(Piece::Text(value) | Piece::Literal(value)) => {
                            Event::Text(value.clone().into())
                        }
                        Chunk::Piece(Piece::Html(html)) => {
                            Event::InlineHtml(html.as_str().to_string().into())
                        }
                    });
                }
            }
            Event::Code(code) => out.push(Event::Code(fill_cow(code, pieces))),
            Event::Html(html) if html.contains(MARK_OPEN) => {
                out.push(Event::Html(fill(&html, pieces, true).into()));
            }
            Event::InlineHtml(html) if html.contains(MARK_OPEN) => {
                out.push(Event::InlineHtml(fill(&html, pieces, true).into()));
            }
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => out.push(Event::Start(Tag::Link {
                link_type,
                dest_url: fill_url(dest_url, pieces),
                title: fill_cow(title, pieces),
                id,
            })),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => out.push(Event::Start(Tag::Image {
                link_type,
                dest_url: fill_url(dest_url, pieces),
                title: fill_cow(title, pieces),
                id,
            })),
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => out.push(Event::Start(Tag::Heading {
                level,
                id: id.map(|id| fill_cow(id, pieces)),
                classes: classes.into_iter().map(|c| fill_cow(c, pieces)).collect(),
                // Attribute names come from the source only.
                attrs: attrs
                    .into_iter()
                    .filter(|(k, _)| !k.contains(MARK_OPEN))
                    .map(|(k, v)| (k, v.map(|v| fill_cow(v, pieces))))
                    .collect(),
            })),
            other => out.push(other),
        }
    }
    out
}

impl RenderAdapter for MarkdownAdapter {
    fn name(&self) -> &str {
        "markdown"
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
            let Body::Markdown(template) = component.body() else {
                return Err(RenderError::UnsupportedBody {
                    adapter: self.name().to_string(),
                    component: component.name().to_string(),
                    kind: component.body().kind(),
                });
            };

            let pieces = template.render_pieces(&props, scope).await?;
            Ok(Markup::raw(self.pieces_to_html(&pieces)))
        }
        .boxed()
    }
}
