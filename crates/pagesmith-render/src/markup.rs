//! Escaped HTML fragments.
//!
//! [`Markup`] is the only thing adapters return. Caller-supplied text enters
//! it through [`Markup::text`] (escaped); unescaped HTML must go through
//! [`Markup::raw`], so every raw insertion is visible at its call site.

use std::{borrow::Cow, fmt};

/// Characters that require HTML escaping.
const ESCAPE_CHARS: [char; 5] = ['<', '>', '&', '"', '\''];

#[inline]
fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

/// Escape HTML special characters.
///
/// Borrows when nothing needs escaping. The same character set is escaped in
/// text and attribute contexts.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(&ESCAPE_CHARS[..]) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match escape_char(c) {
            Some(entity) => result.push_str(entity),
            None => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// A fragment of HTML that is safe to emit as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Markup(String);

impl Markup {
    /// Empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Escape `text` into a fragment.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self(escape(text).into_owned())
    }

    /// Wrap already-trusted HTML without escaping it.
    ///
    /// This is the explicit opt-out; never pass caller data through it.
    #[must_use]
    pub fn raw(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    /// Append escaped text.
    pub fn push_text(&mut self, text: &str) {
        self.0.push_str(&escape(text));
    }

    /// Append another fragment.
    pub fn push(&mut self, other: &Markup) {
        self.0.push_str(&other.0);
    }

    /// Append trusted HTML.
    pub fn push_raw(&mut self, html: &str) {
        self.0.push_str(html);
    }

    /// Borrow the HTML.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the HTML out.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the fragment is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromIterator<Markup> for Markup {
    fn from_iter<I: IntoIterator<Item = Markup>>(iter: I) -> Self {
        let mut out = Markup::new();
        for part in iter {
            out.push(&part);
        }
        out
    }
}
