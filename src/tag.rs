//! Marker scanning for rendered document bodies.
//!
//! Authors reference a Flickr photo by writing a marker on its own line in
//! Markdown. After Markdown rendering the marker sits alone in a paragraph,
//! which is the only shape recognized here:
//!
//! ```text
//! <p>[flickr:id=52123456789]</p>                  → id "52123456789", no title
//! <p>[flickr:id=52123456789,title=Harbour]</p>    → id "52123456789", title "Harbour"
//! ```
//!
//! Anything else (non-numeric id, missing bracket, marker sharing a paragraph
//! with other text) does not match and is left in the body untouched.
//!
//! ## Photo keys
//!
//! Each match maps to a [`PhotoKey`], the cache lookup key. A bare marker's
//! key is its id; a titled marker's key is written the way the marker writes
//! it (`52123456789,title=Harbour`) so the same photo under two different
//! inline titles gets two cache entries. Keys only depend on the marker text,
//! so an unchanged document produces the same keys on every build.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

const TITLE_SEPARATOR: &str = ",title=";

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<p>\[flickr:id=([0-9]+)(?:,title=([^\]<\n]*))?\]</p>").unwrap()
});

/// Cache key for a requested photo: `id` or `id,title=<title>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoKey(String);

impl PhotoKey {
    /// Build a key from a numeric id and an optional override title.
    ///
    /// An empty title is the same as no title.
    pub fn new(id: &str, title: Option<&str>) -> Self {
        match title.filter(|t| !t.is_empty()) {
            Some(t) => Self(format!("{id}{TITLE_SEPARATOR}{t}")),
            None => Self(id.to_string()),
        }
    }

    /// The Flickr photo id part of the key.
    pub fn id(&self) -> &str {
        self.0
            .split_once(TITLE_SEPARATOR)
            .map_or(self.0.as_str(), |(id, _)| id)
    }

    /// The inline override title, if the marker carried one.
    pub fn title(&self) -> Option<&str> {
        self.0.split_once(TITLE_SEPARATOR).map(|(_, title)| title)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhotoKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single marker found in a document body.
///
/// Borrows from the body it was scanned from; it only lives long enough to
/// drive substitution in that body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch<'a> {
    /// The full matched text, paragraph wrapper included. This is what gets
    /// replaced by the rendered fragment: the `<p>` goes too, not just the
    /// bracketed marker, so an override template has to supply its own
    /// block element.
    pub literal: &'a str,
    /// Numeric photo id, as written.
    pub id: &'a str,
    /// Inline title as it appears in the rendered HTML (entities intact).
    /// `None` when absent or empty.
    pub raw_title: Option<&'a str>,
}

impl TagMatch<'_> {
    /// Inline title with the HTML entities a Markdown renderer emits decoded.
    pub fn title(&self) -> Option<String> {
        self.raw_title.map(unescape_html)
    }

    pub fn key(&self) -> PhotoKey {
        PhotoKey::new(self.id, self.title().as_deref())
    }
}

/// Scan a body for markers, left to right, non-overlapping.
///
/// The returned iterator is lazy; call `scan` again to restart.
pub fn scan(body: &str) -> impl Iterator<Item = TagMatch<'_>> {
    MARKER.captures_iter(body).filter_map(|caps| tag_match(&caps))
}

/// Rewrite `body` in one left-to-right pass.
///
/// Each marker is replaced by what `f` returns for it, or kept when `f`
/// returns `None`. Replacement text is never scanned again, so a fragment
/// that happens to contain marker text is left as rendered.
pub fn replace_all<F>(body: &str, mut f: F) -> String
where
    F: FnMut(&TagMatch<'_>) -> Option<String>,
{
    MARKER
        .replace_all(body, |caps: &Captures<'_>| match tag_match(caps) {
            Some(m) => f(&m).unwrap_or_else(|| m.literal.to_string()),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn tag_match<'a>(caps: &Captures<'a>) -> Option<TagMatch<'a>> {
    let literal = caps.get(0)?.as_str();
    let id = caps.get(1)?.as_str();
    let raw_title = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|t| !t.is_empty());
    Some(TagMatch {
        literal,
        id,
        raw_title,
    })
}

/// Collect the de-duplicated set of keys referenced by any of `bodies`.
pub fn requested_keys<'a, I>(bodies: I) -> BTreeSet<PhotoKey>
where
    I: IntoIterator<Item = &'a str>,
{
    bodies
        .into_iter()
        .flat_map(|body| scan(body).map(|m| m.key()))
        .collect()
}

/// Decode the five entities pulldown-cmark escapes in text.
fn unescape_html(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
