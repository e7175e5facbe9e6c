//! Link extraction from collection-point messages
//!
//! A message is a plain-text body plus a list of formatting spans. Both are
//! turned into [`ReferenceSource`]s and every source is matched against the
//! platform's link convention, producing a deduplicated list of
//! [`CanonicalRef`]s in encounter order. Body matches and spans are ordered
//! together by their UTF-16 position; on a tie the body match comes first.

pub mod category;
mod patterns;

pub use category::{categorize, Category};
pub use patterns::{normalize_handle, parse_target, scan_text};

use patterns::scan_located;

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// Normalized identity of a channel reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalRef {
    /// Public handle, lower-cased
    Handle(String),
    /// Private channel addressed by its numeric platform id
    PrivateId(i64),
    /// Invite token, case preserved
    Invite(String),
}

impl CanonicalRef {
    /// Returns the dedup key stored as `canonical_id`
    ///
    /// Handles map to themselves; numeric ids and invites carry a prefix
    /// (`id:`, `invite:`) that can never collide with a handle.
    pub fn key(&self) -> String {
        match self {
            Self::Handle(handle) => handle.clone(),
            Self::PrivateId(id) => format!("id:{}", id),
            Self::Invite(token) => format!("invite:{}", token),
        }
    }

    /// Parses a key produced by [`CanonicalRef::key`]
    pub fn from_key(key: &str) -> Option<Self> {
        if let Some(id) = key.strip_prefix("id:") {
            return id.parse().ok().map(Self::PrivateId);
        }
        if let Some(token) = key.strip_prefix("invite:") {
            return (!token.is_empty()).then(|| Self::Invite(token.to_string()));
        }
        normalize_handle(key).map(Self::Handle)
    }

    pub fn handle(&self) -> Option<&str> {
        match self {
            Self::Handle(handle) => Some(handle),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handle(handle) => write!(f, "@{}", handle),
            _ => write!(f, "{}", self.key()),
        }
    }
}

/// Kind of a formatting span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// The visible text is itself a URL
    Url,
    /// Visible text with a hidden target URL
    TextLink,
    /// An `@handle` mention
    Mention,
    #[serde(other)]
    Other,
}

/// A formatting annotation over the message text
///
/// `offset` and `length` count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormattingSpan {
    pub offset: usize,
    pub length: usize,
    pub kind: SpanKind,
    #[serde(default)]
    pub url: Option<String>,
}

/// A message forwarded into the collection point
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub spans: Vec<FormattingSpan>,
}

impl Message {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            spans: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: FormattingSpan) -> Self {
        self.spans.push(span);
        self
    }
}

/// Where a candidate reference came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceSource<'a> {
    /// The plain-text body
    PlainTextToken(&'a str),
    /// A well-formed formatting span with its visible label
    FormattingSpan {
        /// UTF-16 offset into the body
        offset: usize,
        kind: SpanKind,
        label: String,
        target: Option<&'a str>,
    },
}

/// Splits a message into reference sources, dropping malformed spans
pub fn sources(message: &Message) -> Vec<ReferenceSource<'_>> {
    let mut out = vec![ReferenceSource::PlainTextToken(message.text.as_str())];

    let units: Vec<u16> = message.text.encode_utf16().collect();
    let mut spans: Vec<&FormattingSpan> = message.spans.iter().collect();
    spans.sort_by_key(|span| span.offset);

    for span in spans {
        let Some(end) = span.offset.checked_add(span.length) else {
            continue;
        };
        if span.length == 0 || end > units.len() {
            tracing::debug!(
                offset = span.offset,
                length = span.length,
                "Ignoring span outside message text"
            );
            continue;
        }
        out.push(ReferenceSource::FormattingSpan {
            offset: span.offset,
            kind: span.kind,
            label: String::from_utf16_lossy(&units[span.offset..end]),
            target: span.url.as_deref(),
        });
    }

    out
}

fn references_in(source: &ReferenceSource<'_>) -> Vec<CanonicalRef> {
    match source {
        ReferenceSource::PlainTextToken(text) => scan_text(text),
        ReferenceSource::FormattingSpan {
            kind: SpanKind::TextLink,
            target,
            ..
        } => target.and_then(parse_target).into_iter().collect(),
        ReferenceSource::FormattingSpan {
            kind: SpanKind::Url,
            label,
            target,
            ..
        } => parse_target(target.unwrap_or(label)).into_iter().collect(),
        ReferenceSource::FormattingSpan {
            kind: SpanKind::Mention,
            label,
            ..
        } => scan_text(label),
        ReferenceSource::FormattingSpan {
            kind: SpanKind::Other,
            ..
        } => Vec::new(),
    }
}

/// References of one source, each with its UTF-16 position in the body
fn located_references(source: &ReferenceSource<'_>) -> Vec<(usize, CanonicalRef)> {
    match source {
        ReferenceSource::PlainTextToken(text) => scan_located(text)
            .into_iter()
            .map(|(byte, reference)| (text[..byte].encode_utf16().count(), reference))
            .collect(),
        ReferenceSource::FormattingSpan { offset, .. } => references_in(source)
            .into_iter()
            .map(|reference| (*offset, reference))
            .collect(),
    }
}

/// Extracts the deduplicated canonical references of a message
pub fn extract_references(message: &Message) -> Vec<CanonicalRef> {
    let mut located: Vec<(usize, CanonicalRef)> = sources(message)
        .iter()
        .flat_map(located_references)
        .collect();
    located.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    located
        .into_iter()
        .map(|(_, reference)| reference)
        .filter(|reference| seen.insert(reference.clone()))
        .collect()
}
