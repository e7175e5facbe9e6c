//! Reference patterns for the platform's channel-link convention
//!
//! Plain text is scanned with three patterns (sigil mentions, web links and
//! `tg://` deep links). Link targets from formatting spans go through
//! [`parse_target`], which uses the `url` crate when the target is absolute
//! and falls back to the text scanner otherwise.

use super::CanonicalRef;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Hosts that serve the channel-link convention
const LINK_HOSTS: &[&str] = &["t.me", "telegram.me", "telegram.dog"];

/// Tokens that look like handles but never name a channel
const RESERVED_WORDS: &[&str] = &[
    "admin",
    "support",
    "help",
    "here",
    "all",
    "everyone",
    "channel",
    "group",
    "username",
    "joinchat",
    "share",
    "addstickers",
    "proxy",
    "socks",
    "iv",
];

static RE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("mention pattern is valid"));

static RE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?(?:t\.me|telegram\.me|telegram\.dog)/([A-Za-z0-9_+\-/]+)")
        .expect("link pattern is valid")
});

static RE_DEEP_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tg://(resolve|join)\?(?:domain|invite)=([A-Za-z0-9_\-]+)")
        .expect("deep link pattern is valid")
});

/// Returns the canonical handle if `candidate` is a valid channel handle
///
/// Handles are 5-32 characters of `[A-Za-z0-9_]` starting with a letter,
/// and are not one of the reserved words.
pub fn normalize_handle(candidate: &str) -> Option<String> {
    let len = candidate.len();
    if !(5..=32).contains(&len) {
        return None;
    }

    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let lowered = candidate.to_ascii_lowercase();
    if RESERVED_WORDS.contains(&lowered.as_str()) {
        return None;
    }
    Some(lowered)
}

fn normalize_invite(token: &str) -> Option<CanonicalRef> {
    let valid = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| CanonicalRef::Invite(token.to_string()))
}

/// Interprets the path after a link host (`handle`, `s/handle`, `c/123`,
/// `joinchat/token`, `+token`)
pub fn parse_link_path(path: &str) -> Option<CanonicalRef> {
    let mut segments = path.trim_start_matches('/').split('/');
    let first = segments.next()?;

    if let Some(token) = first.strip_prefix('+') {
        return normalize_invite(token);
    }

    match first.to_ascii_lowercase().as_str() {
        "c" => {
            let id = segments.next()?;
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            id.parse::<i64>().ok().map(CanonicalRef::PrivateId)
        }
        "joinchat" => normalize_invite(segments.next()?),
        "s" => normalize_handle(segments.next()?).map(CanonicalRef::Handle),
        _ => normalize_handle(first).map(CanonicalRef::Handle),
    }
}

fn parse_deep_link(action: &str, value: &str) -> Option<CanonicalRef> {
    if action.eq_ignore_ascii_case("join") {
        normalize_invite(value)
    } else {
        normalize_handle(value).map(CanonicalRef::Handle)
    }
}

fn attached_to_word(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Scans plain text for every reference shape, in order of appearance
pub fn scan_text(text: &str) -> Vec<CanonicalRef> {
    scan_located(text)
        .into_iter()
        .map(|(_, reference)| reference)
        .collect()
}

/// Like [`scan_text`], paired with each match's byte offset
pub(crate) fn scan_located(text: &str) -> Vec<(usize, CanonicalRef)> {
    let mut found: Vec<(usize, CanonicalRef)> = Vec::new();

    for caps in RE_MENTION.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // `user@example.com` is an address, not a mention
        if attached_to_word(text, whole.start()) {
            continue;
        }
        if let Some(handle) = normalize_handle(name.as_str()) {
            found.push((whole.start(), CanonicalRef::Handle(handle)));
        }
    }

    for caps in RE_LINK.captures_iter(text) {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // `donat.me/...` is a different host
        if attached_to_word(text, whole.start()) {
            continue;
        }
        if let Some(reference) = parse_link_path(path.as_str()) {
            found.push((whole.start(), reference));
        }
    }

    for caps in RE_DEEP_LINK.captures_iter(text) {
        let (Some(whole), Some(action), Some(value)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if let Some(reference) = parse_deep_link(action.as_str(), value.as_str()) {
            found.push((whole.start(), reference));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found
}

/// Interprets a formatting span's target URL
pub fn parse_target(target: &str) -> Option<CanonicalRef> {
    let target = target.trim();

    if let Ok(url) = Url::parse(target) {
        match url.scheme() {
            "http" | "https" => {
                let host = url.host_str()?.to_ascii_lowercase();
                let host = host.strip_prefix("www.").unwrap_or(&host);
                if !LINK_HOSTS.contains(&host) {
                    return None;
                }
                return parse_link_path(url.path());
            }
            "tg" => {
                let action = url.host_str()?.to_string();
                let key = if action.eq_ignore_ascii_case("join") {
                    "invite"
                } else {
                    "domain"
                };
                let value = url
                    .query_pairs()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.into_owned())?;
                return parse_deep_link(&action, &value);
            }
            _ => return None,
        }
    }

    // Scheme-less targets such as `t.me/foo`
    scan_text(target).into_iter().next()
}
