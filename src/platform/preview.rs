//! Web-preview platform client
//!
//! Resolves and "joins" channels through the platform's public HTML preview:
//!
//! | Request | Response | Outcome |
//! |---------|----------|---------|
//! | `GET <base>/<handle>` | page title + `N subscribers` | Success (Broadcast) |
//! | `GET <base>/<handle>` | page title + `N members` | Success (SuperGroup) |
//! | `GET <base>/<handle>` | page title, no audience line | TypeMismatch |
//! | `GET <base>/<handle>` | no page title | NotFound |
//! | `GET <base>/s/<handle>` | message stream present | join Success |
//! | `GET <base>/s/<handle>` | 404 or no message stream | join PermanentFailure |
//! | any | HTTP 429 | RateLimited (`Retry-After`) |
//! | any | HTTP 5xx, timeout, connection error | TransientError |
//!
//! Private numeric ids are only visible to members and resolve `NotFound`.

use super::{
    ChannelJoiner, ChannelResolver, JoinOutcome, ResolveOutcome, ResolvedChannel,
};
use crate::extract::CanonicalRef;
use crate::state::ChannelKind;
use crate::storage::ChannelRecord;
use crate::Result;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Used when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP client for the platform's public preview pages
#[derive(Debug, Clone)]
pub struct PreviewClient {
    client: Client,
    base: Url,
}

/// What a preview page says about an entity
#[derive(Debug, Clone, PartialEq)]
struct PreviewPage {
    title: Option<String>,
    audience: Option<Audience>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Audience {
    Subscribers(i64),
    Members(i64),
}

impl PreviewClient {
    /// Builds a client for the preview site at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the preview site, e.g. `https://t.me`
    /// * `user_agent` - User-Agent header sent with every request
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    /// Sends a GET, mapping rate limits and transport errors up front
    async fn get(&self, path: &str) -> std::result::Result<Response, Classified> {
        let url = self
            .endpoint(path)
            .map_err(|e| Classified::Transient(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Classified::Transient(describe_reqwest_error(&e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Classified::RateLimited(retry_after(&response)));
        }
        if status.is_server_error() {
            return Err(Classified::Transient(format!("HTTP {}", status.as_u16())));
        }
        Ok(response)
    }

    async fn resolve_path(&self, path: &str, handle: Option<&str>) -> ResolveOutcome {
        let response = match self.get(path).await {
            Ok(response) => response,
            Err(classified) => return classified.into_resolve(),
        };

        if response.status() == StatusCode::NOT_FOUND {
            return ResolveOutcome::NotFound;
        }
        if !response.status().is_success() {
            return ResolveOutcome::TransientError(format!(
                "HTTP {}",
                response.status().as_u16()
            ));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return ResolveOutcome::TransientError(describe_reqwest_error(&e)),
        };

        classify_preview(&parse_preview(&body), handle)
    }
}

#[async_trait]
impl ChannelResolver for PreviewClient {
    async fn resolve(&self, reference: &CanonicalRef) -> ResolveOutcome {
        match reference {
            CanonicalRef::Handle(handle) => self.resolve_path(handle, Some(handle)).await,
            CanonicalRef::Invite(token) => self.resolve_path(&format!("+{}", token), None).await,
            CanonicalRef::PrivateId(_) => ResolveOutcome::NotFound,
        }
    }
}

#[async_trait]
impl ChannelJoiner for PreviewClient {
    async fn join(&self, channel: &ChannelRecord) -> JoinOutcome {
        let Some(handle) = channel.handle.as_deref() else {
            return JoinOutcome::PermanentFailure(
                "no public handle; preview stream unavailable".to_string(),
            );
        };

        let response = match self.get(&format!("s/{}", handle)).await {
            Ok(response) => response,
            Err(classified) => return classified.into_join(),
        };

        if response.status() == StatusCode::NOT_FOUND {
            return JoinOutcome::PermanentFailure("channel not found".to_string());
        }
        if !response.status().is_success() {
            return JoinOutcome::TransientError(format!("HTTP {}", response.status().as_u16()));
        }

        match response.text().await {
            Ok(body) if has_message_stream(&body) => JoinOutcome::Success,
            Ok(_) => JoinOutcome::PermanentFailure("no public message stream".to_string()),
            Err(e) => JoinOutcome::TransientError(describe_reqwest_error(&e)),
        }
    }
}

/// Early exits shared by resolve and join
enum Classified {
    RateLimited(Duration),
    Transient(String),
}

impl Classified {
    fn into_resolve(self) -> ResolveOutcome {
        match self {
            Self::RateLimited(wait) => ResolveOutcome::RateLimited(wait),
            Self::Transient(reason) => ResolveOutcome::TransientError(reason),
        }
    }

    fn into_join(self) -> JoinOutcome {
        match self {
            Self::RateLimited(wait) => JoinOutcome::RateLimited(wait),
            Self::Transient(reason) => JoinOutcome::TransientError(reason),
        }
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    }
}

fn retry_after(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn parse_preview(html: &str) -> PreviewPage {
    let document = Html::parse_document(html);

    let title = Selector::parse(".tgme_page_title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let audience = Selector::parse(".tgme_page_extra").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .and_then(|el| parse_audience(&el.text().collect::<String>()))
    });

    PreviewPage { title, audience }
}

fn has_message_stream(html: &str) -> bool {
    let document = Html::parse_document(html);
    Selector::parse(".tgme_widget_message")
        .map(|selector| document.select(&selector).next().is_some())
        .unwrap_or(false)
}

/// Parses lines like `12 500 subscribers`, `1.2K members, 40 online`
fn parse_audience(text: &str) -> Option<Audience> {
    let first = text.split(',').next()?.trim().to_lowercase();
    let (number, label) = first.rsplit_once(char::is_whitespace)?;
    let count = parse_count(number)?;

    match label {
        "subscribers" | "subscriber" => Some(Audience::Subscribers(count)),
        "members" | "member" => Some(Audience::Members(count)),
        _ => None,
    }
}

fn parse_count(raw: &str) -> Option<i64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    let (digits, multiplier) = match compact.chars().last()? {
        'k' => (&compact[..compact.len() - 1], 1_000.0),
        'm' => (&compact[..compact.len() - 1], 1_000_000.0),
        _ => (compact.as_str(), 1.0),
    };

    let value: f64 = digits.parse().ok()?;
    (value >= 0.0).then(|| (value * multiplier).round() as i64)
}

fn classify_preview(page: &PreviewPage, handle: Option<&str>) -> ResolveOutcome {
    let Some(title) = &page.title else {
        return ResolveOutcome::NotFound;
    };

    let (kind, member_count) = match page.audience {
        Some(Audience::Subscribers(n)) => (ChannelKind::Broadcast, n),
        Some(Audience::Members(n)) => (ChannelKind::SuperGroup, n),
        // Users and automation accounts have a title but no audience
        None => return ResolveOutcome::TypeMismatch,
    };

    ResolveOutcome::Success(ResolvedChannel {
        kind,
        title: Some(title.clone()),
        member_count: Some(member_count),
        platform_id: None,
        handle: handle.map(str::to_string),
    })
}
