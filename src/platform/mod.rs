//! Platform capabilities consumed by the pipeline
//!
//! The verifier only needs [`ChannelResolver`] and the crawl loop only needs
//! [`ChannelJoiner`]. Both report classified outcomes rather than errors:
//! a `NotFound` or a rate limit is an expected answer, not a failure of the
//! call itself.

mod preview;

pub use preview::PreviewClient;

use crate::extract::CanonicalRef;
use crate::state::ChannelKind;
use crate::storage::ChannelRecord;
use async_trait::async_trait;
use std::time::Duration;

/// Authoritative metadata returned by a successful resolve
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub kind: ChannelKind,
    pub title: Option<String>,
    pub member_count: Option<i64>,
    /// Numeric platform id, when the platform disclosed it
    pub platform_id: Option<i64>,
    /// Public handle, when the entity has one
    pub handle: Option<String>,
}

/// Classified answer to a resolve call
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Success(ResolvedChannel),
    /// Entity does not exist or is inaccessible
    NotFound,
    /// Entity exists but is not a broadcast or group
    TypeMismatch,
    RateLimited(Duration),
    TransientError(String),
}

/// Classified answer to a join call
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Success,
    RateLimited(Duration),
    /// Entity deleted, access revoked, or joining banned
    PermanentFailure(String),
    TransientError(String),
}

/// Resolves a reference to platform metadata
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve(&self, reference: &CanonicalRef) -> ResolveOutcome;
}

/// Joins a channel so its content becomes observable
#[async_trait]
pub trait ChannelJoiner: Send + Sync {
    async fn join(&self, channel: &ChannelRecord) -> JoinOutcome;
}
