/// Channel state definitions for tracking discovery and crawl progress
///
/// This module defines the lifecycle of a channel row and the kinds of
/// entities the platform can resolve a reference to.
use std::fmt;

/// Represents the current status of a channel in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    /// Seen in a message (or reset by an operator) but not yet verified
    Discovered,

    /// Resolved to a real broadcast/group and waiting to be joined
    Verified,

    /// Does not exist, is inaccessible, or is not a channel/group
    Rejected,

    /// Joined; content is being observed
    Crawling,

    /// A join failed permanently; needs an operator reset to retry
    Failed,
}

impl ChannelStatus {
    /// Returns true if a row may move from `self` to `next`
    ///
    /// Transitions only move forward, except the operator retry edge
    /// `Failed -> Discovered`. `Verified -> Verified` and
    /// `Crawling -> Crawling` refresh metadata without changing state.
    pub fn can_transition_to(&self, next: ChannelStatus) -> bool {
        use ChannelStatus::*;
        matches!(
            (self, next),
            (Discovered, Verified)
                | (Discovered, Rejected)
                | (Verified, Verified)
                | (Verified, Crawling)
                | (Verified, Failed)
                | (Crawling, Crawling)
                | (Crawling, Failed)
                | (Failed, Discovered)
        )
    }

    /// Returns true if verification is finished for this row
    pub fn is_verification_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Verified)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
            Self::Crawling => "crawling",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "verified" => Some(Self::Verified),
            "rejected" => Some(Self::Rejected),
            "crawling" => Some(Self::Crawling),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all statuses in lifecycle order
    pub fn all_states() -> [Self; 5] {
        [
            Self::Discovered,
            Self::Verified,
            Self::Rejected,
            Self::Crawling,
            Self::Failed,
        ]
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// The kind of entity a reference resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// One-to-many broadcast channel
    Broadcast,
    SuperGroup,
    Group,
    /// Not yet resolved, or resolved to something that is not a channel
    Unknown,
}

impl ChannelKind {
    /// Broadcasts and groups can be crawled; anything else is a type mismatch
    pub fn is_crawlable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::SuperGroup => "supergroup",
            Self::Group => "group",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Self {
        match s {
            "broadcast" => Self::Broadcast,
            "supergroup" => Self::SuperGroup,
            "group" => Self::Group,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
