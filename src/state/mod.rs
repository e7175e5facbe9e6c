//! State module for tracking channel progress
//!
//! # Components
//!
//! - `ChannelStatus`: lifecycle of a channel row (discovered, verified, rejected, crawling, failed)
//! - `ChannelKind`: what a reference resolved to on the platform

mod channel_state;

pub use channel_state::{ChannelKind, ChannelStatus};
