//! Throttled crawl loop
//!
//! Verified channels are joined oldest-first, paced through the shared
//! [`DelayGovernor`](crate::pacing::DelayGovernor), and never more often per
//! day than the configured quota.

mod scheduler;

pub use scheduler::{CrawlScheduler, SchedulerSettings, TickOutcome};
