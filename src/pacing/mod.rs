//! Pacing of externally rate-limited calls
//!
//! - `DelayGovernor`: jittered per-category delays and rate-limit advisories
//! - `JitterSource`: injectable random fraction (thread RNG or fixed)
//! - `Clock` / `DayBoundary`: wall clock and calendar days for the daily budget

mod clock;
mod governor;
mod jitter;

pub use clock::{Clock, DayBoundary, ManualClock, SystemClock};
pub use governor::{CallCategory, DelayConfig, DelayGovernor};
pub use jitter::{FixedJitter, JitterSource, ThreadRngJitter};
