//! Jittered delay governor shared by verification and crawl joins
//!
//! Every call-site that talks to the platform goes through
//! [`DelayGovernor::wait`] first. The baseline delay for a category is
//! `base + u * jitter` where `u` comes from an injectable [`JitterSource`].
//!
//! Waiters do not each count from their own start. A wait reserves the next
//! slot of its category, `max(now, last slot) + delay`, and sleeps until that
//! slot, so concurrent callers are spaced one delay apart. A rate-limit
//! advisory sets a not-before instant that holds every waiter of every
//! category, including ones already asleep on an earlier slot.

use super::jitter::{JitterSource, ThreadRngJitter};
use crate::{HarvestError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Kind of externally rate-limited call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallCategory {
    /// Resolving a reference during verification
    Verification,
    /// Joining a channel from the crawl loop
    CrawlJoin,
}

impl CallCategory {
    pub fn all() -> [Self; 2] {
        [Self::Verification, Self::CrawlJoin]
    }
}

impl fmt::Display for CallCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification => write!(f, "verification"),
            Self::CrawlJoin => write!(f, "crawl-join"),
        }
    }
}

/// Base delay and jitter span for one category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayConfig {
    pub base: Duration,
    pub jitter: Duration,
}

impl DelayConfig {
    pub fn from_secs(base: f64, jitter: f64) -> Self {
        Self {
            base: Duration::from_secs_f64(base.max(0.0)),
            jitter: Duration::from_secs_f64(jitter.max(0.0)),
        }
    }

    /// 3s plus up to 1s
    pub fn verification_default() -> Self {
        Self::from_secs(3.0, 1.0)
    }

    /// 10s plus up to 20s
    pub fn crawl_default() -> Self {
        Self::from_secs(10.0, 20.0)
    }
}

#[derive(Debug, Default)]
struct PacingState {
    /// Last reserved slot per category
    slots: HashMap<CallCategory, Instant>,
    /// Account-wide cool-down end from the latest advisory
    not_before: Option<Instant>,
}

/// Computes and enforces pacing delays
pub struct DelayGovernor {
    configs: HashMap<CallCategory, DelayConfig>,
    jitter: Arc<dyn JitterSource>,
    state: Mutex<PacingState>,
}

impl DelayGovernor {
    /// Creates a governor drawing jitter from the thread-local generator
    pub fn new(verification: DelayConfig, crawl_join: DelayConfig) -> Self {
        Self::with_jitter(verification, crawl_join, Arc::new(ThreadRngJitter))
    }

    pub fn with_jitter(
        verification: DelayConfig,
        crawl_join: DelayConfig,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        let configs = HashMap::from([
            (CallCategory::Verification, verification),
            (CallCategory::CrawlJoin, crawl_join),
        ]);
        Self {
            configs,
            jitter,
            state: Mutex::new(PacingState::default()),
        }
    }

    pub fn config(&self, category: CallCategory) -> DelayConfig {
        self.configs.get(&category).copied().unwrap_or_else(|| match category {
            CallCategory::Verification => DelayConfig::verification_default(),
            CallCategory::CrawlJoin => DelayConfig::crawl_default(),
        })
    }

    fn state(&self) -> MutexGuard<'_, PacingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Samples `base + u * jitter` for `category`
    pub fn baseline(&self, category: CallCategory) -> Duration {
        let config = self.config(category);
        let u = self.jitter.sample().clamp(0.0, 1.0);
        config.base + config.jitter.mul_f64(u)
    }

    fn slot_after(&self, state: &PacingState, category: CallCategory, now: Instant) -> Instant {
        let start = state
            .slots
            .get(&category)
            .map_or(now, |&last| last.max(now));
        let slot = start + self.baseline(category);
        match state.not_before {
            Some(until) => slot.max(until),
            None => slot,
        }
    }

    fn reserve(&self, category: CallCategory, now: Instant) -> Instant {
        let mut state = self.state();
        let slot = self.slot_after(&state, category, now);
        state.slots.insert(category, slot);
        slot
    }

    /// How long a wait of `category` starting now would sleep
    ///
    /// Nothing is reserved.
    pub fn next_delay(&self, category: CallCategory) -> Duration {
        let now = Instant::now();
        let slot = self.slot_after(&self.state(), category, now);
        slot.saturating_duration_since(now)
    }

    /// Time left on the current advisory cool-down, if any
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.state()
            .not_before
            .filter(|&until| until > now)
            .map(|until| until - now)
    }

    /// Records a platform-advised cool-down
    ///
    /// Advisories are account-wide: no waiter of any category proceeds before
    /// `now + advised`. A shorter advisory never shortens a longer one.
    pub fn on_rate_limited(&self, advised: Duration) {
        let until = Instant::now() + advised;
        {
            let mut state = self.state();
            state.not_before = Some(state.not_before.map_or(until, |current| current.max(until)));
        }
        tracing::warn!(
            advised_secs = advised.as_secs_f64(),
            "Rate limited by platform; all platform calls held"
        );
    }

    /// Reserves the next slot of `category` and sleeps until it
    ///
    /// A waiter that wakes inside a cool-down set after it reserved takes a
    /// fresh slot behind the cool-down.
    ///
    /// # Returns
    ///
    /// * `Ok(Duration)` - How long was waited
    /// * `Err(HarvestError::Cancelled)` - `cancel` fired during the wait
    pub async fn wait(&self, category: CallCategory, cancel: &CancellationToken) -> Result<Duration> {
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let started = Instant::now();
        let mut slot = self.reserve(category, started);
        loop {
            tracing::debug!(
                category = %category,
                delay_secs = slot.saturating_duration_since(Instant::now()).as_secs_f64(),
                "Pacing before platform call"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
                _ = tokio::time::sleep_until(slot) => {}
            }

            let now = Instant::now();
            let held = self.state().not_before.is_some_and(|until| until > now);
            if !held {
                break;
            }
            slot = self.reserve(category, now);
        }

        Ok(slot.saturating_duration_since(started))
    }
}
