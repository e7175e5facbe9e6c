//! Crawl scheduler: joins verified channels under a daily quota
//!
//! One iteration ([`CrawlScheduler::tick`]):
//! - Skip if the crawl switch is off
//! - Skip if today's budget is used up
//! - Pick the oldest-discovered `Verified` channel not attempted today
//! - Pace through the governor, reserve one budget unit, join
//! - Record the result; rate limits and transient errors give the unit back

use crate::pacing::{CallCategory, Clock, DayBoundary, DelayGovernor, SystemClock};
use crate::pipeline::CrawlSwitch;
use crate::platform::{ChannelJoiner, JoinOutcome};
use crate::report::{crawl_status, CrawlStatusSnapshot};
use crate::state::ChannelStatus;
use crate::storage::{lock, CatalogStore, ChannelRecord, SharedCatalog};
use crate::{HarvestError, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler tunables
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Maximum joins per calendar day
    pub daily_quota: u32,
    pub boundary: DayBoundary,
    /// Sleep between checks while disabled or idle
    pub idle_interval: Duration,
    /// Upper bound on one join call
    pub call_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            daily_quota: 10,
            boundary: DayBoundary::utc(),
            idle_interval: Duration::from_secs(300),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// What one iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Disabled,
    BudgetExhausted,
    /// Nothing left to attempt today
    Idle,
    Joined(String),
    RateLimited(Duration),
    Failed(String),
    Transient(String),
}

pub struct CrawlScheduler {
    catalog: SharedCatalog,
    joiner: Arc<dyn ChannelJoiner>,
    governor: Arc<DelayGovernor>,
    switch: CrawlSwitch,
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
}

impl CrawlScheduler {
    pub fn new(
        catalog: SharedCatalog,
        joiner: Arc<dyn ChannelJoiner>,
        governor: Arc<DelayGovernor>,
        switch: CrawlSwitch,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            catalog,
            joiner,
            governor,
            switch,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current switch state and today's budget
    pub fn status(&self) -> Result<CrawlStatusSnapshot> {
        let today = self.settings.boundary.day_of(self.clock.now());
        let catalog = lock(&self.catalog)?;
        Ok(crawl_status(
            &*catalog,
            self.switch.is_enabled(),
            self.settings.daily_quota,
            today,
        )?)
    }

    /// Runs iterations until `cancel` fires
    ///
    /// Storage errors abandon the current iteration only; the loop logs
    /// them and carries on after an idle interval.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            quota = self.settings.daily_quota,
            enabled = self.switch.is_enabled(),
            "Crawl scheduler started"
        );

        loop {
            let pause = match self.tick(&cancel).await {
                Ok(TickOutcome::Disabled) | Ok(TickOutcome::Idle) => self.settings.idle_interval,
                Ok(TickOutcome::BudgetExhausted) => {
                    let wait = self.settings.boundary.until_next_day(self.clock.now());
                    info!(
                        resume_in_secs = wait.as_secs(),
                        "Daily join quota reached"
                    );
                    wait
                }
                Ok(_) => Duration::ZERO,
                Err(HarvestError::Cancelled) => break,
                Err(e) => {
                    error!(error = %e, "Crawl iteration failed");
                    self.settings.idle_interval
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
                if let Err(e) = self.switch.refresh(&self.catalog) {
                    error!(error = %e, "Failed to refresh crawl switch");
                }
            }
        }

        info!("Crawl scheduler stopped");
        Ok(())
    }

    /// Runs one iteration
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickOutcome> {
        if cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        if !self.switch.is_enabled() {
            debug!("Crawling disabled");
            return Ok(TickOutcome::Disabled);
        }

        let now = self.clock.now();
        let today = self.settings.boundary.day_of(now);
        let candidate = {
            let catalog = lock(&self.catalog)?;
            if catalog.joins_on(today)? >= self.settings.daily_quota {
                return Ok(TickOutcome::BudgetExhausted);
            }
            catalog.next_crawl_candidate(self.settings.boundary.start_of_day(now))?
        };
        let Some(channel) = candidate else {
            debug!("No channel left to attempt today");
            return Ok(TickOutcome::Idle);
        };

        self.governor.wait(CallCategory::CrawlJoin, cancel).await?;

        // The day may have rolled over while we waited
        let today = self.settings.boundary.day_of(self.clock.now());
        if !lock(&self.catalog)?.increment_today_budget_if_under(today, self.settings.daily_quota)? {
            return Ok(TickOutcome::BudgetExhausted);
        }

        let call = tokio::time::timeout(self.settings.call_timeout, self.joiner.join(&channel));
        let outcome = tokio::select! {
            result = call => result.unwrap_or_else(|_| {
                JoinOutcome::TransientError("join timed out".to_string())
            }),
            _ = cancel.cancelled() => {
                lock(&self.catalog)?.release_today_budget(today)?;
                return Err(HarvestError::Cancelled);
            }
        };

        self.record_join(&channel, today, outcome)
    }

    fn record_join(
        &self,
        channel: &ChannelRecord,
        today: NaiveDate,
        outcome: JoinOutcome,
    ) -> Result<TickOutcome> {
        let attempted_at = Some(self.clock.now());
        let id = channel.canonical_id.as_str();
        let mut catalog = lock(&self.catalog)?;

        match outcome {
            JoinOutcome::Success => {
                catalog.mark_crawl_result(id, ChannelStatus::Crawling, None, attempted_at)?;
                info!(
                    canonical_id = id,
                    title = channel.title.as_deref().unwrap_or(""),
                    "Joined channel"
                );
                Ok(TickOutcome::Joined(id.to_string()))
            }
            JoinOutcome::RateLimited(advised) => {
                catalog.release_today_budget(today)?;
                drop(catalog);
                warn!(
                    canonical_id = id,
                    advised_secs = advised.as_secs_f64(),
                    "Rate limited while joining"
                );
                self.governor.on_rate_limited(advised);
                Ok(TickOutcome::RateLimited(advised))
            }
            JoinOutcome::PermanentFailure(reason) => {
                catalog.mark_crawl_result(
                    id,
                    ChannelStatus::Failed,
                    Some(&reason),
                    attempted_at,
                )?;
                warn!(canonical_id = id, reason = %reason, "Join failed permanently");
                Ok(TickOutcome::Failed(reason))
            }
            JoinOutcome::TransientError(reason) => {
                catalog.release_today_budget(today)?;
                catalog.mark_crawl_result(
                    id,
                    ChannelStatus::Verified,
                    Some(&reason),
                    attempted_at,
                )?;
                warn!(canonical_id = id, reason = %reason, "Transient error while joining");
                Ok(TickOutcome::Transient(reason))
            }
        }
    }
}
