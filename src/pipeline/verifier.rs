//! Channel verification
//!
//! For each extracted reference, in order:
//!
//! 1. Handles matching the automation-account pattern are dropped (counted,
//!    never stored, never resolved).
//! 2. The reference's key lock is taken, so one reference has at most one
//!    verification in flight.
//! 3. A reference already in the catalog (by canonical id, or by handle
//!    ignoring case) is a duplicate, whatever its status.
//! 4. The governor paces the call, then the resolver runs under a timeout.
//! 5. The answer is classified: not found and wrong kind are stored
//!    `Rejected`, success is stored `Verified`, rate limits and transient
//!    errors store nothing and are left for redelivery. A success whose
//!    platform id is held by a `Discovered` or `Rejected` row promotes that
//!    row instead of adding one.

use super::locks::KeyedLocks;
use crate::extract::{categorize, extract_references, CanonicalRef, Category, Message};
use crate::pacing::{CallCategory, Clock, DelayGovernor, SystemClock};
use crate::platform::{ChannelResolver, ResolveOutcome, ResolvedChannel};
use crate::report::BatchReport;
use crate::state::ChannelStatus;
use crate::storage::{lock, CatalogStore, ChannelRecord, ListOrder, SharedCatalog};
use crate::{ConfigError, ConfigResult, HarvestError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of verifying one reference
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// Stored as a new verified channel
    Verified,
    /// Already known, or repeated within the batch
    Duplicate,
    BotSkipped,
    /// Stored as rejected (not found, or not a channel/group)
    Rejected,
    RateLimited(Duration),
    Transient(String),
}

/// Tunables for the verifier
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub bot_pattern: Regex,
    pub call_timeout: Duration,
}

impl VerifierSettings {
    pub fn new(bot_pattern: &str, call_timeout: Duration) -> ConfigResult<Self> {
        let bot_pattern = Regex::new(bot_pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("bot-pattern: {}", e)))?;
        Ok(Self {
            bot_pattern,
            call_timeout,
        })
    }
}

/// Where a reference was seen
#[derive(Debug, Clone, Copy, Default)]
pub struct Provenance<'a> {
    pub message_id: Option<&'a str>,
    /// Text used for categorization
    pub text: &'a str,
}

/// Verifies extracted references against the platform and the catalog
pub struct Verifier {
    catalog: SharedCatalog,
    resolver: Arc<dyn ChannelResolver>,
    governor: Arc<DelayGovernor>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    settings: VerifierSettings,
    bot_skips: AtomicU64,
}

impl Verifier {
    pub fn new(
        catalog: SharedCatalog,
        resolver: Arc<dyn ChannelResolver>,
        governor: Arc<DelayGovernor>,
        settings: VerifierSettings,
    ) -> Self {
        Self {
            catalog,
            resolver,
            governor,
            clock: Arc::new(SystemClock),
            locks: KeyedLocks::new(),
            settings,
            bot_skips: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Total references dropped by the automation-account filter
    pub fn bot_skips(&self) -> u64 {
        self.bot_skips.load(Ordering::Relaxed)
    }

    /// Extracts and verifies every reference in a message
    ///
    /// # Returns
    ///
    /// * `Ok(BatchReport)` - Per-outcome counts for the message
    /// * `Err(HarvestError::Cancelled)` - Stop was requested
    /// * `Err(HarvestError::Storage)` - A catalog write failed; the rest of
    ///   the message is abandoned
    pub async fn process_message(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let references = extract_references(message);
        if references.is_empty() {
            return Ok(BatchReport::default());
        }

        let provenance = Provenance {
            message_id: (!message.id.is_empty()).then_some(message.id.as_str()),
            text: &message.text,
        };
        let report = self.verify_batch(&references, provenance, cancel).await?;

        info!(
            message_id = %message.id,
            references = references.len(),
            %report,
            "Processed message"
        );
        Ok(report)
    }

    /// Verifies a batch of references
    ///
    /// A reference repeated within the batch only costs one resolve; later
    /// occurrences count as duplicates.
    pub async fn verify_batch(
        &self,
        references: &[CanonicalRef],
        provenance: Provenance<'_>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut seen: HashMap<String, VerifyOutcome> = HashMap::new();

        for reference in references {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }

            let key = reference.key();
            if let Some(first) = seen.get(&key) {
                debug!(reference = %reference, first = ?first, "Repeated within batch");
                report.record(&VerifyOutcome::Duplicate);
                continue;
            }

            let outcome = self.verify(reference, provenance, cancel).await?;
            report.record(&outcome);
            seen.insert(key, outcome);
        }

        Ok(report)
    }

    /// Verifies one reference
    pub async fn verify(
        &self,
        reference: &CanonicalRef,
        provenance: Provenance<'_>,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome> {
        if let Some(handle) = reference.handle() {
            if self.settings.bot_pattern.is_match(handle) {
                self.bot_skips.fetch_add(1, Ordering::Relaxed);
                debug!(reference = %reference, "Skipping automation account");
                return Ok(VerifyOutcome::BotSkipped);
            }
        }

        let key = reference.key();
        let _guard = tokio::select! {
            guard = self.locks.acquire(&key) => guard,
            _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
        };

        if self.find_known(reference)?.is_some() {
            debug!(reference = %reference, "Already in catalog");
            return Ok(VerifyOutcome::Duplicate);
        }

        self.governor
            .wait(CallCategory::Verification, cancel)
            .await?;
        self.resolve_and_record(reference, None, provenance, cancel)
            .await
    }

    /// Re-resolves every `Discovered` row (rows reset from `Failed`)
    pub async fn reverify_discovered(&self, cancel: &CancellationToken) -> Result<BatchReport> {
        let rows = lock(&self.catalog)?.list_by_status(
            ChannelStatus::Discovered,
            ListOrder::OldestDiscovered,
            None,
        )?;

        let mut report = BatchReport::default();
        for row in rows {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }

            let Some(reference) = row.reference() else {
                warn!(canonical_id = %row.canonical_id, "Row has no resolvable reference");
                continue;
            };

            let key = reference.key();
            let _guard = tokio::select! {
                guard = self.locks.acquire(&key) => guard,
                _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
            };

            // Another task may have moved it while we waited
            let current = lock(&self.catalog)?.find_by_canonical_id(&row.canonical_id)?;
            let Some(current) = current.filter(|r| r.status == ChannelStatus::Discovered) else {
                continue;
            };

            self.governor
                .wait(CallCategory::Verification, cancel)
                .await?;
            let provenance = Provenance {
                message_id: current.discovered_from.as_deref(),
                text: "",
            };
            let outcome = self
                .resolve_and_record(&reference, Some(&current), provenance, cancel)
                .await?;
            report.record(&outcome);
        }

        info!(%report, "Re-verified discovered channels");
        Ok(report)
    }

    fn find_known(&self, reference: &CanonicalRef) -> Result<Option<ChannelRecord>> {
        let catalog = lock(&self.catalog)?;
        if let Some(record) = catalog.find_by_canonical_id(&reference.key())? {
            return Ok(Some(record));
        }
        if let Some(handle) = reference.handle() {
            return Ok(catalog.find_by_handle(handle)?);
        }
        Ok(None)
    }

    async fn resolve_and_record(
        &self,
        reference: &CanonicalRef,
        existing: Option<&ChannelRecord>,
        provenance: Provenance<'_>,
        cancel: &CancellationToken,
    ) -> Result<VerifyOutcome> {
        let call = tokio::time::timeout(self.settings.call_timeout, self.resolver.resolve(reference));
        let outcome = tokio::select! {
            result = call => result.unwrap_or_else(|_| {
                ResolveOutcome::TransientError("resolve timed out".to_string())
            }),
            _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
        };

        match outcome {
            ResolveOutcome::Success(resolved) if resolved.kind.is_crawlable() => {
                self.record_verified(reference, existing, resolved, provenance)
            }
            ResolveOutcome::Success(_) | ResolveOutcome::TypeMismatch => {
                self.record_rejected(reference, existing, provenance, "not a channel or group")
            }
            ResolveOutcome::NotFound => {
                self.record_rejected(reference, existing, provenance, "not found")
            }
            ResolveOutcome::RateLimited(advised) => {
                warn!(
                    reference = %reference,
                    advised_secs = advised.as_secs_f64(),
                    "Rate limited while resolving"
                );
                self.governor.on_rate_limited(advised);
                Ok(VerifyOutcome::RateLimited(advised))
            }
            ResolveOutcome::TransientError(reason) => {
                warn!(reference = %reference, reason = %reason, "Transient error while resolving");
                Ok(VerifyOutcome::Transient(reason))
            }
        }
    }

    fn base_record(
        &self,
        reference: &CanonicalRef,
        existing: Option<&ChannelRecord>,
        provenance: Provenance<'_>,
    ) -> ChannelRecord {
        match existing {
            Some(record) => record.clone(),
            None => {
                let mut record = ChannelRecord::discovered(reference, self.clock.now());
                record.discovered_from = provenance.message_id.map(str::to_string);
                record
            }
        }
    }

    fn record_rejected(
        &self,
        reference: &CanonicalRef,
        existing: Option<&ChannelRecord>,
        provenance: Provenance<'_>,
        reason: &str,
    ) -> Result<VerifyOutcome> {
        let record = self
            .base_record(reference, existing, provenance)
            .with_status(ChannelStatus::Rejected)
            .with_notes(reason);

        lock(&self.catalog)?.upsert(&record)?;
        info!(reference = %reference, reason, "Rejected channel");
        Ok(VerifyOutcome::Rejected)
    }

    fn record_verified(
        &self,
        reference: &CanonicalRef,
        existing: Option<&ChannelRecord>,
        resolved: ResolvedChannel,
        provenance: Provenance<'_>,
    ) -> Result<VerifyOutcome> {
        let mut record = self
            .base_record(reference, existing, provenance)
            .with_status(ChannelStatus::Verified);

        if let Some(id) = resolved.platform_id {
            record.canonical_id = CanonicalRef::PrivateId(id).key();
        }
        if let Some(handle) = resolved.handle.as_deref() {
            record.handle = Some(handle.to_ascii_lowercase());
        }
        record.kind = resolved.kind;
        // An imported row keeps its category unless the title says more
        let category = categorize(provenance.text, resolved.title.as_deref());
        if category != Category::Other || record.category.is_none() {
            record.category = Some(category);
        }
        record.title = resolved.title;
        record.member_count = resolved.member_count;
        record.notes = None;
        record.last_verified_at = Some(self.clock.now());

        let mut catalog = lock(&self.catalog)?;

        // A private link and a handle can name the same channel
        let same_row = existing.is_some_and(|e| e.canonical_id == record.canonical_id);
        if !same_row
            && record.canonical_id != reference.key()
            && catalog.find_by_canonical_id(&record.canonical_id)?.is_some()
        {
            if existing.is_none() && catalog.promote_to_verified(&record)? {
                info!(
                    reference = %reference,
                    canonical_id = %record.canonical_id,
                    "Verified a channel previously seen only by id"
                );
                return Ok(VerifyOutcome::Verified);
            }
            debug!(reference = %reference, canonical_id = %record.canonical_id, "Resolved to a known channel");
            return Ok(VerifyOutcome::Duplicate);
        }

        catalog.upsert(&record)?;
        info!(
            reference = %reference,
            canonical_id = %record.canonical_id,
            kind = %record.kind,
            members = ?record.member_count,
            "Verified channel"
        );
        Ok(VerifyOutcome::Verified)
    }
}
