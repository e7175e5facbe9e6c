//! Bulk import of channel references from plain text
//!
//! Scans a document (a README, a pasted channel list) line by line. Each
//! reference not yet in the catalog is stored `Discovered`, categorized from
//! the first line it appeared on, for a later re-verification pass to
//! resolve.

use crate::extract::{categorize, scan_text, CanonicalRef};
use crate::storage::{lock, CatalogStore, ChannelRecord, SharedCatalog};
use crate::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Counts for one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Distinct references found in the text
    pub found: u32,
    /// Stored (or, on a dry run, would be stored)
    pub added: u32,
    /// Already in the catalog
    pub existing: u32,
    pub bot_skipped: u32,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found={} added={} existing={} bot_skipped={}",
            self.found, self.added, self.existing, self.bot_skipped
        )
    }
}

/// Options for [`import_references`]
#[derive(Debug, Clone)]
pub struct ImportOptions<'a> {
    /// Recorded as `discovered_from`, e.g. `import:channels.md`
    pub source: &'a str,
    pub bot_pattern: &'a Regex,
    /// Count only, write nothing
    pub dry_run: bool,
    pub now: DateTime<Utc>,
}

/// Collects each distinct reference with the first line it appeared on
///
/// The result is ordered by canonical key.
pub fn collect_references(text: &str) -> BTreeMap<String, (CanonicalRef, &str)> {
    let mut found = BTreeMap::new();
    for line in text.lines() {
        for reference in scan_text(line) {
            found
                .entry(reference.key())
                .or_insert_with(|| (reference, line.trim()));
        }
    }
    found
}

/// Stores every new reference in `text` as a `Discovered` row
pub fn import_references(
    catalog: &SharedCatalog,
    text: &str,
    options: &ImportOptions<'_>,
) -> Result<ImportReport> {
    let references = collect_references(text);
    let mut report = ImportReport {
        found: references.len() as u32,
        ..ImportReport::default()
    };

    let mut catalog = lock(catalog)?;
    for (key, (reference, context)) in references {
        if reference
            .handle()
            .is_some_and(|handle| options.bot_pattern.is_match(handle))
        {
            report.bot_skipped += 1;
            continue;
        }

        let known = match catalog.find_by_canonical_id(&key)? {
            Some(record) => Some(record),
            None => match reference.handle() {
                Some(handle) => catalog.find_by_handle(handle)?,
                None => None,
            },
        };
        if known.is_some() {
            debug!(reference = %reference, "Already in catalog, skipping");
            report.existing += 1;
            continue;
        }

        let category = categorize(context, None);
        report.added += 1;
        if options.dry_run {
            info!(reference = %reference, %category, "Would import");
            continue;
        }

        let mut record = ChannelRecord::discovered(&reference, options.now);
        record.category = Some(category);
        record.discovered_from = Some(options.source.to_string());
        catalog.upsert(&record)?;
        info!(reference = %reference, %category, "Imported");
    }

    Ok(report)
}
