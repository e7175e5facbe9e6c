//! Crawl on/off switch
//!
//! The flag lives in the catalog's config table under
//! [`CRAWLER_ENABLED_KEY`]; readers see an atomic snapshot that is swapped
//! after every successful write and on every [`CrawlSwitch::refresh`].

use crate::storage::{lock, CatalogStore, SharedCatalog, StorageResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Config key holding `"true"` or `"false"`
pub const CRAWLER_ENABLED_KEY: &str = "crawler_enabled";

#[derive(Debug, Clone)]
pub struct CrawlSwitch {
    enabled: Arc<AtomicBool>,
}

impl CrawlSwitch {
    /// Loads the flag from the catalog; a missing key means disabled
    pub fn load(catalog: &SharedCatalog) -> StorageResult<Self> {
        let switch = Self {
            enabled: Arc::new(AtomicBool::new(false)),
        };
        switch.refresh(catalog)?;
        Ok(switch)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Persists the flag, then publishes it to readers
    pub fn set_enabled(&self, catalog: &SharedCatalog, enabled: bool) -> StorageResult<()> {
        let value = if enabled { "true" } else { "false" };
        lock(catalog)?.set_config(CRAWLER_ENABLED_KEY, value)?;
        self.enabled.store(enabled, Ordering::Release);
        tracing::info!(enabled, "Crawler switch set");
        Ok(())
    }

    /// Re-reads the flag so out-of-process toggles take effect
    pub fn refresh(&self, catalog: &SharedCatalog) -> StorageResult<bool> {
        let value = lock(catalog)?.get_config(CRAWLER_ENABLED_KEY)?;
        let enabled = value
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        self.enabled.store(enabled, Ordering::Release);
        Ok(enabled)
    }
}
