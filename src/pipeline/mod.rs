//! Message intake: extraction, verification, bulk import and the crawl switch

mod import;
mod locks;
mod switch;
mod verifier;

pub use import::{collect_references, import_references, ImportOptions, ImportReport};
pub use locks::{KeyGuard, KeyedLocks};
pub use switch::{CrawlSwitch, CRAWLER_ENABLED_KEY};
pub use verifier::{Provenance, Verifier, VerifierSettings, VerifyOutcome};
