//! Integration tests for the harvest pipeline
//!
//! Scripted fake platforms drive the verifier and the crawl loop end-to-end
//! against a real SQLite catalog; wiremock stands in for the preview site.

mod common;
mod pipeline_tests;
mod preview_tests;
mod scheduler_tests;
mod storage_failure_tests;
