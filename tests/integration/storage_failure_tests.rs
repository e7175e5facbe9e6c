//! Catalog outages while the pipeline is running
//!
//! A second connection renames a table out from under the catalog, then puts
//! it back.

use crate::common::{broadcast, fixed_governor, verifier, ScriptedJoiner, TableResolver};
use channel_harvest::crawler::{CrawlScheduler, SchedulerSettings};
use channel_harvest::extract::Message;
use channel_harvest::pacing::{DayBoundary, ManualClock};
use channel_harvest::pipeline::CrawlSwitch;
use channel_harvest::state::ChannelStatus;
use channel_harvest::storage::{lock, shared, CatalogStore, SharedCatalog, SqliteCatalog};
use channel_harvest::HarvestError;
use chrono::Utc;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct FileCatalog {
    _dir: TempDir,
    path: PathBuf,
    catalog: SharedCatalog,
}

fn file_catalog() -> FileCatalog {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.db");
    let catalog = shared(SqliteCatalog::open(&path).unwrap());
    FileCatalog {
        _dir: dir,
        path,
        catalog,
    }
}

fn rename_table(path: &Path, from: &str, to: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!("ALTER TABLE {} RENAME TO {}", from, to))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_abandons_message_without_damage() {
    let db = file_catalog();
    let resolver = Arc::new(TableResolver::new(vec![
        ("tech_news", broadcast("科技资讯", 12500, None, "tech_news")),
        ("rust_zh", broadcast("Rust 中文", 800, None, "rust_zh")),
    ]));
    let verifier = verifier(&db.catalog, resolver.clone(), fixed_governor(3.0, 10.0));
    let cancel = CancellationToken::new();

    verifier
        .process_message(&Message::new("m1", "@tech_news"), &cancel)
        .await
        .unwrap();

    rename_table(&db.path, "channels", "channels_offline");
    let result = verifier
        .process_message(&Message::new("m2", "@rust_zh"), &cancel)
        .await;
    assert!(matches!(result, Err(HarvestError::Storage(_))));
    assert_eq!(resolver.calls(), vec!["tech_news"]);

    rename_table(&db.path, "channels_offline", "channels");
    {
        let catalog = lock(&db.catalog).unwrap();
        let kept = catalog.find_by_handle("tech_news").unwrap().unwrap();
        assert_eq!(kept.status, ChannelStatus::Verified);
        assert!(catalog.find_by_handle("rust_zh").unwrap().is_none());
    }

    // Redelivery once storage is back goes through normally
    let report = verifier
        .process_message(&Message::new("m2", "@rust_zh"), &cancel)
        .await
        .unwrap();
    assert_eq!(report.new, 1);
}

#[tokio::test(start_paused = true)]
async fn test_crawl_loop_survives_storage_outage() {
    let db = file_catalog();
    let resolver = Arc::new(TableResolver::new(vec![(
        "chan_aaa",
        broadcast("chan_aaa", 1000, None, "chan_aaa"),
    )]));
    verifier(&db.catalog, resolver, fixed_governor(0.0, 0.0))
        .process_message(&Message::new("m1", "@chan_aaa"), &CancellationToken::new())
        .await
        .unwrap();

    let now = Utc::now();
    let switch = CrawlSwitch::load(&db.catalog).unwrap();
    switch.set_enabled(&db.catalog, true).unwrap();
    let joiner = Arc::new(ScriptedJoiner::default());
    let settings = SchedulerSettings {
        daily_quota: 5,
        boundary: DayBoundary::utc(),
        idle_interval: Duration::from_secs(60),
        call_timeout: Duration::from_secs(30),
    };
    let scheduler = CrawlScheduler::new(
        db.catalog.clone(),
        joiner.clone(),
        fixed_governor(3.0, 10.0),
        switch,
        settings,
    )
    .with_clock(Arc::new(ManualClock::new(now)));

    rename_table(&db.path, "crawl_budget", "crawl_budget_offline");

    let cancel = CancellationToken::new();
    let run = {
        let token = cancel.clone();
        tokio::spawn(async move { scheduler.run(token).await })
    };

    // First iteration fails on the budget table; the loop is still alive
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!run.is_finished());
    assert!(joiner.calls().is_empty());

    // Next iteration after the idle interval joins
    rename_table(&db.path, "crawl_budget_offline", "crawl_budget");
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(joiner.calls(), vec!["chan_aaa"]);

    cancel.cancel();
    assert!(run.await.unwrap().is_ok());

    let catalog = lock(&db.catalog).unwrap();
    let row = catalog.find_by_canonical_id("chan_aaa").unwrap().unwrap();
    assert_eq!(row.status, ChannelStatus::Crawling);
    assert_eq!(catalog.joins_on(DayBoundary::utc().day_of(now)).unwrap(), 1);
}
