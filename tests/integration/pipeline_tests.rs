//! Verification scenarios against a real catalog

use crate::common::{broadcast, fixed_governor, memory_catalog, verifier, TableResolver};
use channel_harvest::extract::{FormattingSpan, Message, SpanKind};
use channel_harvest::pacing::CallCategory;
use channel_harvest::platform::ResolveOutcome;
use channel_harvest::state::{ChannelKind, ChannelStatus};
use channel_harvest::storage::{lock, CatalogStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn row_count(catalog: &channel_harvest::storage::SharedCatalog) -> u64 {
    lock(catalog)
        .unwrap()
        .count_by_status()
        .unwrap()
        .values()
        .sum()
}

#[tokio::test(start_paused = true)]
async fn test_known_handle_is_verified_once() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![(
        "tech_news",
        broadcast("科技资讯", 12500, Some(100100), "tech_news"),
    )]));
    let verifier = verifier(&catalog, resolver.clone(), fixed_governor(3.0, 10.0));
    let cancel = CancellationToken::new();

    let first = Message::new("m1", "好频道推荐 @tech_news");
    let report = verifier.process_message(&first, &cancel).await.unwrap();
    assert_eq!(report.new, 1);

    let row = lock(&catalog)
        .unwrap()
        .find_by_handle("tech_news")
        .unwrap()
        .expect("verified row");
    assert_eq!(row.canonical_id, "id:100100");
    assert_eq!(row.status, ChannelStatus::Verified);
    assert_eq!(row.kind, ChannelKind::Broadcast);
    assert_eq!(row.title.as_deref(), Some("科技资讯"));
    assert_eq!(row.member_count, Some(12500));
    assert_eq!(row.discovered_from.as_deref(), Some("m1"));
    assert!(row.last_verified_at.is_some());

    // Same handle again: no new row, no resolve
    let second = Message::new("m2", "再推一次 @Tech_News");
    let report = verifier.process_message(&second, &cancel).await.unwrap();
    assert_eq!(report.new, 0);
    assert_eq!(report.duplicate, 1);
    assert_eq!(resolver.calls().len(), 1);
    assert_eq!(row_count(&catalog), 1);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_rejected_without_metadata() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![(
        "ghost_channel",
        ResolveOutcome::NotFound,
    )]));
    let verifier = verifier(&catalog, resolver, fixed_governor(3.0, 10.0));

    let message = Message::new("m1", "t.me/ghost_channel");
    let report = verifier
        .process_message(&message, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.rejected, 1);

    let row = lock(&catalog)
        .unwrap()
        .find_by_canonical_id("ghost_channel")
        .unwrap()
        .expect("rejected row");
    assert_eq!(row.status, ChannelStatus::Rejected);
    assert_eq!(row.member_count, None);

    // Rejected references are never resolved again
    let again = verifier
        .process_message(&message, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.duplicate, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_persists_nothing_and_slows_crawl() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![(
        "busy_channel",
        ResolveOutcome::RateLimited(Duration::from_secs_f64(48.0)),
    )]));
    let governor = fixed_governor(3.0, 10.0);
    let verifier = verifier(&catalog, resolver, governor.clone());

    let message = Message::new("m1", "@busy_channel");
    let report = verifier
        .process_message(&message, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rate_limited, 1);
    assert_eq!(row_count(&catalog), 0);
    assert!(governor.next_delay(CallCategory::CrawlJoin) >= Duration::from_secs(48));
}

#[tokio::test(start_paused = true)]
async fn test_text_link_follows_target_not_label() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![(
        "tech_news",
        broadcast("科技资讯", 12500, None, "tech_news"),
    )]));
    let verifier = verifier(&catalog, resolver.clone(), fixed_governor(3.0, 10.0));

    let message = Message::new("m1", "click here for more").with_span(FormattingSpan {
        offset: 0,
        length: 10,
        kind: SpanKind::TextLink,
        url: Some("https://t.me/tech_news".to_string()),
    });
    let report = verifier
        .process_message(&message, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.new, 1);
    assert_eq!(resolver.calls(), vec!["tech_news".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_bot_handles_never_reach_catalog() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![]));
    let verifier = verifier(&catalog, resolver.clone(), fixed_governor(3.0, 10.0));

    let message = Message::new("m1", "用 @search_bot 或 t.me/SaveRobot 搜索");
    let report = verifier
        .process_message(&message, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.bot_skipped, 2);
    assert!(resolver.calls().is_empty());
    assert_eq!(row_count(&catalog), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_messages_resolve_shared_reference_once() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![(
        "tech_news",
        broadcast("科技资讯", 12500, Some(100100), "tech_news"),
    )]));
    let verifier = Arc::new(verifier(&catalog, resolver.clone(), fixed_governor(3.0, 10.0)));
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for i in 0..5 {
        let verifier = verifier.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let message = Message::new(format!("m{}", i), "@tech_news");
            verifier.process_message(&message, &cancel).await.unwrap()
        }));
    }

    let mut new = 0;
    let mut duplicate = 0;
    for handle in handles {
        let report = handle.await.unwrap();
        new += report.new;
        duplicate += report.duplicate;
    }

    assert_eq!(new, 1);
    assert_eq!(duplicate, 4);
    assert_eq!(resolver.calls().len(), 1);
    assert_eq!(row_count(&catalog), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_messages_are_paced_and_honor_advisory() {
    let catalog = memory_catalog();
    let advisory = ResolveOutcome::RateLimited(Duration::from_secs(60));
    let handles: Vec<String> = (0..6).map(|i| format!("chan_{}", i)).collect();
    let resolver = Arc::new(TableResolver::new(
        handles.iter().map(|h| (h.as_str(), advisory.clone())).collect(),
    ));
    let verifier = Arc::new(verifier(&catalog, resolver.clone(), fixed_governor(3.0, 10.0)));
    let cancel = CancellationToken::new();
    let start = tokio::time::Instant::now();

    let mut tasks = Vec::new();
    for (i, handle) in handles.iter().enumerate() {
        let verifier = verifier.clone();
        let cancel = cancel.clone();
        let message = Message::new(format!("m{}", i), format!("@{}", handle));
        tasks.push(tokio::spawn(async move {
            verifier.process_message(&message, &cancel).await.unwrap()
        }));
    }
    let mut rate_limited = 0;
    for task in tasks {
        rate_limited += task.await.unwrap().rate_limited;
    }

    // Every answer is a 60s advisory, each one holds the next caller
    assert_eq!(rate_limited, 6);
    assert_eq!(resolver.calls().len(), 6);
    assert_eq!(row_count(&catalog), 0);

    let offsets: Vec<Duration> = resolver
        .call_times()
        .into_iter()
        .map(|at| at - start)
        .collect();
    assert_eq!(offsets[0], Duration::from_secs(3));
    for pair in offsets.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(60));
    }
}

#[tokio::test(start_paused = true)]
async fn test_ingested_json_message() {
    let catalog = memory_catalog();
    let resolver = Arc::new(TableResolver::new(vec![
        ("tech_news", broadcast("科技资讯", 12500, None, "tech_news")),
        ("rust_zh", broadcast("Rust 中文", 800, None, "rust_zh")),
    ]));
    let verifier = verifier(&catalog, resolver.clone(), fixed_governor(3.0, 10.0));

    let raw = r#"{"id":"42","text":"看这里 @tech_news","spans":[{"offset":0,"length":3,"kind":"text_link","url":"tg://resolve?domain=rust_zh"},{"offset":0,"length":1,"kind":"bold"}]}"#;
    let message: Message = serde_json::from_str(raw).unwrap();
    let report = verifier
        .process_message(&message, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.new, 2);
    // The link span sits at offset 0, ahead of the handle in the body
    assert_eq!(resolver.calls(), vec!["rust_zh", "tech_news"]);
}
