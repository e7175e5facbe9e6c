//! Crawl loop scenarios fed by the verifier

use crate::common::{
    broadcast, fixed_governor, memory_catalog, verifier, ScriptedJoiner, TableResolver,
};
use channel_harvest::crawler::{CrawlScheduler, SchedulerSettings, TickOutcome};
use channel_harvest::extract::Message;
use channel_harvest::pacing::{DayBoundary, ManualClock};
use channel_harvest::pipeline::CrawlSwitch;
use channel_harvest::platform::JoinOutcome;
use channel_harvest::state::ChannelStatus;
use channel_harvest::storage::{lock, CatalogStore, SharedCatalog};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn scheduler(
    catalog: &SharedCatalog,
    joiner: Arc<ScriptedJoiner>,
    clock: Arc<ManualClock>,
    quota: u32,
) -> CrawlScheduler {
    let switch = CrawlSwitch::load(catalog).unwrap();
    let settings = SchedulerSettings {
        daily_quota: quota,
        boundary: DayBoundary::new(8 * 60).unwrap(),
        idle_interval: Duration::from_secs(60),
        call_timeout: Duration::from_secs(30),
    };
    CrawlScheduler::new(
        catalog.clone(),
        joiner,
        fixed_governor(3.0, 10.0),
        switch,
        settings,
    )
    .with_clock(clock)
}

async fn seed(catalog: &SharedCatalog, handles: &[&str]) {
    let answers = handles
        .iter()
        .map(|h| (*h, broadcast(h, 1000, None, h)))
        .collect();
    let resolver = Arc::new(TableResolver::new(answers));
    let verifier = verifier(catalog, resolver, fixed_governor(0.0, 0.0));
    for (i, handle) in handles.iter().enumerate() {
        let message = Message::new(format!("m{}", i), format!("@{}", handle));
        verifier
            .process_message(&message, &CancellationToken::new())
            .await
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_switch_gates_the_loop() {
    let catalog = memory_catalog();
    seed(&catalog, &["chan_aaa"]).await;

    let joiner = Arc::new(ScriptedJoiner::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let scheduler = scheduler(&catalog, joiner.clone(), clock, 5);
    let cancel = CancellationToken::new();

    assert_eq!(scheduler.tick(&cancel).await.unwrap(), TickOutcome::Disabled);
    assert!(joiner.calls().is_empty());

    // Toggled through another handle on the same catalog
    let operator = CrawlSwitch::load(&catalog).unwrap();
    operator.set_enabled(&catalog, true).unwrap();

    let run = {
        let token = cancel.clone();
        async move { scheduler.run(token).await }
    };
    let stop = async {
        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
    };
    let (result, _) = tokio::join!(run, stop);
    result.unwrap();

    assert_eq!(joiner.calls(), vec!["chan_aaa"]);
    let row = lock(&catalog)
        .unwrap()
        .find_by_canonical_id("chan_aaa")
        .unwrap()
        .unwrap();
    assert_eq!(row.status, ChannelStatus::Crawling);
}

#[tokio::test(start_paused = true)]
async fn test_daily_quota_with_offset_day_boundary() {
    let catalog = memory_catalog();
    seed(&catalog, &["chan_aaa", "chan_bbb", "chan_ccc"]).await;
    CrawlSwitch::load(&catalog)
        .unwrap()
        .set_enabled(&catalog, true)
        .unwrap();

    // 15:00 UTC is 23:00 in UTC+8
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
    ));
    let joiner = Arc::new(ScriptedJoiner::with(vec![JoinOutcome::PermanentFailure(
        "banned".to_string(),
    )]));
    let scheduler = scheduler(&catalog, joiner.clone(), clock.clone(), 2);
    let cancel = CancellationToken::new();

    assert_eq!(
        scheduler.tick(&cancel).await.unwrap(),
        TickOutcome::Failed("banned".to_string())
    );
    assert!(matches!(scheduler.tick(&cancel).await.unwrap(), TickOutcome::Joined(_)));
    assert_eq!(
        scheduler.tick(&cancel).await.unwrap(),
        TickOutcome::BudgetExhausted
    );
    assert_eq!(scheduler.status().unwrap().remaining, 0);

    // 16:30 UTC is past midnight in UTC+8
    clock.advance(ChronoDuration::minutes(90));
    assert_eq!(scheduler.status().unwrap().remaining, 2);
    assert_eq!(
        scheduler.tick(&cancel).await.unwrap(),
        TickOutcome::Joined("chan_ccc".to_string())
    );

    let counts = lock(&catalog).unwrap().count_by_status().unwrap();
    assert_eq!(counts[&ChannelStatus::Failed], 1);
    assert_eq!(counts[&ChannelStatus::Crawling], 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_channel_returns_through_reset_and_reverify() {
    let catalog = memory_catalog();
    seed(&catalog, &["chan_aaa"]).await;
    CrawlSwitch::load(&catalog)
        .unwrap()
        .set_enabled(&catalog, true)
        .unwrap();

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let joiner = Arc::new(ScriptedJoiner::with(vec![JoinOutcome::PermanentFailure(
        "no public message stream".to_string(),
    )]));
    let scheduler = scheduler(&catalog, joiner.clone(), clock.clone(), 10);
    let cancel = CancellationToken::new();

    scheduler.tick(&cancel).await.unwrap();
    // Failed channels are not retried on their own
    clock.advance(ChronoDuration::days(1));
    assert_eq!(scheduler.tick(&cancel).await.unwrap(), TickOutcome::Idle);

    lock(&catalog).unwrap().reset_failed("chan_aaa").unwrap();
    let resolver = Arc::new(TableResolver::new(vec![(
        "chan_aaa",
        broadcast("chan_aaa", 1000, None, "chan_aaa"),
    )]));
    let verifier = verifier(&catalog, resolver.clone(), fixed_governor(0.0, 0.0));
    let report = verifier.reverify_discovered(&cancel).await.unwrap();
    assert_eq!(report.new, 1);
    assert_eq!(resolver.calls().len(), 1);

    // Attempted yesterday, so eligible again today
    assert!(matches!(scheduler.tick(&cancel).await.unwrap(), TickOutcome::Joined(_)));
    assert_eq!(joiner.calls().len(), 2);
}
