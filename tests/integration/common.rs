use async_trait::async_trait;
use channel_harvest::extract::CanonicalRef;
use channel_harvest::pacing::{DelayConfig, DelayGovernor, FixedJitter};
use channel_harvest::pipeline::{Verifier, VerifierSettings};
use channel_harvest::platform::{
    ChannelJoiner, ChannelResolver, JoinOutcome, ResolveOutcome, ResolvedChannel,
};
use channel_harvest::state::ChannelKind;
use channel_harvest::storage::{shared, ChannelRecord, SharedCatalog, SqliteCatalog};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Answers resolves from a fixed table and records every call
#[derive(Default)]
pub struct TableResolver {
    answers: HashMap<String, ResolveOutcome>,
    calls: Mutex<Vec<String>>,
    call_times: Mutex<Vec<Instant>>,
}

impl TableResolver {
    pub fn new(answers: Vec<(&str, ResolveOutcome)>) -> Self {
        Self {
            answers: answers
                .into_iter()
                .map(|(key, outcome)| (key.to_string(), outcome))
                .collect(),
            calls: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// When each resolve started, in call order
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelResolver for TableResolver {
    async fn resolve(&self, reference: &CanonicalRef) -> ResolveOutcome {
        self.calls.lock().unwrap().push(reference.key());
        self.call_times.lock().unwrap().push(Instant::now());
        // Give other tasks a chance to race on the same reference
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.answers
            .get(&reference.key())
            .cloned()
            .unwrap_or(ResolveOutcome::NotFound)
    }
}

/// Plays back queued join outcomes, then succeeds
#[derive(Default)]
pub struct ScriptedJoiner {
    script: Mutex<VecDeque<JoinOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedJoiner {
    pub fn with(outcomes: Vec<JoinOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelJoiner for ScriptedJoiner {
    async fn join(&self, channel: &ChannelRecord) -> JoinOutcome {
        self.calls.lock().unwrap().push(channel.canonical_id.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JoinOutcome::Success)
    }
}

pub fn broadcast(title: &str, members: i64, id: Option<i64>, handle: &str) -> ResolveOutcome {
    ResolveOutcome::Success(ResolvedChannel {
        kind: ChannelKind::Broadcast,
        title: Some(title.to_string()),
        member_count: Some(members),
        platform_id: id,
        handle: Some(handle.to_string()),
    })
}

pub fn memory_catalog() -> SharedCatalog {
    shared(SqliteCatalog::open_in_memory().unwrap())
}

/// Governor with fixed delays and no randomness
pub fn fixed_governor(verification_secs: f64, crawl_secs: f64) -> Arc<DelayGovernor> {
    Arc::new(DelayGovernor::with_jitter(
        DelayConfig::from_secs(verification_secs, 0.0),
        DelayConfig::from_secs(crawl_secs, 0.0),
        Arc::new(FixedJitter(0.0)),
    ))
}

pub fn verifier(
    catalog: &SharedCatalog,
    resolver: Arc<TableResolver>,
    governor: Arc<DelayGovernor>,
) -> Verifier {
    let settings = VerifierSettings::new("(?i)bot$", Duration::from_secs(20)).unwrap();
    Verifier::new(catalog.clone(), resolver, governor, settings)
}
