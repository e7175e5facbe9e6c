//! Channel-Harvest main entry point
//!
//! This is the command-line interface for the channel discovery and crawl
//! pipeline.

use anyhow::{anyhow, Context};
use channel_harvest::config::{load_config_with_hash, Config};
use channel_harvest::crawler::{CrawlScheduler, SchedulerSettings};
use channel_harvest::extract::Message;
use channel_harvest::pacing::{DayBoundary, DelayGovernor};
use channel_harvest::pipeline::{
    import_references, CrawlSwitch, ImportOptions, Verifier, VerifierSettings,
};
use channel_harvest::platform::PreviewClient;
use channel_harvest::report::{crawl_status, load_catalog_stats, print_statistics, BatchReport};
use channel_harvest::storage::{lock, shared, CatalogStore, SharedCatalog, SqliteCatalog};
use channel_harvest::HarvestError;
use chrono::Utc;
use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Channel-Harvest: paced channel discovery and crawling
///
/// Reads forwarded messages, extracts channel references, verifies them
/// against the platform and joins verified channels under a daily quota.
#[derive(Parser, Debug)]
#[command(name = "channel-harvest")]
#[command(version)]
#[command(about = "Paced channel discovery and crawl pipeline", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .args([
            "init_db",
            "stats",
            "crawler_on",
            "crawler_off",
            "reset_failed",
            "ingest",
            "import",
            "reverify",
        ])
        .multiple(false)
))]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Create the catalog database and exit
    #[arg(long)]
    init_db: bool,

    /// Show catalog statistics and crawl status, then exit
    #[arg(long)]
    stats: bool,

    /// Enable the crawl loop
    #[arg(long)]
    crawler_on: bool,

    /// Pause the crawl loop
    #[arg(long)]
    crawler_off: bool,

    /// Move a failed channel back to discovered
    #[arg(long, value_name = "CANONICAL_ID")]
    reset_failed: Option<String>,

    /// Process messages from a JSON-lines file and exit
    #[arg(long, value_name = "FILE")]
    ingest: Option<PathBuf>,

    /// Import channel links and @handles from a text file as discovered
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// With --import, report what would be added without writing
    #[arg(long, requires = "import")]
    dry_run: bool,

    /// Re-verify every discovered channel and exit
    #[arg(long)]
    reverify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let catalog = open_catalog(&config)?;

    if cli.init_db {
        println!("✓ Catalog ready at {}", config.storage.database_path);
    } else if cli.stats {
        handle_stats(&config, &catalog)?;
    } else if cli.crawler_on || cli.crawler_off {
        let switch = CrawlSwitch::load(&catalog)?;
        switch.set_enabled(&catalog, cli.crawler_on)?;
        println!(
            "✓ Crawler {}",
            if cli.crawler_on { "enabled" } else { "paused" }
        );
    } else if let Some(canonical_id) = &cli.reset_failed {
        lock(&catalog)?.reset_failed(canonical_id)?;
        println!("✓ {} moved back to discovered", canonical_id);
    } else if let Some(path) = &cli.ingest {
        handle_ingest(&config, catalog, path).await?;
    } else if let Some(path) = &cli.import {
        handle_import(&config, &catalog, path, cli.dry_run)?;
    } else if cli.reverify {
        handle_reverify(&config, catalog).await?;
    } else {
        handle_daemon(config, catalog).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("channel_harvest=info,warn"),
            1 => EnvFilter::new("channel_harvest=debug,info"),
            2 => EnvFilter::new("channel_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_catalog(config: &Config) -> anyhow::Result<SharedCatalog> {
    let path = Path::new(&config.storage.database_path);
    let catalog = SqliteCatalog::open(path)
        .with_context(|| format!("failed to open catalog at {}", path.display()))?;
    Ok(shared(catalog))
}

fn day_boundary(config: &Config) -> anyhow::Result<DayBoundary> {
    DayBoundary::new(config.crawl.utc_offset_minutes)
        .ok_or_else(|| anyhow!("invalid utc offset {}", config.crawl.utc_offset_minutes))
}

fn build_governor(config: &Config) -> Arc<DelayGovernor> {
    Arc::new(DelayGovernor::new(
        config.verification.delay(),
        config.crawl.delay(),
    ))
}

fn build_preview_client(config: &Config) -> anyhow::Result<Arc<PreviewClient>> {
    let timeout = Duration::from_secs(
        config
            .verification
            .call_timeout_secs
            .max(config.crawl.call_timeout_secs),
    );
    let client = PreviewClient::new(
        &config.platform.preview_base_url,
        &config.platform.user_agent,
        timeout,
    )?;
    Ok(Arc::new(client))
}

fn build_verifier(
    config: &Config,
    catalog: SharedCatalog,
    governor: Arc<DelayGovernor>,
    client: Arc<PreviewClient>,
) -> anyhow::Result<Verifier> {
    let settings = VerifierSettings::new(
        &config.verification.bot_pattern,
        config.verification.call_timeout(),
    )?;
    Ok(Verifier::new(catalog, client, governor, settings))
}

/// Cancels the returned token on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            token.cancel();
        }
    });
    cancel
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, catalog: &SharedCatalog) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let switch = CrawlSwitch::load(catalog)?;
    let today = day_boundary(config)?.day_of(Utc::now());

    let store = lock(catalog)?;
    let stats = load_catalog_stats(&*store)?;
    let status = crawl_status(
        &*store,
        switch.is_enabled(),
        config.crawl.daily_quota,
        today,
    )?;

    print_statistics(&stats, &status);
    Ok(())
}

/// Handles the --ingest mode: processes a JSON-lines file of messages
async fn handle_ingest(config: &Config, catalog: SharedCatalog, path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let governor = build_governor(config);
    let client = build_preview_client(config)?;
    let verifier = build_verifier(config, catalog, governor, client)?;
    let cancel = cancel_on_ctrl_c();

    let mut total = BatchReport::default();
    let mut messages = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let message: Message = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed message");
                continue;
            }
        };

        match verifier.process_message(&message, &cancel).await {
            Ok(report) => total.merge(&report),
            Err(HarvestError::Cancelled) => break,
            Err(e) => tracing::error!(message_id = %message.id, error = %e, "Message failed"),
        }
        messages += 1;
    }

    println!("Processed {} messages: {}", messages, total);
    println!("Bot-like handles skipped: {}", verifier.bot_skips());
    Ok(())
}

/// Handles the --import mode: bulk-loads references from a text file
fn handle_import(
    config: &Config,
    catalog: &SharedCatalog,
    path: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let settings = VerifierSettings::new(
        &config.verification.bot_pattern,
        config.verification.call_timeout(),
    )?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let source = format!("import:{}", file_name);
    let options = ImportOptions {
        source: &source,
        bot_pattern: &settings.bot_pattern,
        dry_run,
        now: Utc::now(),
    };

    let report = import_references(catalog, &text, &options)?;
    if report.found == 0 {
        println!("No channel links or @handles found in {}", path.display());
        return Ok(());
    }

    let prefix = if dry_run { "[dry run] " } else { "" };
    println!("{}Imported from {}: {}", prefix, path.display(), report);
    if !dry_run && report.added > 0 {
        println!("Run with --reverify to resolve the new channels");
    }
    Ok(())
}

/// Handles the --reverify mode: re-resolves discovered channels
async fn handle_reverify(config: &Config, catalog: SharedCatalog) -> anyhow::Result<()> {
    let governor = build_governor(config);
    let client = build_preview_client(config)?;
    let verifier = build_verifier(config, catalog, governor, client)?;
    let cancel = cancel_on_ctrl_c();

    match verifier.reverify_discovered(&cancel).await {
        Ok(report) => println!("Re-verified: {}", report),
        Err(HarvestError::Cancelled) => println!("Re-verification interrupted"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Runs the crawl loop and processes messages from stdin until interrupted
async fn handle_daemon(config: Config, catalog: SharedCatalog) -> anyhow::Result<()> {
    let governor = build_governor(&config);
    let client = build_preview_client(&config)?;
    let verifier = Arc::new(build_verifier(
        &config,
        catalog.clone(),
        governor.clone(),
        client.clone(),
    )?);

    let switch = CrawlSwitch::load(&catalog)?;
    let settings = SchedulerSettings {
        daily_quota: config.crawl.daily_quota,
        boundary: day_boundary(&config)?,
        idle_interval: Duration::from_secs(config.crawl.idle_interval_secs),
        call_timeout: Duration::from_secs(config.crawl.call_timeout_secs),
    };
    let scheduler = CrawlScheduler::new(catalog, client, governor, switch, settings);

    let cancel = cancel_on_ctrl_c();
    let crawl_token = cancel.clone();
    let crawl = tokio::spawn(async move { scheduler.run(crawl_token).await });

    tracing::info!("Reading messages from stdin (JSON lines)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("Input closed; crawl loop keeps running until interrupted");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let message: Message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed message");
                continue;
            }
        };

        let verifier = verifier.clone();
        let token = cancel.clone();
        tasks.spawn(async move {
            match verifier.process_message(&message, &token).await {
                Ok(_) | Err(HarvestError::Cancelled) => {}
                Err(e) => {
                    tracing::error!(message_id = %message.id, error = %e, "Message failed")
                }
            }
        });

        // Reap finished tasks so the set stays small
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}

    crawl
        .await
        .context("crawl loop panicked")?
        .context("crawl loop failed")?;
    tracing::info!("Shutdown complete");
    Ok(())
}
