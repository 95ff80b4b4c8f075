//! # Meridian Ingest runner
//!
//! Drains the pending backlog of a JSON article store: fetches each article,
//! analyzes it through OpenRouter, and records the outcome, chaining runs
//! until nothing is left or `--max-runs` is reached.
//!
//! ## Usage
//!
//! ```sh
//! OPENROUTER_API_KEY=... BROWSERLESS_URL=http://localhost:3000 \
//!     meridian_ingest --articles articles.json --checkpoint-dir ./runs
//! ```

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use meridian_ingest::cli::Cli;
use meridian_ingest::durable::{FileCheckpoints, MemoryCheckpoints};
use meridian_ingest::extract::{ExtractionService, OpenRouterGateway};
use meridian_ingest::fetch::{BrowserRenderer, Fetcher, HttpFetcher};
use meridian_ingest::store::{JsonFileStore, MemoryStore};
use meridian_ingest::utils::{ensure_writable_dir, truncate_for_log};
use meridian_ingest::{IngestConfig, RunId, Workflow};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("meridian_ingest starting up");

    let args = Cli::parse();
    debug!(?args.articles, ?args.checkpoint_dir, ?args.resume, ?args.probe, args.probe_gateway, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = match &args.config {
        Some(path) => {
            let config = IngestConfig::load(Path::new(path))?;
            info!(config_path = %path, "Loaded configuration");
            config
        }
        None => IngestConfig::default(),
    };
    args.apply(&mut config);

    // ---- Production components ----
    let gateway = OpenRouterGateway::new(&config.llm)?;
    let analyzer = ExtractionService::new(gateway, &config.llm);

    if args.probe_gateway {
        return probe_gateway(&analyzer).await;
    }

    let fetcher = Fetcher::from_config(&config.fetcher, &config.renderer)?;

    if let Some(url) = &args.probe {
        return probe(config, fetcher, analyzer, url).await;
    }

    // Early check: checkpoint dir must be writable before any step commits
    if let Err(e) = ensure_writable_dir(&args.checkpoint_dir).await {
        error!(
            path = %args.checkpoint_dir,
            error = %e,
            "Checkpoint directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let Some(articles_path) = args.articles.as_deref() else {
        return Err("--articles is required unless --probe is given".into());
    };
    let store = JsonFileStore::open(articles_path).await?;
    let checkpoints = FileCheckpoints::new(&args.checkpoint_dir);

    let max_runs = config.max_runs;
    let workflow = Workflow::new(config, store, fetcher, analyzer, checkpoints);

    let first = match &args.resume {
        Some(id) => {
            let run = RunId::from(id.as_str());
            if !run.is_file_safe() {
                return Err(format!("--resume id '{id}' may only contain letters, digits, '-' and '_'").into());
            }
            info!(run = %id, "Resuming run");
            run
        }
        None => RunId::generate(),
    };

    let reports = workflow.run_until_drained(first, max_runs).await?;

    for report in &reports {
        info!(
            run = %report.run_id,
            selected = report.selected,
            chunks = report.chunks,
            processed = report.processed,
            failed = report.failed,
            unrecorded = report.unrecorded,
            remaining = report.remaining,
            "Run report"
        );
    }
    if let Some(pending) = reports.last().and_then(|r| r.continuation.as_ref()) {
        warn!(continuation = %pending, "Backlog remains; rerun with --resume to continue");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        runs = reports.len(),
        processed = reports.iter().map(|r| r.processed).sum::<usize>(),
        failed = reports.iter().map(|r| r.failed).sum::<usize>(),
        "Execution complete"
    );

    Ok(())
}

async fn probe_gateway(analyzer: &ExtractionService<OpenRouterGateway>) -> Result<(), Box<dyn Error>> {
    match analyzer.check_gateway().await {
        Ok(check) => {
            println!("{}", serde_json::to_string_pretty(&check)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %truncate_for_log(&e.to_string(), 500), "Gateway check failed");
            Err(e.into())
        }
    }
}

async fn probe(
    config: IngestConfig,
    fetcher: Fetcher<HttpFetcher, BrowserRenderer>,
    analyzer: ExtractionService<OpenRouterGateway>,
    url: &str,
) -> Result<(), Box<dyn Error>> {
    let workflow = Workflow::new(config, MemoryStore::default(), fetcher, analyzer, MemoryCheckpoints::new());

    let mut report = workflow.probe_article(url, "").await?;
    report.scraped.text = truncate_for_log(&report.scraped.text, 500);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
