//! The durable ingestion workflow.
//!
//! One run processes one backlog batch as a sequence of named durable steps:
//!
//! ```text
//! get articles                          read up to batch_size pending articles
//! for each chunk of chunk_size:
//!   scrape article {id}                 fetch through the domain rate limiter
//!   update db for failed article {id}   record terminal fetch failures
//!   analyze article {id}                extraction, all of the chunk at once
//!   update db for article {id}          write fields, text, title
//! get remaining articles                re-read the backlog
//! trigger continuation                  mint the next run id if backlog remains
//! ```
//!
//! Per-article failures, including steps that exhaust their retries, end in
//! a recorded fail reason and never abort the run. Only the two backlog reads
//! are fatal. Continuation is driven by [`Workflow::run_until_drained`],
//! which keeps starting the run each report names until the backlog is empty.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::IngestConfig;
use crate::durable::{CheckpointStore, RunId, StepExecutor};
use crate::error::{FetchFailure, ProbeError, StepError, WorkflowError};
use crate::extract::Analyzer;
use crate::fetch::ArticleFetcher;
use crate::limiter::{BatchResult, DomainRateLimiter, FetchTask};
use crate::models::{Article, ArticleId, ExtractionResult, ProcessedArticle, ScrapedArticle};
use crate::store::ArticleStore;
use crate::utils::truncate_for_log;

/// Recorded when a failure carries no message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Result of the `scrape article` step as committed to the checkpoint log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
enum ScrapeOutcome {
    Scraped { page: ScrapedArticle },
    Failed { failure: FetchFailure },
}

enum Recorded {
    Processed,
    Failed,
    Unrecorded,
}

/// Counts for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub selected: usize,
    pub chunks: usize,
    pub processed: usize,
    pub failed: usize,
    /// Articles whose outcome could not be written; they stay pending.
    pub unrecorded: usize,
    pub remaining: usize,
    pub continuation: Option<RunId>,
}

impl RunReport {
    fn new(run_id: RunId, selected: usize) -> Self {
        Self {
            run_id,
            selected,
            chunks: 0,
            processed: 0,
            failed: 0,
            unrecorded: 0,
            remaining: 0,
            continuation: None,
        }
    }

    fn tally(&mut self, recorded: Recorded) {
        match recorded {
            Recorded::Processed => self.processed += 1,
            Recorded::Failed => self.failed += 1,
            Recorded::Unrecorded => self.unrecorded += 1,
        }
    }
}

/// Fetch and analysis of a single URL, without retries or persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub scraped: ScrapedArticle,
    pub analysis: ExtractionResult,
}

/// Fail reason to persist for an error message.
pub fn fail_reason(message: &str) -> String {
    let message = message.trim();
    if message.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message.to_string()
    }
}

fn step_failure_reason(err: &StepError) -> String {
    match err {
        StepError::Exhausted { last_error, .. } => fail_reason(last_error),
        other => fail_reason(&other.to_string()),
    }
}

pub struct Workflow<S, F, A, C> {
    config: IngestConfig,
    store: S,
    fetcher: F,
    analyzer: A,
    checkpoints: C,
}

impl<S, F, A, C> Workflow<S, F, A, C>
where
    S: ArticleStore,
    F: ArticleFetcher,
    A: Analyzer,
    C: CheckpointStore,
{
    pub fn new(config: IngestConfig, store: S, fetcher: F, analyzer: A, checkpoints: C) -> Self {
        Self {
            config,
            store,
            fetcher,
            analyzer,
            checkpoints,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn checkpoints(&self) -> &C {
        &self.checkpoints
    }

    /// Begin ingestion under a fresh run id and follow continuations until
    /// the backlog drains or `max_runs` is reached. Returns the first run id.
    pub async fn start_run(&self) -> Result<RunId, WorkflowError> {
        let run_id = RunId::generate();
        self.run_until_drained(run_id.clone(), self.config.max_runs).await?;
        Ok(run_id)
    }

    /// Run `first`, then each continuation it names, at most `max_runs` runs.
    pub async fn run_until_drained(&self, first: RunId, max_runs: usize) -> Result<Vec<RunReport>, WorkflowError> {
        let max_runs = max_runs.max(1);
        let mut reports: Vec<RunReport> = Vec::new();
        let mut next = Some(first);

        while let Some(run_id) = next.take() {
            let report = self.run(run_id).await?;
            next = report.continuation.clone();
            reports.push(report);

            if reports.len() >= max_runs {
                if let Some(pending) = &next {
                    warn!(continuation = %pending, max_runs, "Run limit reached with backlog remaining");
                }
                break;
            }
        }
        Ok(reports)
    }

    /// Execute (or resume) one run.
    #[instrument(level = "info", skip_all, fields(run = %run_id))]
    pub async fn run(&self, run_id: RunId) -> Result<RunReport, WorkflowError> {
        let t0 = Instant::now();
        let steps = StepExecutor::new(run_id.clone(), &self.checkpoints);
        let db = &self.config.steps.db;
        let store = &self.store;
        let (limit, max_age) = (self.config.batch_size.max(1), self.config.max_age_hours);

        let articles: Vec<Article> = steps
            .execute("get articles", db, move || async move { store.select_pending(limit, max_age).await })
            .await
            .map_err(WorkflowError::Backlog)?;
        info!(selected = articles.len(), "Selected backlog batch");

        let mut report = RunReport::new(run_id, articles.len());
        let mut limiter = DomainRateLimiter::new(self.config.limiter.clone());

        for (index, chunk) in articles.chunks(self.config.chunk_size.max(1)).enumerate() {
            report.chunks += 1;
            self.process_chunk(&steps, &mut limiter, index, chunk.to_vec(), &mut report)
                .await;
        }

        let remaining: usize = steps
            .execute("get remaining articles", db, move || async move {
                store.select_pending(limit, max_age).await.map(|a| a.len())
            })
            .await
            .map_err(WorkflowError::Continuation)?;
        report.remaining = remaining;

        if remaining > 0 {
            let next: RunId = steps
                .execute("trigger continuation", db, || async { Ok::<_, Infallible>(RunId::generate()) })
                .await
                .map_err(WorkflowError::Continuation)?;
            info!(remaining, continuation = %next, "Backlog remains; continuing in a new run");
            report.continuation = Some(next);
        }

        info!(
            selected = report.selected,
            chunks = report.chunks,
            processed = report.processed,
            failed = report.failed,
            unrecorded = report.unrecorded,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Run complete"
        );
        Ok(report)
    }

    #[instrument(level = "info", skip_all, fields(chunk = index, size = chunk.len()))]
    async fn process_chunk(
        &self,
        steps: &StepExecutor<'_, C>,
        limiter: &mut DomainRateLimiter,
        index: usize,
        chunk: Vec<Article>,
        report: &mut RunReport,
    ) {
        let fetcher = &self.fetcher;
        let fetch_policy = &self.config.steps.fetch;

        let scraped = limiter
            .process_batch(chunk, Article::domain, move |task: FetchTask<Article>| async move {
                let article = task.item;
                let url = article.url.as_str();
                let outcome = steps
                    .execute(&format!("scrape article {}", article.id), fetch_policy, move || async move {
                        match fetcher.fetch(url).await {
                            Ok(page) => Ok(ScrapeOutcome::Scraped { page }),
                            Err(failure) if failure.error.is_transient() => Err(failure),
                            Err(failure) => Ok(ScrapeOutcome::Failed { failure }),
                        }
                    })
                    .await;
                (article, outcome)
            })
            .await;

        let mut to_analyze = Vec::new();
        for BatchResult { output: (article, outcome), domain, .. } in scraped {
            let reason = match outcome {
                Ok(ScrapeOutcome::Scraped { page }) => {
                    to_analyze.push((article, page));
                    continue;
                }
                Ok(ScrapeOutcome::Failed { failure }) => fail_reason(&failure.to_string()),
                Err(e) => step_failure_reason(&e),
            };
            warn!(article_id = article.id, url = %article.url, %domain, %reason, "Fetch failed");
            let recorded = self.record_failure(steps, article.id, &reason).await;
            report.tally(recorded);
        }

        let outcomes = join_all(
            to_analyze
                .iter()
                .map(|(article, page)| self.analyze_and_record(steps, article, page)),
        )
        .await;
        for recorded in outcomes {
            report.tally(recorded);
        }
    }

    async fn analyze_and_record(&self, steps: &StepExecutor<'_, C>, article: &Article, page: &ScrapedArticle) -> Recorded {
        let id = article.id;
        let analyzer = &self.analyzer;
        let (title, text) = (page.title.as_str(), page.text.as_str());

        let analysis = steps
            .execute(&format!("analyze article {id}"), &self.config.steps.analyze, move || {
                analyzer.analyze(title, text)
            })
            .await;

        let result = match analysis {
            Ok(result) => result,
            Err(e) => {
                let reason = step_failure_reason(&e);
                warn!(article_id = id, url = %article.url, reason = %truncate_for_log(&reason, 500), "Analysis failed");
                return self.record_failure(steps, id, &reason).await;
            }
        };

        let store = &self.store;
        let processed = ProcessedArticle::new(page, result);
        let processed = &processed;
        match steps
            .execute(&format!("update db for article {id}"), &self.config.steps.db, move || async move {
                store.mark_processed(id, processed).await
            })
            .await
        {
            Ok(()) => Recorded::Processed,
            Err(e) => {
                error!(article_id = id, error = %e, "Could not record processed article");
                Recorded::Unrecorded
            }
        }
    }

    async fn record_failure(&self, steps: &StepExecutor<'_, C>, id: ArticleId, reason: &str) -> Recorded {
        let store = &self.store;
        match steps
            .execute(&format!("update db for failed article {id}"), &self.config.steps.db, move || async move {
                store.mark_failed(id, reason).await
            })
            .await
        {
            Ok(()) => Recorded::Failed,
            Err(e) => {
                error!(article_id = id, error = %e, "Could not record article failure");
                Recorded::Unrecorded
            }
        }
    }

    /// Fetch and analyze one URL without touching the store or the
    /// checkpoint log. `title` is used when the page has none.
    #[instrument(level = "info", skip(self))]
    pub async fn probe_article(&self, url: &str, title: &str) -> Result<ProbeReport, ProbeError> {
        let mut scraped = self.fetcher.fetch(url).await?;
        if scraped.title.trim().is_empty() {
            scraped.title = title.to_string();
        }
        let analysis = self.analyzer.analyze(&scraped.title, &scraped.text).await?;
        Ok(ProbeReport {
            url: url.to_string(),
            scraped,
            analysis,
        })
    }
}
