//! Command-line interface definitions for the ingestion runner.
//!
//! All secrets and service endpoints can come from flags or environment
//! variables. Flags override the YAML configuration file.

use clap::Parser;

use crate::config::IngestConfig;

/// Command-line arguments for the ingestion runner.
///
/// # Examples
///
/// ```sh
/// # Drain the backlog in articles.json, checkpointing under ./runs
/// meridian_ingest --articles articles.json --checkpoint-dir ./runs
///
/// # Resume a run that was killed part way
/// meridian_ingest --articles articles.json --checkpoint-dir ./runs --resume 6f1c...
///
/// # Fetch and analyze one URL without touching the store
/// meridian_ingest --probe https://apnews.com/article/...
///
/// # Check that the LLM gateway answers in JSON mode
/// meridian_ingest --probe-gateway
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// JSON file holding the article store (an array of articles)
    #[arg(short, long, required_unless_present_any = ["probe", "probe_gateway"])]
    pub articles: Option<String>,

    /// Directory for per-run checkpoint logs
    #[arg(long, default_value = "./checkpoints")]
    pub checkpoint_dir: String,

    /// Resume (or start) the run with this id instead of a fresh one
    #[arg(long)]
    pub resume: Option<String>,

    /// Maximum number of chained runs in this invocation
    #[arg(long)]
    pub max_runs: Option<usize>,

    /// OpenRouter API key
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub openrouter_api_key: Option<String>,

    /// Browserless base URL
    #[arg(long, env = "BROWSERLESS_URL")]
    pub browserless_url: Option<String>,

    /// Browserless API token
    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true)]
    pub browserless_token: Option<String>,

    /// Fetch and analyze a single URL, print the result, and exit
    #[arg(long, value_name = "URL", conflicts_with = "probe_gateway")]
    pub probe: Option<String>,

    /// Send a trivial JSON-mode request to the LLM gateway and exit
    #[arg(long)]
    pub probe_gateway: bool,
}

impl Cli {
    /// Apply flag and environment overrides on top of `config`.
    pub fn apply(&self, config: &mut IngestConfig) {
        if let Some(max_runs) = self.max_runs {
            config.max_runs = max_runs;
        }
        if let Some(key) = &self.openrouter_api_key {
            config.llm.api_key = Some(key.clone());
        }
        if let Some(url) = &self.browserless_url {
            config.renderer.base_url = url.clone();
        }
        if let Some(token) = &self.browserless_token {
            config.renderer.token = Some(token.clone());
        }
    }
}
