//! Runtime configuration.
//!
//! Settings are read from an optional YAML file. Every field has a default,
//! so an empty file (or no file at all) yields the production settings.
//! Secrets and endpoints can additionally be supplied on the command line or
//! through the environment; see [`crate::cli::Cli`].

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::durable::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Articles pulled from the backlog per run.
    pub batch_size: usize,
    /// Articles fetched and analyzed together inside a run.
    pub chunk_size: usize,
    /// Only articles published within this many hours are selected.
    pub max_age_hours: i64,
    /// Upper bound on chained continuation runs per invocation.
    pub max_runs: usize,
    pub limiter: LimiterConfig,
    pub fetcher: FetcherConfig,
    pub renderer: RendererConfig,
    pub llm: LlmConfig,
    pub steps: StepPolicies,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            chunk_size: 10,
            max_age_hours: 48,
            max_runs: 20,
            limiter: LimiterConfig::default(),
            fetcher: FetcherConfig::default(),
            renderer: RendererConfig::default(),
            llm: LlmConfig::default(),
            steps: StepPolicies::default(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from a YAML file.
    #[instrument(level = "info")]
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.fit_fetch_timeout();
        Ok(config)
    }

    /// Longest a single fetch attempt can take: a light fetch that times
    /// out, the widest jitter, then a render that times out.
    pub fn fetch_attempt_budget(&self) -> Duration {
        Duration::from_secs(self.fetcher.timeout_secs)
            + Duration::from_millis(self.fetcher.jitter_max_ms)
            + Duration::from_secs(self.renderer.timeout_secs)
            + FETCH_STEP_SLACK
    }

    /// Raise the fetch step timeout so it never cuts off the renderer
    /// fallback. Returns true when the timeout was changed.
    pub fn fit_fetch_timeout(&mut self) -> bool {
        let budget = self.fetch_attempt_budget();
        if self.steps.fetch.timeout() >= budget {
            return false;
        }
        warn!(
            configured_ms = self.steps.fetch.timeout_ms,
            required_ms = budget.as_millis() as u64,
            "Fetch step timeout is shorter than light timeout + jitter + render timeout; raising it"
        );
        self.steps.fetch.timeout_ms = budget.as_millis() as u64;
        true
    }
}

/// Headroom on top of the tier timeouts for HTML extraction.
const FETCH_STEP_SLACK: Duration = Duration::from_secs(2);

/// Bounds applied by the domain rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub max_concurrent: usize,
    pub global_cooldown_ms: u64,
    pub domain_cooldown_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            global_cooldown_ms: 1000,
            domain_cooldown_ms: 5000,
        }
    }
}

impl LimiterConfig {
    pub fn global_cooldown(&self) -> Duration {
        Duration::from_millis(self.global_cooldown_ms)
    }

    pub fn domain_cooldown(&self) -> Duration {
        Duration::from_millis(self.domain_cooldown_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Hostnames (and their subdomains) that go straight to the renderer.
    pub tricky_domains: Vec<String>,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Extracted text shorter than this counts as an empty page.
    pub min_text_chars: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            tricky_domains: vec!["reuters.com".to_string(), "nytimes.com".to_string()],
            jitter_min_ms: 500,
            jitter_max_ms: 3000,
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (compatible; MeridianIngest/0.1)".to_string(),
            min_text_chars: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Browserless endpoint, e.g. `https://chrome.browserless.io`.
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            token: None,
            timeout_secs: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub app_name: String,
    pub temperature: f32,
    pub api_key: Option<String>,
    /// Article text is cut to this many bytes before it goes into the prompt.
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.0-flash-001".to_string(),
            app_name: "News Analysis".to_string(),
            temperature: 0.0,
            api_key: None,
            max_input_chars: 50_000,
            timeout_secs: 55,
        }
    }
}

/// Retry policies for each kind of durable step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPolicies {
    pub db: RetryPolicy,
    pub fetch: RetryPolicy,
    pub analyze: RetryPolicy,
}

impl Default for StepPolicies {
    fn default() -> Self {
        Self {
            db: RetryPolicy {
                retries: 3,
                delay_ms: 1000,
                backoff: Backoff::Linear,
                timeout_ms: 5_000,
            },
            fetch: RetryPolicy {
                retries: 2,
                delay_ms: 2000,
                backoff: Backoff::Exponential,
                timeout_ms: 60_000,
            },
            analyze: RetryPolicy {
                retries: 2,
                delay_ms: 2000,
                backoff: Backoff::Exponential,
                timeout_ms: 60_000,
            },
        }
    }
}
