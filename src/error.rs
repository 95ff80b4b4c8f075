//! Error taxonomy for the ingestion pipeline.
//!
//! Expected failure modes (blocked sites, empty pages, malformed model
//! output) are ordinary values of these types and are recovered per article
//! by the workflow. Only [`WorkflowError`] aborts a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::ArticleId;

/// Why a single fetch tier could not produce article text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FetchError {
    #[error("unsupported-format")]
    UnsupportedFormat,

    #[error("invalid-url: {url}")]
    InvalidUrl { url: String },

    #[error("network: {message}")]
    Network { message: String },

    #[error("blocked: HTTP {status}")]
    Blocked { status: u16 },

    #[error("not-found: HTTP {status}")]
    NotFound { status: u16 },

    #[error("empty")]
    Empty,

    #[error("timeout")]
    Timeout,
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Stable short tag, used as the persisted fail reason prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "unsupported-format",
            Self::InvalidUrl { .. } => "invalid-url",
            Self::Network { .. } => "network",
            Self::Blocked { .. } => "blocked",
            Self::NotFound { .. } => "not-found",
            Self::Empty => "empty",
            Self::Timeout => "timeout",
        }
    }

    /// Transient failures are worth another attempt of the whole fetch step.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::network(err.to_string())
        }
    }
}

/// Which fetch strategy produced a result or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Plain HTTP GET plus HTML text extraction.
    Light,
    /// Headless browser rendering.
    Render,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Light => f.write_str("fetch"),
            Tier::Render => f.write_str("render"),
        }
    }
}

/// Tagged failure returned by the fetcher. A failure whose tier is
/// [`Tier::Render`] is the heavy renderer's error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{tier}: {error}")]
pub struct FetchFailure {
    pub tier: Tier,
    pub error: FetchError,
}

impl FetchFailure {
    pub fn new(tier: Tier, error: FetchError) -> Self {
        Self { tier, error }
    }
}

/// LLM gateway call failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("gateway returned no choices: {body}")]
    MissingContent { body: String },

    #[error("gateway response is not valid JSON ({source}): {body}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("gateway is not configured: {0}")]
    NotConfigured(String),
}

/// A single schema violation in model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field, e.g. `summary.HEADLINE`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Structured extraction failures.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("model output is not valid JSON ({source}); raw: {raw}")]
    Parse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model returned an empty array; raw: {raw}")]
    EmptyArray { raw: String },

    #[error("model output is not a JSON object; raw: {raw}")]
    NotAnObject { raw: String },

    #[error("model output failed validation: {}; raw: {raw}", join_violations(.violations))]
    Validation {
        raw: String,
        violations: Vec<FieldViolation>,
    },
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures of the article store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("article store unavailable: {0}")]
    Unavailable(String),

    #[error("article {0} not found")]
    NotFound(ArticleId),

    #[error("article store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("article store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failures of the checkpoint log behind durable steps.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("run id '{0}' is not usable as a checkpoint file name")]
    InvalidRunId(String),
}

/// A durable step that did not produce a value.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step '{step}' failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        step: String,
        attempts: u32,
        last_error: String,
    },

    #[error("step '{step}': {source}")]
    Checkpoint {
        step: String,
        #[source]
        source: CheckpointError,
    },
}

/// Run-level errors. These abort the run; the caller re-enters it later.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("reading the backlog failed: {0}")]
    Backlog(#[source] StepError),

    #[error("checking for remaining backlog failed: {0}")]
    Continuation(#[source] StepError),
}

/// Failures of a single-article probe, which neither retries nor persists.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to scrape article: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("analysis failed: {0}")]
    Extraction(#[from] ExtractionError),
}
