//! # Meridian Ingest
//!
//! Resilient ingestion and enrichment of news articles.
//!
//! Articles discovered upstream sit in an article store as a pending
//! backlog. Each workflow run takes a batch of them and, for every article:
//!
//! 1. fetches the page text through a domain-aware rate limiter, trying a
//!    plain HTTP fetch first and a headless-browser render as fallback
//! 2. asks an LLM for a structured analysis and validates the reply
//! 3. writes the analysis, or a fail reason, back to the store
//!
//! Every stage runs as a named durable step with its own retry policy and
//! timeout, checkpointed per run so a killed run can be resumed. A run that
//! leaves backlog behind names a continuation run, and the runner keeps
//! going until the backlog drains.
//!
//! ## Modules
//!
//! - [`limiter`]: global concurrency bound plus global and per-domain cooldowns
//! - [`fetch`]: tiered content fetching
//! - [`extract`]: LLM gateway, prompt, validation and summary derivation
//! - [`durable`]: retryable, checkpointed steps
//! - [`store`]: the article store contract and its backends
//! - [`workflow`]: the run itself

pub mod cli;
pub mod config;
pub mod durable;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod limiter;
pub mod models;
pub mod store;
pub mod utils;
pub mod workflow;

pub use config::IngestConfig;
pub use durable::RunId;
pub use workflow::{ProbeReport, RunReport, Workflow};
