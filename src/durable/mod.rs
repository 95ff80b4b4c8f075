//! Durable execution primitives.
//!
//! A workflow run is a sequence of named steps. Each step has its own retry
//! policy and timeout, and its result is committed to a checkpoint log keyed
//! by run id and step name. Re-entering a run with the same id replays
//! committed steps from the log and resumes at the first step that never
//! committed.
//!
//! # Submodules
//!
//! - [`policy`]: retry count, backoff shape and timeout per step
//! - [`checkpoint`]: the checkpoint log trait and its memory/file backends
//! - [`executor`]: runs a step body under a policy against the log

pub mod checkpoint;
pub mod executor;
pub mod policy;

pub use checkpoint::{CheckpointStore, FileCheckpoints, MemoryCheckpoints};
pub use executor::StepExecutor;
pub use policy::{Backoff, RetryPolicy};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one workflow run; doubles as its continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// A fresh random run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is non-empty and only holds ASCII letters, digits,
    /// `-` and `_`, so it can name a file without leaving its directory.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
