//! Checkpoint log backing durable steps.
//!
//! A checkpoint is the JSON-encoded value a step produced, keyed by run id
//! and step name. Writing the same key twice keeps the latest value, so
//! replaying a step is harmless.
//!
//! Two backends are provided:
//! - [`MemoryCheckpoints`]: process-local, for tests and one-shot runs
//! - [`FileCheckpoints`]: one append-only JSON-lines file per run, which
//!   survives a killed process and lets a run be resumed by id

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::RunId;
use crate::error::CheckpointError;

/// Storage for step results.
pub trait CheckpointStore {
    /// Value recorded for `step` in `run`, if the step already completed.
    async fn load(&self, run: &RunId, step: &str) -> Result<Option<Value>, CheckpointError>;

    /// Record the value `step` produced in `run`.
    async fn save(&self, run: &RunId, step: &str, value: &Value) -> Result<(), CheckpointError>;
}

#[derive(Debug, Default)]
pub struct MemoryCheckpoints {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints recorded for a run.
    pub async fn count(&self, run: &RunId) -> usize {
        self.entries
            .read()
            .await
            .keys()
            .filter(|(r, _)| r == run.as_str())
            .count()
    }

    /// Number of checkpoints recorded across all runs.
    pub async fn total(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl CheckpointStore for MemoryCheckpoints {
    async fn load(&self, run: &RunId, step: &str) -> Result<Option<Value>, CheckpointError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(run.to_string(), step.to_string())).cloned())
    }

    async fn save(&self, run: &RunId, step: &str, value: &Value) -> Result<(), CheckpointError> {
        let mut entries = self.entries.write().await;
        entries.insert((run.to_string(), step.to_string()), value.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointLine {
    step: String,
    value: Value,
}

/// JSON-lines checkpoint log, one file per run under `dir`.
#[derive(Debug)]
pub struct FileCheckpoints {
    dir: PathBuf,
    // run id -> step name -> value; a run's file is read once, then appended to
    cache: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl FileCheckpoints {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, run: &RunId) -> Result<PathBuf, CheckpointError> {
        if !run.is_file_safe() {
            return Err(CheckpointError::InvalidRunId(run.to_string()));
        }
        Ok(self.dir.join(format!("{}.jsonl", run)))
    }

    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    async fn read_log(path: &Path) -> Result<HashMap<String, Value>, CheckpointError> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut steps = HashMap::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointLine>(line) {
                Ok(entry) => {
                    steps.insert(entry.step, entry.value);
                }
                // a torn final line from a killed process is skipped
                Err(e) => warn!(line = lineno + 1, error = %e, "Skipping unreadable checkpoint line"),
            }
        }
        debug!(steps = steps.len(), "Loaded checkpoint log");
        Ok(steps)
    }
}

impl CheckpointStore for FileCheckpoints {
    async fn load(&self, run: &RunId, step: &str) -> Result<Option<Value>, CheckpointError> {
        let mut cache = self.cache.lock().await;
        if !cache.contains_key(run.as_str()) {
            let steps = Self::read_log(&self.path_for(run)?).await?;
            cache.insert(run.to_string(), steps);
        }
        Ok(cache.get(run.as_str()).and_then(|steps| steps.get(step)).cloned())
    }

    async fn save(&self, run: &RunId, step: &str, value: &Value) -> Result<(), CheckpointError> {
        let path = self.path_for(run)?;
        let mut cache = self.cache.lock().await;

        let mut line = serde_json::to_string(&CheckpointLine {
            step: step.to_string(),
            value: value.clone(),
        })?;
        line.push('\n');

        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        if !cache.contains_key(run.as_str()) {
            let steps = Self::read_log(&path).await?;
            cache.insert(run.to_string(), steps);
        }
        if let Some(steps) = cache.get_mut(run.as_str()) {
            steps.insert(step.to_string(), value.clone());
        }
        Ok(())
    }
}
