//! Durable step execution with retry, backoff and per-attempt timeouts.
//!
//! A step is identified by its name within a run. Before running the body,
//! the executor consults the checkpoint log: a step that already committed a
//! value returns it without executing again. Otherwise the body is attempted
//! up to [`RetryPolicy::max_attempts`] times; each attempt is bounded by the
//! policy timeout, and an attempt that overruns is abandoned and counted as
//! a failure.
//!
//! Step bodies must be safe to repeat: a process killed after a side effect
//! but before the checkpoint write will run that body again on resume.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use super::{CheckpointStore, RetryPolicy, RunId};
use crate::error::{CheckpointError, StepError};

/// Runs named steps for one workflow run against a checkpoint log.
#[derive(Debug)]
pub struct StepExecutor<'a, C> {
    run: RunId,
    checkpoints: &'a C,
}

impl<'a, C: CheckpointStore> StepExecutor<'a, C> {
    pub fn new(run: RunId, checkpoints: &'a C) -> Self {
        Self { run, checkpoints }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run
    }

    /// Execute `body` as the durable step `name`.
    ///
    /// Returns the checkpointed value if the step already completed in this
    /// run, otherwise the first successful attempt's value (which is then
    /// checkpointed). Fails with [`StepError::Exhausted`] once every attempt
    /// has failed or timed out.
    pub async fn execute<T, E, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        mut body: F,
    ) -> Result<T, StepError>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let checkpoint_err = |source: CheckpointError| StepError::Checkpoint {
            step: name.to_string(),
            source,
        };

        if let Some(recorded) = self
            .checkpoints
            .load(&self.run, name)
            .await
            .map_err(checkpoint_err)?
        {
            match serde_json::from_value::<T>(recorded) {
                Ok(value) => {
                    debug!(run = %self.run, step = name, "Step already committed; replaying checkpoint");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(run = %self.run, step = name, error = %e, "Checkpoint does not decode; re-running step");
                }
            }
        }

        let total_t0 = Instant::now();
        let attempts = policy.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let attempt_t0 = Instant::now();
            match timeout(policy.timeout(), body()).await {
                Ok(Ok(value)) => {
                    let encoded = serde_json::to_value(&value)
                        .map_err(|e| checkpoint_err(e.into()))?;
                    self.checkpoints
                        .save(&self.run, name, &encoded)
                        .await
                        .map_err(checkpoint_err)?;
                    debug!(
                        run = %self.run,
                        step = name,
                        attempt,
                        elapsed_ms = attempt_t0.elapsed().as_millis() as u64,
                        "Step committed"
                    );
                    return Ok(value);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {:?}", policy.timeout()),
            }

            if attempt < attempts {
                let delay = policy.delay_after(attempt);
                warn!(
                    run = %self.run,
                    step = name,
                    attempt,
                    max = attempts,
                    elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                    ?delay,
                    error = %last_error,
                    "Step attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }

        error!(
            run = %self.run,
            step = name,
            attempts,
            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
            error = %last_error,
            "Step exhausted retries"
        );
        Err(StepError::Exhausted {
            step: name.to_string(),
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::{Backoff, MemoryCheckpoints};
    use std::cell::Cell;
    use std::time::Duration;

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay_ms: 1000,
            backoff: Backoff::Exponential,
            timeout_ms: 5000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let checkpoints = MemoryCheckpoints::new();
        let exec = StepExecutor::new(RunId::from("r"), &checkpoints);
        let calls = Cell::new(0u32);

        let value: u32 = exec
            .execute("flaky", &policy(3), || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err("boom") } else { Ok(n) } }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts_and_last_error() {
        let checkpoints = MemoryCheckpoints::new();
        let exec = StepExecutor::new(RunId::from("r"), &checkpoints);
        let calls = Cell::new(0u32);

        let err = exec
            .execute::<u32, _, _, _>("always fails", &policy(2), || {
                calls.set(calls.get() + 1);
                async { Err::<u32, _>("nope") }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 3);
        match err {
            StepError::Exhausted { attempts, last_error, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(checkpoints.count(&RunId::from("r")).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let checkpoints = MemoryCheckpoints::new();
        let exec = StepExecutor::new(RunId::from("r"), &checkpoints);
        let calls = Cell::new(0u32);

        let value: String = exec
            .execute("slow first", &policy(1), || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        sleep(Duration::from_secs(60)).await;
                    }
                    Ok::<_, String>("fast".to_string())
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "fast");
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_committed_step_is_not_rerun() {
        let checkpoints = MemoryCheckpoints::new();
        let calls = Cell::new(0u32);

        for _ in 0..2 {
            let exec = StepExecutor::new(RunId::from("resume"), &checkpoints);
            let value: Vec<i64> = exec
                .execute("get articles", &policy(0), || {
                    calls.set(calls.get() + 1);
                    async { Ok::<_, String>(vec![1, 2, 3]) }
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let checkpoints = MemoryCheckpoints::new();
        let exec = StepExecutor::new(RunId::from("r"), &checkpoints);
        let started = tokio::time::Instant::now();

        let _ = exec
            .execute::<u32, _, _, _>("waits", &policy(2), || async { Err::<u32, _>("x") })
            .await;

        // 1s after the first failure, 2s after the second
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
