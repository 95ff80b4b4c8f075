//! Domain-aware rate limiting for batches of fetches.
//!
//! [`DomainRateLimiter::process_batch`] runs one operation per item while
//! enforcing three bounds:
//!
//! - at most `max_concurrent` operations in flight at once
//! - no two operations (any domain) start within `global_cooldown`
//! - no two operations against the same domain start within `domain_cooldown`
//!
//! Scheduling decisions are made by a single dispatcher that owns all limiter
//! state. Workers ask it for a start permit over a channel and hand the permit
//! back (by dropping it) when their operation finishes, so no lock guards the
//! per-domain timestamps.
//!
//! The limiter knows nothing about what the operation does and never retries
//! it. One failing operation does not delay or cancel the others.
//!
//! Limiter state carries over between batches processed by the same
//! limiter, so a domain touched at the end of one chunk still cools down
//! before the next chunk touches it.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, instrument, trace};

use crate::config::LimiterConfig;

/// One unit of work handed to the batch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTask<T> {
    pub item: T,
    /// Domain key the item was scheduled under.
    pub domain: String,
    /// Index of the item in the submitted batch.
    pub position: usize,
}

/// Output of one operation, tagged with the item it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<R> {
    pub position: usize,
    pub domain: String,
    pub output: R,
}

/// Bookkeeping owned by the dispatcher.
#[derive(Debug, Default)]
pub struct RateLimiterState {
    last_dispatch: Option<Instant>,
    domain_last_dispatch: HashMap<String, Instant>,
    in_flight: usize,
}

impl RateLimiterState {
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn tracked_domains(&self) -> usize {
        self.domain_last_dispatch.len()
    }
}

enum Request {
    Acquire {
        domain: String,
        grant: oneshot::Sender<()>,
    },
    Release,
}

/// Held by a worker while its operation runs; dropping it frees the slot.
struct Permit {
    tx: mpsc::UnboundedSender<Request>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Release);
    }
}

async fn acquire(tx: &mpsc::UnboundedSender<Request>, domain: &str) -> Permit {
    let (grant, granted) = oneshot::channel();
    let _ = tx.send(Request::Acquire {
        domain: domain.to_string(),
        grant,
    });
    // The dispatcher outlives every sender, so a closed grant only happens
    // during shutdown.
    let _ = granted.await;
    Permit { tx: tx.clone() }
}

struct Waiter {
    domain: String,
    grant: oneshot::Sender<()>,
}

struct Dispatcher {
    max_concurrent: usize,
    global_cooldown: Duration,
    domain_cooldown: Duration,
    state: RateLimiterState,
    pending: VecDeque<Waiter>,
}

impl Dispatcher {
    fn new(config: &LimiterConfig, state: RateLimiterState) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            global_cooldown: config.global_cooldown(),
            domain_cooldown: config.domain_cooldown(),
            state,
            pending: VecDeque::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) -> RateLimiterState {
        loop {
            let wake = self.dispatch_ready(Instant::now());
            let deadline = wake.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(Request::Acquire { domain, grant }) => {
                        self.pending.push_back(Waiter { domain, grant });
                    }
                    Some(Request::Release) => {
                        self.state.in_flight = self.state.in_flight.saturating_sub(1);
                    }
                    None => break,
                },
                _ = sleep_until(deadline), if wake.is_some() => {}
            }
        }
        self.state
    }

    /// Grant every waiter that may start now. Returns when the next waiter
    /// becomes eligible, if the only thing holding it back is a cooldown.
    fn dispatch_ready(&mut self, now: Instant) -> Option<Instant> {
        loop {
            if self.pending.is_empty() || self.state.in_flight >= self.max_concurrent {
                return None;
            }

            if let Some(last) = self.state.last_dispatch {
                let ready_at = last + self.global_cooldown;
                if now < ready_at {
                    return Some(ready_at);
                }
            }

            let mut earliest: Option<Instant> = None;
            let domain_last = &self.state.domain_last_dispatch;
            let cooldown = self.domain_cooldown;
            let next = self.pending.iter().position(|w| match domain_last.get(&w.domain) {
                Some(last) if now < *last + cooldown => {
                    let ready_at = *last + cooldown;
                    earliest = Some(earliest.map_or(ready_at, |e| e.min(ready_at)));
                    false
                }
                _ => true,
            });

            let Some(index) = next else {
                return earliest;
            };
            let Some(waiter) = self.pending.remove(index) else {
                return earliest;
            };

            // a requester that went away never occupies a slot
            if waiter.grant.send(()).is_ok() {
                self.state.in_flight += 1;
                self.state.last_dispatch = Some(now);
                self.state
                    .domain_last_dispatch
                    .insert(waiter.domain.clone(), now);
                trace!(domain = %waiter.domain, in_flight = self.state.in_flight, "Dispatched");
            }
        }
    }
}

/// Rate limiter scoped to one workflow run.
#[derive(Debug)]
pub struct DomainRateLimiter {
    config: LimiterConfig,
    state: RateLimiterState,
}

impl DomainRateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            state: RateLimiterState::default(),
        }
    }

    pub fn state(&self) -> &RateLimiterState {
        &self.state
    }

    /// Run `op` once per item under the limiter's bounds.
    ///
    /// `domain_of` derives each item's domain key. Results come back in
    /// completion order; [`BatchResult::position`] maps each one back to its
    /// item.
    #[instrument(level = "debug", skip_all, fields(items = items.len()))]
    pub async fn process_batch<T, R, K, F, Fut>(
        &mut self,
        items: Vec<T>,
        domain_of: K,
        op: F,
    ) -> Vec<BatchResult<R>>
    where
        K: Fn(&T) -> String,
        F: Fn(FetchTask<T>) -> Fut,
        Fut: Future<Output = R>,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(&self.config, std::mem::take(&mut self.state)).run(rx);

        let width = items.len();
        let op = &op;
        let domain_of = &domain_of;
        let work = async move {
            let tx = tx;
            stream::iter(items.into_iter().enumerate())
                .map(|(position, item)| {
                    let domain = domain_of(&item);
                    let tx = tx.clone();
                    async move {
                        let permit = acquire(&tx, &domain).await;
                        let output = op(FetchTask {
                            item,
                            domain: domain.clone(),
                            position,
                        })
                        .await;
                        drop(permit);
                        BatchResult {
                            position,
                            domain,
                            output,
                        }
                    }
                })
                .buffer_unordered(width)
                .collect::<Vec<_>>()
                .await
        };

        let (state, results) = tokio::join!(dispatcher, work);
        debug!(
            completed = results.len(),
            domains = state.tracked_domains(),
            "Batch complete"
        );
        self.state = state;
        results
    }
}
