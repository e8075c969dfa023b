//! The engine pool
//!
//! Owns all worker slots and the synchronized state around them. Requests
//! are dispatched to the live worker with the fewest pending requests; the
//! central [`RetryPolicy`](crate::retry::RetryPolicy) governs recovery, with
//! a failed attempt steered away from the worker that produced it.

use crate::connection::EngineLauncher;
use crate::error::EngineError;
use crate::retry::RetryPolicy;
use crate::worker::{EngineWorker, Evaluation, WorkerCommand, WorkerConfig, WorkerRequest, WorkerReply};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

/// Identity of one request within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One batch entry
#[derive(Debug, Clone)]
pub struct EvalRequest {
    /// Caller-chosen identity the result is keyed by
    pub id: JobId,
    /// Transport-encoded build token
    pub token: String,
    /// Allocation size of the submitted build, for the import-defect check
    pub expected_nodes: u64,
}

/// Pool configuration
#[derive(Debug, Clone, Copy)]
pub struct EnginePoolConfig {
    /// Number of worker slots
    pub workers: usize,
    /// Watchdog bound per request
    pub request_timeout: Duration,
    /// Bound on engine initialization before the ready signal
    pub ready_timeout: Duration,
    /// Launch attempts per connection before a start fails
    pub max_start_attempts: u32,
    /// Connection restarts per slot before it goes dead
    pub max_restarts: u32,
    /// Retry policy applied to every request
    pub retry: RetryPolicy,
    /// Delay between launch attempts
    pub start_backoff: Duration,
    /// Grace period between exit request and hard kill
    pub shutdown_grace: Duration,
    /// Per-worker command queue depth
    pub queue_depth: usize,
}

impl Default for EnginePoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            request_timeout: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(120),
            max_start_attempts: 3,
            max_restarts: 3,
            retry: RetryPolicy::default(),
            start_backoff: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(2),
            queue_depth: 32,
        }
    }
}

impl EnginePoolConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// With a request watchdog bound
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, bound: Duration) -> Self {
        self.request_timeout = bound;
        self
    }

    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            request_timeout: self.request_timeout,
            ready_timeout: self.ready_timeout,
            max_start_attempts: self.max_start_attempts,
            max_restarts: self.max_restarts,
            start_backoff: self.start_backoff,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

/// Pool counters, for logs and the final report
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Engine processes launched, restarts included
    pub launched: u64,
    /// Connections torn down and charged to a restart budget
    pub restarts: u64,
    /// Requests completed successfully
    pub completed: u64,
    /// Requests that exhausted their retry budget or failed terminally
    pub failed: u64,
    /// Retry attempts performed
    pub retried: u64,
}

struct Slot {
    id: usize,
    tx: mpsc::Sender<WorkerCommand>,
    pending: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
}

/// Pool of persistent engine workers
pub struct EnginePool {
    slots: Vec<Slot>,
    stats: Arc<Mutex<PoolStats>>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl EnginePool {
    /// Start the pool and verify at least one worker comes up
    ///
    /// Every slot is probed with a liveness ping, which forces its first
    /// engine launch and ready handshake. Slots that fail their bounded
    /// start attempts stay dead; if none survive the pool is unusable.
    ///
    /// # Errors
    /// Returns [`EngineError::PoolUnavailable`] when no worker answers.
    pub async fn connect(
        launcher: Arc<dyn EngineLauncher>,
        config: EnginePoolConfig,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        let stats = Arc::new(Mutex::new(PoolStats::default()));
        let mut slots = Vec::with_capacity(config.workers);

        for id in 0..config.workers.max(1) {
            let (tx, rx) = mpsc::channel(config.queue_depth);
            let pending = Arc::new(AtomicUsize::new(0));
            let alive = Arc::new(AtomicBool::new(true));
            let worker = EngineWorker::new(
                id,
                Arc::clone(&launcher),
                config.worker_config(),
                Arc::clone(&alive),
                Arc::clone(&stats),
            );
            tokio::spawn(worker.run(rx, cancel.clone()));
            slots.push(Slot {
                id,
                tx,
                pending,
                alive,
            });
        }

        let pool = Self {
            slots,
            stats,
            retry: config.retry,
            cancel,
        };

        let health = pool.ping().await;
        let ready = health.iter().filter(|(_, ok)| *ok).count();
        if ready == 0 {
            pool.shutdown().await;
            return Err(EngineError::PoolUnavailable);
        }
        tracing::info!(ready, total = pool.slots.len(), "engine pool online");
        Ok(pool)
    }

    /// Evaluate one build token under the retry policy
    ///
    /// `expected_nodes` is the allocation size of the submitted build; it
    /// feeds the worker-side import-defect check.
    ///
    /// # Errors
    /// Terminal errors propagate as-is; retryable errors surface only after
    /// the policy's attempt budget is spent.
    pub async fn evaluate(
        &self,
        token: &str,
        expected_nodes: u64,
    ) -> Result<Evaluation, EngineError> {
        let mut avoid = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let slot = self.pick(avoid)?;
            let request = WorkerRequest::Eval {
                token: token.to_string(),
                expected_nodes,
            };

            match self.dispatch(slot, request).await {
                Ok(WorkerReply::Evaluation(evaluation)) => {
                    self.stats.lock().await.completed += 1;
                    return Ok(evaluation);
                }
                Ok(WorkerReply::Pong) => {
                    return Err(EngineError::Protocol(
                        "ping reply to an eval request".to_string(),
                    ));
                }
                Err(error) => {
                    if attempt >= self.retry.max_attempts || !self.retry.retryable(&error) {
                        self.stats.lock().await.failed += 1;
                        return Err(error);
                    }
                    tracing::warn!(
                        worker = slot.id,
                        attempt,
                        %error,
                        "evaluation attempt failed, retrying elsewhere"
                    );
                    self.stats.lock().await.retried += 1;
                    avoid = Some(slot.id);
                    tokio::time::sleep(self.retry.backoff_for(attempt)).await;
                }
            }
        }
    }

    /// Evaluate many independent requests, keyed by [`JobId`]
    ///
    /// Fan-out across workers, fan-in awaiting the whole batch. Failures are
    /// isolated per entry; one bad build never aborts its batch-mates.
    pub async fn evaluate_batch(
        &self,
        requests: Vec<EvalRequest>,
    ) -> Vec<(JobId, Result<Evaluation, EngineError>)> {
        let jobs = requests.into_iter().map(|request| async move {
            let result = self.evaluate(&request.token, request.expected_nodes).await;
            (request.id, result)
        });
        futures::future::join_all(jobs).await
    }

    /// Probe every slot without consuming an evaluation
    pub async fn ping(&self) -> Vec<(usize, bool)> {
        let probes = self.slots.iter().map(|slot| async move {
            let ok = matches!(
                self.dispatch(slot, WorkerRequest::Ping).await,
                Ok(WorkerReply::Pong)
            );
            (slot.id, ok)
        });
        futures::future::join_all(probes).await
    }

    /// Workers still accepting requests
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Snapshot of the pool counters
    pub async fn stats(&self) -> PoolStats {
        self.stats.lock().await.clone()
    }

    /// Gracefully stop every worker, hard-killing after the grace period
    pub async fn shutdown(&self) {
        let waits = self.slots.iter().map(|slot| async move {
            let (done_tx, done_rx) = oneshot::channel();
            if slot.tx.send(WorkerCommand::Shutdown { done: done_tx }).await.is_ok() {
                let _ = done_rx.await;
            }
        });
        futures::future::join_all(waits).await;
        tracing::info!("engine pool shut down");
    }

    fn pick(&self, avoid: Option<usize>) -> Result<&Slot, EngineError> {
        let preferred = self
            .slots
            .iter()
            .filter(|slot| slot.alive.load(Ordering::SeqCst) && Some(slot.id) != avoid)
            .min_by_key(|slot| slot.pending.load(Ordering::SeqCst));

        // with a single live worker, retrying on it beats not retrying
        preferred
            .or_else(|| {
                self.slots
                    .iter()
                    .filter(|slot| slot.alive.load(Ordering::SeqCst))
                    .min_by_key(|slot| slot.pending.load(Ordering::SeqCst))
            })
            .ok_or(EngineError::PoolUnavailable)
    }

    async fn dispatch(
        &self,
        slot: &Slot,
        request: WorkerRequest,
    ) -> Result<WorkerReply, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        slot.pending.fetch_add(1, Ordering::SeqCst);

        let sent = slot
            .tx
            .send(WorkerCommand::Request {
                request,
                reply: reply_tx,
            })
            .await;
        if sent.is_err() {
            slot.pending.fetch_sub(1, Ordering::SeqCst);
            slot.alive.store(false, Ordering::SeqCst);
            return Err(EngineError::Transport(format!("worker {} is gone", slot.id)));
        }

        let result = tokio::select! {
            () = self.cancel.cancelled() => Err(EngineError::Cancelled),
            reply = reply_rx => match reply {
                Ok(outcome) => outcome,
                Err(_) => {
                    slot.alive.store(false, Ordering::SeqCst);
                    Err(EngineError::Transport(format!(
                        "worker {} terminated mid-request",
                        slot.id
                    )))
                }
            }
        };

        slot.pending.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
