//! One engine worker slot
//!
//! A worker owns a single engine connection and services requests from its
//! channel one at a time. Connections are established lazily: a crashed
//! worker respawns on its next assigned request, until its restart budget
//! runs out and the slot goes dead.

use crate::connection::{EngineConnection, EngineLauncher};
use crate::error::EngineError;
use crate::pool::PoolStats;
use crate::protocol::{self, EngineRequest, EngineResponse, FailureCategory};
use grove_stats::StatSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Successful evaluation of one build
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Derived stat record
    pub stats: StatSnapshot,
    /// Nodes the engine materialized in its tree substructure
    pub allocated: u64,
}

/// Request routed to a worker slot
#[derive(Debug)]
pub(crate) enum WorkerRequest {
    /// Evaluate a build token; `expected_nodes` is the allocation size the
    /// submitting side knows about, used by the import-defect check
    Eval {
        token: String,
        expected_nodes: u64,
    },
    /// Liveness probe
    Ping,
}

/// Reply to a [`WorkerRequest`]
#[derive(Debug)]
pub(crate) enum WorkerReply {
    Evaluation(Evaluation),
    Pong,
}

/// Commands accepted by a worker task
pub(crate) enum WorkerCommand {
    Request {
        request: WorkerRequest,
        reply: oneshot::Sender<Result<WorkerReply, EngineError>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Per-worker tuning, derived from the pool config
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerConfig {
    pub request_timeout: Duration,
    pub ready_timeout: Duration,
    pub max_start_attempts: u32,
    pub max_restarts: u32,
    pub start_backoff: Duration,
    pub shutdown_grace: Duration,
}

pub(crate) struct EngineWorker {
    id: usize,
    launcher: Arc<dyn EngineLauncher>,
    config: WorkerConfig,
    conn: Option<Box<dyn EngineConnection>>,
    restarts: u32,
    alive: Arc<AtomicBool>,
    stats: Arc<Mutex<PoolStats>>,
}

impl EngineWorker {
    pub(crate) fn new(
        id: usize,
        launcher: Arc<dyn EngineLauncher>,
        config: WorkerConfig,
        alive: Arc<AtomicBool>,
        stats: Arc<Mutex<PoolStats>>,
    ) -> Self {
        Self {
            id,
            launcher,
            config,
            conn: None,
            restarts: 0,
            alive,
            stats,
        }
    }

    /// Service requests until shutdown, cancellation, or slot death
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<WorkerCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.graceful_exit().await;
                    break;
                }
                command = rx.recv() => match command {
                    Some(WorkerCommand::Request { request, reply }) => {
                        let result = self.handle(request).await;
                        let _ = reply.send(result);
                        if !self.alive.load(Ordering::SeqCst) {
                            tracing::warn!(worker = self.id, "slot dead, worker task exiting");
                            break;
                        }
                    }
                    Some(WorkerCommand::Shutdown { done }) => {
                        self.graceful_exit().await;
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.graceful_exit().await;
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&mut self, request: WorkerRequest) -> Result<WorkerReply, EngineError> {
        match request {
            WorkerRequest::Eval {
                token,
                expected_nodes,
            } => self
                .evaluate(&token, expected_nodes)
                .await
                .map(WorkerReply::Evaluation),
            WorkerRequest::Ping => self.ping().await.map(|()| WorkerReply::Pong),
        }
    }

    /// Evaluate a build, applying the import-defect recovery
    ///
    /// The engine's import path sometimes fails to materialize the tree
    /// substructure, which makes every tree-derived stat silently wrong.
    /// An evaluation reporting zero materialized nodes for a build that
    /// allocates some is re-run exactly once with a forced reload; if the
    /// substructure is still empty the build is unsupported.
    async fn evaluate(
        &mut self,
        token: &str,
        expected_nodes: u64,
    ) -> Result<Evaluation, EngineError> {
        let first = self
            .exchange(&EngineRequest::Eval {
                build: token.to_string(),
                force_reload: false,
            })
            .await?;
        let evaluation = interpret(first)?;

        if evaluation.allocated > 0 || expected_nodes == 0 {
            return Ok(evaluation);
        }

        tracing::warn!(
            worker = self.id,
            expected_nodes,
            "tree substructure empty after import, forcing reload"
        );
        let second = self
            .exchange(&EngineRequest::Eval {
                build: token.to_string(),
                force_reload: true,
            })
            .await?;
        let recovered = interpret(second)?;

        if recovered.allocated == 0 {
            return Err(EngineError::Unsupported(
                "tree allocation failed to materialize after forced reload".to_string(),
            ));
        }
        Ok(recovered)
    }

    async fn ping(&mut self) -> Result<(), EngineError> {
        match self.exchange(&EngineRequest::Ping).await? {
            EngineResponse::Pong => Ok(()),
            other => Err(EngineError::Protocol(format!(
                "expected pong, got {other:?}"
            ))),
        }
    }

    /// One request/response round trip with the watchdog applied
    async fn exchange(&mut self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        self.ensure_connection().await?;
        let line = protocol::encode_line(request)?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(EngineError::Transport("no connection".to_string()));
        };

        if let Err(error) = conn.send(&line).await {
            self.teardown().await;
            return Err(error);
        }

        match timeout(self.config.request_timeout, conn.recv()).await {
            Err(_) => {
                tracing::warn!(worker = self.id, "watchdog timeout, killing engine");
                self.teardown().await;
                Err(EngineError::Timeout(self.config.request_timeout))
            }
            Ok(Err(error)) => {
                self.teardown().await;
                Err(error)
            }
            Ok(Ok(None)) => {
                self.teardown().await;
                Err(EngineError::Transport(
                    "engine closed the stream".to_string(),
                ))
            }
            Ok(Ok(Some(line))) => match protocol::decode_response(&line) {
                Ok(response) => Ok(response),
                Err(error) => {
                    // a garbled line means the stream is desynced
                    self.teardown().await;
                    Err(error)
                }
            },
        }
    }

    /// Launch and handshake if the slot has no live connection
    async fn ensure_connection(&mut self) -> Result<(), EngineError> {
        if self.conn.is_some() {
            return Ok(());
        }
        if self.restarts > self.config.max_restarts {
            self.alive.store(false, Ordering::SeqCst);
            return Err(EngineError::Startup(format!(
                "worker {} exceeded its restart budget",
                self.id
            )));
        }

        let mut last = String::new();
        for attempt in 1..=self.config.max_start_attempts {
            match self.try_launch().await {
                Ok(conn) => {
                    self.conn = Some(conn);
                    let mut stats = self.stats.lock().await;
                    stats.launched += 1;
                    tracing::info!(worker = self.id, attempt, "engine worker ready");
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(worker = self.id, attempt, %error, "engine start failed");
                    last = error.to_string();
                    tokio::time::sleep(self.config.start_backoff * attempt).await;
                }
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        Err(EngineError::Startup(format!(
            "worker {} gave up after {} attempts: {last}",
            self.id, self.config.max_start_attempts
        )))
    }

    async fn try_launch(&mut self) -> Result<Box<dyn EngineConnection>, EngineError> {
        let mut conn = self.launcher.launch().await?;
        match timeout(self.config.ready_timeout, conn.recv()).await {
            Ok(Ok(Some(line))) if matches!(protocol::decode_response(&line), Ok(EngineResponse::Ready)) => {
                Ok(conn)
            }
            Ok(Ok(Some(line))) => {
                conn.kill().await;
                Err(EngineError::Startup(format!(
                    "expected ready signal, got: {line:.80}"
                )))
            }
            Ok(Ok(None)) | Ok(Err(_)) => {
                conn.kill().await;
                Err(EngineError::Startup(
                    "engine exited during initialization".to_string(),
                ))
            }
            Err(_) => {
                conn.kill().await;
                Err(EngineError::Startup(format!(
                    "no ready signal within {:?}",
                    self.config.ready_timeout
                )))
            }
        }
    }

    /// Kill the connection and charge the restart budget
    async fn teardown(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.kill().await;
        }
        self.restarts += 1;
        self.stats.lock().await.restarts += 1;
        if self.restarts > self.config.max_restarts {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    /// Ask the engine to exit, then kill it after the grace period
    async fn graceful_exit(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Ok(line) = protocol::encode_line(&EngineRequest::Exit) {
                if conn.send(&line).await.is_ok() {
                    let drained = timeout(self.config.shutdown_grace, async {
                        while matches!(conn.recv().await, Ok(Some(_))) {}
                    })
                    .await;
                    if drained.is_err() {
                        tracing::warn!(worker = self.id, "engine ignored exit, hard killing");
                    }
                }
            }
            conn.kill().await;
        }
    }
}

fn interpret(response: EngineResponse) -> Result<Evaluation, EngineError> {
    match response {
        EngineResponse::Stats { stats, allocated } => Ok(Evaluation { stats, allocated }),
        EngineResponse::Failure {
            category: FailureCategory::Unsupported,
            message,
        } => Err(EngineError::Unsupported(message)),
        EngineResponse::Failure {
            category: FailureCategory::Internal,
            message,
        } => Err(EngineError::Engine(message)),
        other => Err(EngineError::Protocol(format!(
            "unexpected response to eval: {other:?}"
        ))),
    }
}
