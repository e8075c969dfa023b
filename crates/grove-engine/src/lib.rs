//! Persistent calculation-engine worker pool
//!
//! The engine is slow to start, fragile, and only trustworthy in relative
//! terms. This crate turns its one-shot invocation model into a reusable
//! service:
//! - Line-oriented request/response protocol with a ready handshake
//! - Worker slots with watchdog timeouts, crash detection, and bounded
//!   lazy restarts
//! - A central retry policy instead of ad-hoc recovery at call sites
//! - Batch submission with per-request failure isolation
//! - Verify-and-recover for the engine's known import defect (an eval whose
//!   tree substructure came back empty is re-run once with a forced reload
//!   before it may fail as unsupported)

pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod retry;
pub mod worker;

pub use connection::{EngineConnection, EngineLauncher, ProcessLauncher};
pub use error::EngineError;
pub use pool::{EnginePool, EnginePoolConfig, EvalRequest, JobId, PoolStats};
pub use protocol::{EngineRequest, EngineResponse, FailureCategory};
pub use retry::RetryPolicy;
pub use worker::Evaluation;
