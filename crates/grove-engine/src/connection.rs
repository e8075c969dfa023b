//! Engine transport seam
//!
//! [`EngineConnection`] is the boundary between the pool and whatever is on
//! the other end of the pipe: a real engine subprocess in production, a
//! scripted in-memory engine in tests. Workers own their connection
//! exclusively; nothing here is shared.

use crate::error::EngineError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// One bidirectional line stream to an engine
#[async_trait]
pub trait EngineConnection: Send {
    /// Write one protocol line
    async fn send(&mut self, line: &str) -> Result<(), EngineError>;

    /// Read one protocol line; `None` means the engine closed the stream
    async fn recv(&mut self) -> Result<Option<String>, EngineError>;

    /// Forcibly terminate the engine
    async fn kill(&mut self);
}

/// Factory for engine connections
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// Start a fresh engine instance
    async fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError>;
}

/// Connection over a spawned engine subprocess' stdio
pub struct ProcessConnection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl EngineConnection for ProcessConnection {
    async fn send(&mut self, line: &str) -> Result<(), EngineError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, EngineError> {
        self.stdout
            .next_line()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))
    }

    async fn kill(&mut self) {
        if let Err(error) = self.child.kill().await {
            tracing::debug!(%error, "engine process already gone");
        }
    }
}

/// Launches the engine harness as a subprocess
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Launcher for `program args...`
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Startup(format!("{}: {e}", self.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Startup("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Startup("no stdout pipe".to_string()))?;

        tracing::debug!(program = %self.program, pid = child.id(), "engine process spawned");

        Ok(Box::new(ProcessConnection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        }))
    }
}
