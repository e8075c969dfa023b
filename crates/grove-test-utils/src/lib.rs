//! Testing utilities for the Grove workspace
//!
//! Scripted in-memory engines, tree fixtures, and build helpers.

#![allow(missing_docs)]

use async_trait::async_trait;
use grove_build::{Build, BuildCodec, HexJsonCodec};
use grove_engine::protocol::{self, EngineRequest, EngineResponse, FailureCategory};
use grove_engine::{EngineConnection, EngineError, EngineLauncher};
use grove_stats::{StatKey, StatSnapshot};
use grove_tree::{AllocationSet, NodeId, PassiveTree};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What a scripted engine does with one request
pub enum ScriptAction {
    /// Reply with a response line
    Respond(EngineResponse),
    /// Never reply; lets watchdog-timeout paths fire
    Silence,
    /// Close the stream, as a crashed engine would
    Die,
}

type Script = Arc<dyn Fn(&EngineRequest) -> ScriptAction + Send + Sync>;

/// In-memory [`EngineConnection`] driven by a script
///
/// Emits the ready handshake on creation (unless muted), then answers each
/// request per the script. An `Exit` request closes the stream like a
/// well-behaved engine.
pub struct ScriptedConnection {
    script: Script,
    queue: VecDeque<String>,
    closed: bool,
}

impl ScriptedConnection {
    fn new(script: Script, ready: bool) -> Self {
        let mut queue = VecDeque::new();
        if ready {
            queue.push_back(
                protocol::encode_line(&EngineResponse::Ready).expect("ready line encodes"),
            );
        }
        Self {
            script,
            queue,
            closed: false,
        }
    }
}

#[async_trait]
impl EngineConnection for ScriptedConnection {
    async fn send(&mut self, line: &str) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Transport("scripted engine closed".to_string()));
        }
        let request = protocol::decode_request(line)?;
        if matches!(request, EngineRequest::Exit) {
            self.closed = true;
            return Ok(());
        }
        match (self.script)(&request) {
            ScriptAction::Respond(response) => {
                self.queue.push_back(protocol::encode_line(&response)?);
            }
            ScriptAction::Silence => {}
            ScriptAction::Die => self.closed = true,
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, EngineError> {
        if let Some(line) = self.queue.pop_front() {
            return Ok(Some(line));
        }
        if self.closed {
            return Ok(None);
        }
        // nothing queued and not closed: behave like a hung engine
        futures::future::pending().await
    }

    async fn kill(&mut self) {
        self.closed = true;
        self.queue.clear();
    }
}

/// Launcher producing [`ScriptedConnection`]s
///
/// The script must answer `Ping` (the pool probes every slot at startup).
/// `with_failed_launches(n)` makes the first `n` launch calls fail outright;
/// `with_muted_ready(m)` makes the next `m` connections skip the ready
/// handshake so startup-timeout paths can be exercised.
pub struct ScriptedLauncher {
    script: Script,
    launches: AtomicUsize,
    failed_launches: usize,
    muted_ready: usize,
}

impl ScriptedLauncher {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&EngineRequest) -> ScriptAction + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            launches: AtomicUsize::new(0),
            failed_launches: 0,
            muted_ready: 0,
        }
    }

    #[must_use]
    pub fn with_failed_launches(mut self, count: usize) -> Self {
        self.failed_launches = count;
        self
    }

    #[must_use]
    pub fn with_muted_ready(mut self, count: usize) -> Self {
        self.muted_ready = count;
        self
    }

    /// Number of launch calls so far
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError> {
        let index = self.launches.fetch_add(1, Ordering::SeqCst);
        if index < self.failed_launches {
            return Err(EngineError::Startup("scripted launch failure".to_string()));
        }
        let ready = index >= self.failed_launches + self.muted_ready;
        Ok(Box::new(ScriptedConnection::new(
            Arc::clone(&self.script),
            ready,
        )))
    }
}

/// Launcher whose script sees decoded builds instead of raw tokens
///
/// Answers `Ping` itself; eval tokens are decoded with [`HexJsonCodec`] and
/// handed to `f` along with the `force_reload` flag.
pub fn launcher_from_build_fn<F>(f: F) -> ScriptedLauncher
where
    F: Fn(&Build, bool) -> EngineResponse + Send + Sync + 'static,
{
    ScriptedLauncher::new(move |request| match request {
        EngineRequest::Ping => ScriptAction::Respond(EngineResponse::Pong),
        EngineRequest::Exit => ScriptAction::Die,
        EngineRequest::Eval {
            build,
            force_reload,
        } => match HexJsonCodec.decode(build) {
            Ok(decoded) => ScriptAction::Respond(f(&decoded, *force_reload)),
            Err(error) => ScriptAction::Respond(EngineResponse::Failure {
                category: FailureCategory::Internal,
                message: error.to_string(),
            }),
        },
    })
}

/// Stats response helper
#[must_use]
pub fn stats_response(pairs: &[(StatKey, f64)], allocated: u64) -> EngineResponse {
    EngineResponse::Stats {
        stats: pairs.iter().cloned().collect::<StatSnapshot>(),
        allocated,
    }
}

/// Unsupported-failure response helper
#[must_use]
pub fn unsupported_response(message: &str) -> EngineResponse {
    EngineResponse::Failure {
        category: FailureCategory::Unsupported,
        message: message.to_string(),
    }
}

/// Straight path `1 - 2 - ... - n`, root 1, version `test`
#[must_use]
pub fn chain_tree(n: u32) -> PassiveTree {
    let nodes: Vec<serde_json::Value> = (1..=n)
        .map(|id| {
            let mut connections = Vec::new();
            if id < n {
                connections.push(id + 1);
            }
            serde_json::json!({"id": id, "connections": connections})
        })
        .collect();
    let dataset = serde_json::json!({"version": "test", "root": 1, "nodes": nodes});
    PassiveTree::from_json_str(&dataset.to_string()).expect("fixture tree parses")
}

/// Small tree with a notable and a mastery:
///
/// ```text
/// 1(root) - 2 - 3(notable)
///            \- 4(mastery: 1 life, 2 damage)
///            \- 5
/// ```
#[must_use]
pub fn mastery_tree() -> PassiveTree {
    let dataset = serde_json::json!({
        "version": "test",
        "root": 1,
        "nodes": [
            {"id": 1, "name": "start", "connections": [2]},
            {"id": 2, "name": "path", "connections": [3, 4, 5]},
            {"id": 3, "name": "Heavy Hitter", "kind": "notable",
             "stats": ["30% increased Damage"]},
            {"id": 4, "name": "Life Mastery", "kind": "mastery",
             "mastery_effects": [
                 {"id": 1, "stats": ["+50 to maximum Life"]},
                 {"id": 2, "stats": ["20% increased Damage"]}
             ]},
            {"id": 5, "name": "spur"}
        ]
    });
    PassiveTree::from_json_str(&dataset.to_string()).expect("fixture tree parses")
}

/// Build on the fixture version with the given nodes allocated
#[must_use]
pub fn fixture_build(nodes: &[u32], baseline: &[(StatKey, f64)]) -> Build {
    let allocation = AllocationSet::from_nodes(nodes.iter().copied().map(NodeId));
    Build::new("test", 90)
        .with_allocation(allocation)
        .with_baseline(baseline.iter().cloned().collect())
}

/// Encode a build with the reference codec
#[must_use]
pub fn encode_build(build: &Build) -> String {
    HexJsonCodec.encode(build).expect("fixture build encodes")
}
