//! The greedy iteration loop
//!
//! Idle -> Evaluating(batch) -> Selecting, repeated until no candidate
//! clears the improvement threshold, the iteration cap is hit, the run is
//! cancelled, or the pool dies. The incumbent only ever improves; a rejected
//! iteration is the terminal one.

use crate::candidates::CandidateGenerator;
use crate::error::OptimizeError;
use crate::heuristics::MasteryScorer;
use grove_build::{verify_round_trip, Build, BuildCodec};
use grove_engine::{EngineError, EnginePool, EvalRequest, JobId};
use grove_stats::{extrapolate, Objective, StatKey, StatSnapshot};
use grove_tree::TreeError;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use crate::candidates::GeneratorLimits;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No candidate beat the incumbent by the threshold: a local optimum
    /// under the current mutation set
    Converged,
    /// Iteration cap reached with improvement still being found
    MaxIterations,
    /// Run-level cancellation
    Cancelled,
    /// No live workers remained
    PoolUnavailable,
    /// The engine failed every scorable path in an iteration
    EngineFailure,
}

/// One iteration of the log
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub iteration: u32,
    /// Candidates generated
    pub candidates: usize,
    /// Candidates lost to engine or codec failures
    pub errors: usize,
    /// Candidates excluded because no objective field was comparable
    pub skipped: usize,
    /// Label of the best-scoring candidate
    pub best_label: Option<String>,
    /// Its objective ratio against the incumbent
    pub best_score: Option<f64>,
    /// Whether it became the new incumbent
    pub accepted: bool,
}

/// Result of a run
///
/// Always carries the best incumbent found, even when the run ended on a
/// fatal pool condition; progress is never discarded.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutcome {
    /// Final (possibly unimproved) build
    pub build: Build,
    /// Extrapolated stat estimate for the final build
    pub estimate: StatSnapshot,
    /// Per-iteration log
    pub iterations: Vec<IterationRecord>,
    /// Whether the run ended at a local optimum
    pub converged: bool,
    /// Why the run stopped
    pub termination: TerminationReason,
    /// Last engine error observed, for reporting
    pub last_error: Option<String>,
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Objective being maximized
    pub objective: Objective,
    /// Iteration cap
    pub max_iterations: u32,
    /// Minimum ratio improvement over 1.0 a candidate must clear
    pub min_improvement: f64,
    /// Signed adjustment to the build's point budget
    pub budget_delta: i32,
    /// Candidate generation bounds
    pub limits: GeneratorLimits,
}

impl OptimizerConfig {
    /// Defaults for an objective
    #[must_use]
    pub fn new(objective: Objective) -> Self {
        Self {
            objective,
            max_iterations: 20,
            min_improvement: 0.005,
            budget_delta: 0,
            limits: GeneratorLimits::default(),
        }
    }

    /// With an iteration cap
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = cap;
        self
    }

    /// With an improvement threshold
    #[inline]
    #[must_use]
    pub fn with_min_improvement(mut self, threshold: f64) -> Self {
        self.min_improvement = threshold;
        self
    }

    /// With a point budget adjustment
    #[inline]
    #[must_use]
    pub fn with_budget_delta(mut self, delta: i32) -> Self {
        self.budget_delta = delta;
        self
    }

    /// With generation bounds
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: GeneratorLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// The greedy tree optimizer
pub struct Optimizer {
    tree: Arc<grove_tree::PassiveTree>,
    pool: Arc<EnginePool>,
    codec: Arc<dyn BuildCodec>,
    config: OptimizerConfig,
    cancel: CancellationToken,
}

struct Selected {
    score: f64,
    touched: usize,
    label: String,
    build: Build,
    estimate: StatSnapshot,
}

impl Optimizer {
    /// Optimizer over a tree, a pool, and a codec
    #[must_use]
    pub fn new(
        tree: Arc<grove_tree::PassiveTree>,
        pool: Arc<EnginePool>,
        codec: Arc<dyn BuildCodec>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            tree,
            pool,
            codec,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// With an external cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Optimize an initial build to a local optimum
    ///
    /// # Errors
    /// Only the initial input is fatal: a tree version mismatch, a
    /// disconnected initial allocation, or a codec that cannot round-trip
    /// the build. Everything after that is reported through the outcome.
    pub async fn run(&self, initial: Build) -> Result<OptimizeOutcome, OptimizeError> {
        self.tree.check_version(&initial.tree_version)?;
        if !initial.allocation.is_connected(&self.tree) {
            return Err(OptimizeError::Tree(TreeError::Disconnected));
        }
        verify_round_trip(self.codec.as_ref(), &initial)?;

        let generator = CandidateGenerator::new(
            Arc::clone(&self.tree),
            self.config.limits,
            MasteryScorer::for_objective(&self.config.objective),
        );
        let budget = budget_for(&initial, self.config.budget_delta);
        tracing::info!(
            objective = %self.config.objective,
            budget,
            points_spent = initial.allocation.points_spent(&self.tree),
            "optimization run starting"
        );

        let mut incumbent = initial;
        let mut trusted = incumbent.baseline.clone();
        let mut iterations: Vec<IterationRecord> = Vec::new();
        let mut converged = false;
        let mut termination = TerminationReason::MaxIterations;
        let mut last_error: Option<String> = None;

        for iteration in 1..=self.config.max_iterations {
            if self.cancel.is_cancelled() {
                termination = TerminationReason::Cancelled;
                break;
            }

            let candidates = generator.generate(&incumbent, budget);
            let generated = candidates.len();
            if generated == 0 {
                converged = true;
                termination = TerminationReason::Converged;
                break;
            }

            let fields = tracked_fields(&trusted, &self.config.objective);
            let mut errors = 0usize;
            let mut skipped = 0usize;

            // the incumbent's engine evaluation anchors every ratio
            let incumbent_token = verify_round_trip(self.codec.as_ref(), &incumbent)?;
            let engine_base = match self
                .pool
                .evaluate(&incumbent_token, incumbent.allocation.len() as u64)
                .await
            {
                Ok(evaluation) => evaluation.stats,
                Err(error) => {
                    tracing::error!(%error, iteration, "incumbent evaluation failed");
                    last_error = Some(error.to_string());
                    termination = reason_for(&error);
                    iterations.push(IterationRecord {
                        iteration,
                        candidates: generated,
                        errors: 1,
                        skipped: 0,
                        best_label: None,
                        best_score: None,
                        accepted: false,
                    });
                    break;
                }
            };

            // serialize, proving round-trip exactness per candidate
            let mut requests = Vec::with_capacity(generated);
            let mut entries = Vec::with_capacity(generated);
            for (index, candidate) in candidates.into_iter().enumerate() {
                let mut build = incumbent.clone();
                build.allocation = candidate.allocation.clone();
                match verify_round_trip(self.codec.as_ref(), &build) {
                    Ok(token) => {
                        let id = JobId(index as u64);
                        requests.push(EvalRequest {
                            id,
                            token,
                            expected_nodes: build.allocation.len() as u64,
                        });
                        entries.push((id, build, candidate));
                    }
                    Err(error) => {
                        errors += 1;
                        tracing::warn!(label = %candidate.label, %error, "candidate dropped");
                    }
                }
            }

            tracing::debug!(iteration, batch = requests.len(), "evaluating candidate batch");
            let results = self.pool.evaluate_batch(requests).await;

            let mut best: Option<Selected> = None;
            for (id, result) in results {
                let Some((_, build, candidate)) =
                    entries.iter().find(|(entry_id, _, _)| *entry_id == id)
                else {
                    continue;
                };
                match result {
                    Ok(evaluation) => {
                        let est = extrapolate(&trusted, &engine_base, &evaluation.stats, &fields);
                        match self.config.objective.score(&est) {
                            Some(score) => {
                                if is_better(&best, score, candidate.touched, &candidate.label) {
                                    best = Some(Selected {
                                        score,
                                        touched: candidate.touched,
                                        label: candidate.label.clone(),
                                        build: build.clone(),
                                        estimate: est.estimate,
                                    });
                                }
                            }
                            None => {
                                skipped += 1;
                                tracing::debug!(label = %candidate.label, "no comparable field");
                            }
                        }
                    }
                    Err(error) => {
                        errors += 1;
                        last_error = Some(error.to_string());
                        tracing::warn!(label = %candidate.label, %error, "candidate failed");
                    }
                }
            }

            match best {
                Some(selected) if selected.score > 1.0 + self.config.min_improvement => {
                    tracing::info!(
                        iteration,
                        label = %selected.label,
                        score = selected.score,
                        "candidate accepted"
                    );
                    iterations.push(IterationRecord {
                        iteration,
                        candidates: generated,
                        errors,
                        skipped,
                        best_label: Some(selected.label),
                        best_score: Some(selected.score),
                        accepted: true,
                    });
                    incumbent = selected.build;
                    for (key, value) in selected.estimate.iter() {
                        trusted.insert(key.clone(), value);
                    }
                }
                Some(selected) => {
                    tracing::info!(
                        iteration,
                        label = %selected.label,
                        score = selected.score,
                        "best candidate below threshold, converged"
                    );
                    iterations.push(IterationRecord {
                        iteration,
                        candidates: generated,
                        errors,
                        skipped,
                        best_label: Some(selected.label),
                        best_score: Some(selected.score),
                        accepted: false,
                    });
                    converged = true;
                    termination = TerminationReason::Converged;
                    break;
                }
                None => {
                    tracing::error!(iteration, errors, skipped, "no candidate could be scored");
                    iterations.push(IterationRecord {
                        iteration,
                        candidates: generated,
                        errors,
                        skipped,
                        best_label: None,
                        best_score: None,
                        accepted: false,
                    });
                    termination = TerminationReason::EngineFailure;
                    break;
                }
            }
        }

        tracing::info!(
            iterations = iterations.len(),
            accepted = iterations.iter().filter(|r| r.accepted).count(),
            converged,
            ?termination,
            "optimization run finished"
        );

        Ok(OptimizeOutcome {
            build: incumbent,
            estimate: trusted,
            iterations,
            converged,
            termination,
            last_error,
        })
    }
}

fn budget_for(build: &Build, delta: i32) -> u32 {
    let base = i64::from(build.points_available());
    u32::try_from((base + i64::from(delta)).max(0)).unwrap_or(0)
}

/// Fields the run tracks: everything in the trusted baseline plus whatever
/// the objective reads
fn tracked_fields(trusted: &StatSnapshot, objective: &Objective) -> Vec<StatKey> {
    let mut fields: Vec<StatKey> = trusted.iter().map(|(k, _)| k.clone()).collect();
    for key in objective.fields() {
        if !fields.contains(&key) {
            fields.push(key);
        }
    }
    fields
}

/// Deterministic ranking: higher score, then fewer touched nodes, then label
fn is_better(current: &Option<Selected>, score: f64, touched: usize, label: &str) -> bool {
    match current {
        None => true,
        Some(best) => {
            if score != best.score {
                return score > best.score;
            }
            if touched != best.touched {
                return touched < best.touched;
            }
            label < best.label.as_str()
        }
    }
}

fn reason_for(error: &EngineError) -> TerminationReason {
    match error {
        EngineError::Cancelled => TerminationReason::Cancelled,
        EngineError::PoolUnavailable => TerminationReason::PoolUnavailable,
        _ => TerminationReason::EngineFailure,
    }
}
