//! Greedy allocation search
//!
//! The optimizer hill-climbs on a single incumbent build:
//! 1. Generate bounded structural mutations (remove / add / mastery re-pick)
//! 2. Evaluate incumbent and candidates through the engine pool in one batch
//! 3. Rank candidates by their change ratio against the incumbent
//! 4. Accept the best candidate only if it clears the improvement threshold
//!
//! Iterations are strictly sequential; the batch fan-out inside the pool is
//! the only parallelism. Per-candidate failures are isolated and logged, a
//! dead pool ends the run with the best incumbent found so far.

pub mod candidates;
pub mod error;
pub mod heuristics;
pub mod optimizer;

pub use candidates::{Candidate, CandidateGenerator, CandidateKind, GeneratorLimits};
pub use error::OptimizeError;
pub use heuristics::MasteryScorer;
pub use optimizer::{
    IterationRecord, OptimizeOutcome, Optimizer, OptimizerConfig, TerminationReason,
};
