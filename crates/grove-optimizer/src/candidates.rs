//! Candidate generation
//!
//! Produces bounded lists of structurally valid single-step mutations of the
//! incumbent allocation. Connectivity and budget are enforced here, before
//! any engine cost is paid: a candidate that would disconnect the tree or
//! overspend is never emitted at all.

use crate::heuristics::MasteryScorer;
use grove_build::Build;
use grove_tree::{AllocationSet, NodeId, PassiveTree};
use std::sync::Arc;

/// The structural edit a candidate proposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    /// Deallocate one node
    Remove(NodeId),
    /// Allocate one frontier node
    Add(NodeId),
    /// Re-pick the selected effect of an allocated mastery
    Mastery {
        /// Mastery node
        node: NodeId,
        /// Newly selected effect
        effect: u32,
    },
}

/// One proposed mutation, ready for evaluation
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Human-readable description, e.g. `remove 123 (Heavy Hitter)`
    pub label: String,
    /// The proposed edit
    pub kind: CandidateKind,
    /// Resulting allocation, masteries reconciled
    pub allocation: AllocationSet,
    /// Nodes touched by the edit; the tie-breaker on equal scores
    pub touched: usize,
}

/// Per-kind caps keeping batch size tractable
#[derive(Debug, Clone, Copy)]
pub struct GeneratorLimits {
    /// Removal candidates per iteration
    pub max_removals: usize,
    /// Addition candidates per iteration
    pub max_additions: usize,
    /// Mastery re-pick candidates per iteration
    pub max_mastery_swaps: usize,
}

impl Default for GeneratorLimits {
    fn default() -> Self {
        Self {
            max_removals: 15,
            max_additions: 20,
            max_mastery_swaps: 8,
        }
    }
}

/// Generates structurally valid candidates from an incumbent build
#[derive(Debug)]
pub struct CandidateGenerator {
    tree: Arc<PassiveTree>,
    limits: GeneratorLimits,
    scorer: MasteryScorer,
}

impl CandidateGenerator {
    /// Generator over a tree with the given bounds and mastery scorer
    #[must_use]
    pub fn new(tree: Arc<PassiveTree>, limits: GeneratorLimits, scorer: MasteryScorer) -> Self {
        Self {
            tree,
            limits,
            scorer,
        }
    }

    /// All candidates for one iteration, in deterministic order
    ///
    /// `budget` is the total point budget the resulting allocation may
    /// spend. Every returned candidate satisfies the connectivity invariant
    /// and the budget; callers never need to re-validate.
    #[must_use]
    pub fn generate(&self, build: &Build, budget: u32) -> Vec<Candidate> {
        let mut out = Vec::new();
        self.removals(&build.allocation, &mut out);
        self.additions(&build.allocation, budget, &mut out);
        self.mastery_swaps(&build.allocation, &mut out);
        tracing::debug!(candidates = out.len(), "candidate batch generated");
        out
    }

    fn removals(&self, incumbent: &AllocationSet, out: &mut Vec<Candidate>) {
        let mut emitted = 0;
        for &id in &incumbent.nodes {
            if emitted >= self.limits.max_removals {
                break;
            }
            if id == self.tree.root() || !incumbent.removal_keeps_connected(&self.tree, id) {
                continue;
            }
            let mut allocation = incumbent.clone();
            allocation.deallocate(id);
            self.reconcile(&mut allocation);
            out.push(Candidate {
                label: format!("remove {}", self.describe(id)),
                kind: CandidateKind::Remove(id),
                allocation,
                touched: 1,
            });
            emitted += 1;
        }
    }

    fn additions(&self, incumbent: &AllocationSet, budget: u32, out: &mut Vec<Candidate>) {
        let spent = incumbent.points_spent(&self.tree);
        let mut emitted = 0;
        for id in incumbent.frontier(&self.tree) {
            if emitted >= self.limits.max_additions {
                break;
            }
            let cost = self.tree.node(id).map_or(1, |n| n.cost);
            if spent + cost > budget {
                continue;
            }
            let mut allocation = incumbent.clone();
            allocation.allocate(id);
            self.reconcile(&mut allocation);
            out.push(Candidate {
                label: format!("add {}", self.describe(id)),
                kind: CandidateKind::Add(id),
                allocation,
                touched: 1,
            });
            emitted += 1;
        }
    }

    fn mastery_swaps(&self, incumbent: &AllocationSet, out: &mut Vec<Candidate>) {
        let mut emitted = 0;
        for &id in &incumbent.nodes {
            if emitted >= self.limits.max_mastery_swaps {
                break;
            }
            let Some(node) = self.tree.node(id) else {
                continue;
            };
            if !node.kind.is_selectable() {
                continue;
            }
            let Some(best) = self.scorer.pick_best(node) else {
                continue;
            };
            if incumbent.selected_effect(id) == Some(best) {
                continue;
            }
            let mut allocation = incumbent.clone();
            if allocation.select_mastery(id, best).is_err() {
                continue;
            }
            out.push(Candidate {
                label: format!("mastery {} -> effect {best}", self.describe(id)),
                kind: CandidateKind::Mastery { node: id, effect: best },
                allocation,
                touched: 1,
            });
            emitted += 1;
        }
    }

    /// Reconcile mastery selections after a structural edit
    ///
    /// Selections on nodes that are gone are dropped; allocated masteries
    /// whose selection is missing or no longer offered get the scorer's
    /// pick. Valid existing selections are kept so a structural candidate
    /// stays a one-node edit.
    fn reconcile(&self, allocation: &mut AllocationSet) {
        allocation.prune_masteries(&self.tree);
        let masteries: Vec<NodeId> = allocation
            .nodes
            .iter()
            .copied()
            .filter(|&id| self.tree.kind(id).is_some_and(|k| k.is_selectable()))
            .collect();
        for id in masteries {
            let Some(node) = self.tree.node(id) else {
                continue;
            };
            let valid = allocation
                .selected_effect(id)
                .is_some_and(|effect| node.effect(effect).is_some());
            if valid {
                continue;
            }
            if let Some(best) = self.scorer.pick_best(node) {
                let _ = allocation.select_mastery(id, best);
            }
        }
    }

    fn describe(&self, id: NodeId) -> String {
        match self.tree.node(id) {
            Some(node) if !node.name.is_empty() => format!("{id} ({})", node.name),
            _ => id.to_string(),
        }
    }
}
