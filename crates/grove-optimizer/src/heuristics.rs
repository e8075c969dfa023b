//! Mastery effect scoring heuristic
//!
//! Paying an engine evaluation per mastery sub-option would multiply batch
//! cost for marginal gain, so sub-options are ranked by a cheap text
//! heuristic instead: extract the leading magnitude from each stat line and
//! weight it by keyword. The weights are plain data, not a contract; callers
//! with different priorities (or an evaluation budget to burn) can supply
//! their own table. The heuristic is not validated against the engine.

use grove_stats::{Objective, StatKey};
use grove_tree::{MasteryEffect, TreeNode};
use once_cell::sync::Lazy;
use regex::Regex;

static MAGNITUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("magnitude pattern compiles"));

const OFFENSE_WEIGHTS: &[(&str, f64)] = &[
    ("damage", 1.0),
    ("attack speed", 0.6),
    ("cast speed", 0.6),
    ("critical", 0.5),
    ("penetrat", 0.6),
    ("accuracy", 0.3),
];

const DEFENSE_WEIGHTS: &[(&str, f64)] = &[
    ("maximum life", 1.0),
    ("life", 0.4),
    ("energy shield", 0.8),
    ("armour", 0.4),
    ("evasion", 0.4),
    ("resistance", 0.6),
    ("recover", 0.3),
];

/// Keyword/magnitude scorer for mastery sub-options
#[derive(Debug, Clone)]
pub struct MasteryScorer {
    weights: Vec<(String, f64)>,
}

impl MasteryScorer {
    /// Scorer with an explicit weight table
    #[must_use]
    pub fn new(weights: Vec<(String, f64)>) -> Self {
        Self { weights }
    }

    /// Default table for an objective
    ///
    /// Offensive fields pull in the offense table, defensive fields the
    /// defense table; a blend merges both scaled by its field weights.
    #[must_use]
    pub fn for_objective(objective: &Objective) -> Self {
        let mut weights: Vec<(String, f64)> = Vec::new();
        let mut merge = |table: &[(&str, f64)], scale: f64| {
            for (keyword, weight) in table {
                match weights.iter_mut().find(|(k, _)| k == keyword) {
                    Some((_, existing)) => *existing += weight * scale,
                    None => weights.push(((*keyword).to_string(), weight * scale)),
                }
            }
        };

        match objective {
            Objective::Single(key) => merge(table_for(key), 1.0),
            Objective::Blend(parts) => {
                for (key, weight) in parts {
                    merge(table_for(key), *weight);
                }
            }
        }

        Self { weights }
    }

    /// Score one sub-option
    #[must_use]
    pub fn score_effect(&self, effect: &MasteryEffect) -> f64 {
        effect.stats.iter().map(|line| self.score_line(line)).sum()
    }

    /// Best sub-option for a node, or `None` when it has none
    ///
    /// Ties keep the earlier effect in dataset order, which keeps re-pick
    /// candidates deterministic.
    #[must_use]
    pub fn pick_best(&self, node: &TreeNode) -> Option<u32> {
        let mut best: Option<(u32, f64)> = None;
        for effect in &node.mastery_effects {
            let score = self.score_effect(effect);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((effect.id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    fn score_line(&self, line: &str) -> f64 {
        let lower = line.to_lowercase();
        let magnitude = MAGNITUDE
            .captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(1.0);
        self.weights
            .iter()
            .filter(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(_, weight)| weight * magnitude)
            .sum()
    }
}

fn table_for(key: &StatKey) -> &'static [(&'static str, f64)] {
    match key {
        StatKey::Life
        | StatKey::EnergyShield
        | StatKey::Mana
        | StatKey::Armour
        | StatKey::Evasion
        | StatKey::EffectiveHitPool => DEFENSE_WEIGHTS,
        _ => OFFENSE_WEIGHTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_tree::{NodeId, NodeKind};

    fn mastery_node() -> TreeNode {
        TreeNode {
            id: NodeId(4),
            name: "Life Mastery".to_string(),
            kind: NodeKind::Mastery,
            stats: vec![],
            mastery_effects: vec![
                MasteryEffect {
                    id: 1,
                    stats: vec!["+50 to maximum Life".to_string()],
                },
                MasteryEffect {
                    id: 2,
                    stats: vec!["20% increased Damage".to_string()],
                },
            ],
            cost: 1,
        }
    }

    #[test]
    fn damage_objective_prefers_damage_effect() {
        let scorer = MasteryScorer::for_objective(&Objective::damage());
        assert_eq!(scorer.pick_best(&mastery_node()), Some(2));
    }

    #[test]
    fn survivability_objective_prefers_life_effect() {
        let scorer = MasteryScorer::for_objective(&Objective::survivability());
        assert_eq!(scorer.pick_best(&mastery_node()), Some(1));
    }

    #[test]
    fn magnitude_scales_the_score() {
        let scorer = MasteryScorer::for_objective(&Objective::damage());
        let small = MasteryEffect {
            id: 1,
            stats: vec!["5% increased Damage".to_string()],
        };
        let large = MasteryEffect {
            id: 2,
            stats: vec!["25% increased Damage".to_string()],
        };
        assert!(scorer.score_effect(&large) > scorer.score_effect(&small));
    }

    #[test]
    fn no_effects_means_no_pick() {
        let scorer = MasteryScorer::for_objective(&Objective::damage());
        let mut node = mastery_node();
        node.mastery_effects.clear();
        assert_eq!(scorer.pick_best(&node), None);
    }

    #[test]
    fn ties_keep_dataset_order() {
        let scorer = MasteryScorer::new(vec![]);
        // every effect scores 0.0 with an empty table
        assert_eq!(scorer.pick_best(&mastery_node()), Some(1));
    }

    #[test]
    fn custom_weights_replace_the_default_table() {
        let scorer = MasteryScorer::new(vec![("maximum life".to_string(), 10.0)]);
        assert_eq!(scorer.pick_best(&mastery_node()), Some(1));
    }
}
