//! Optimization objectives

use crate::key::StatKey;
use crate::relative::RelativeEstimate;
use serde::{Deserialize, Serialize};

/// The scalar being maximized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    /// Maximize one stat field
    Single(StatKey),
    /// Maximize a weighted blend of stat fields
    Blend(Vec<(StatKey, f64)>),
}

impl Objective {
    /// Damage preset
    #[inline]
    #[must_use]
    pub fn damage() -> Self {
        Self::Single(StatKey::CombinedDps)
    }

    /// Survivability preset
    #[inline]
    #[must_use]
    pub fn survivability() -> Self {
        Self::Single(StatKey::EffectiveHitPool)
    }

    /// Even damage / survivability blend
    #[must_use]
    pub fn balanced() -> Self {
        Self::Blend(vec![
            (StatKey::CombinedDps, 0.5),
            (StatKey::EffectiveHitPool, 0.5),
        ])
    }

    /// Stat fields the objective reads
    #[must_use]
    pub fn fields(&self) -> Vec<StatKey> {
        match self {
            Self::Single(key) => vec![key.clone()],
            Self::Blend(weights) => weights.iter().map(|(k, _)| k.clone()).collect(),
        }
    }

    /// Score an extrapolated candidate: >1.0 improved, <1.0 regressed
    ///
    /// Weighted mean of the comparable field ratios, weights renormalized
    /// over the fields that actually have a ratio. `None` when every field
    /// is non-comparable - such a candidate cannot be ranked and is skipped,
    /// the run continues.
    #[must_use]
    pub fn score(&self, estimate: &RelativeEstimate) -> Option<f64> {
        let weighted: Vec<(f64, f64)> = match self {
            Self::Single(key) => estimate.ratio(key).map(|r| (r, 1.0)).into_iter().collect(),
            Self::Blend(weights) => weights
                .iter()
                .filter_map(|(key, weight)| estimate.ratio(key).map(|r| (r, *weight)))
                .collect(),
        };

        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        Some(weighted.iter().map(|(r, w)| r * w).sum::<f64>() / total)
    }

    /// Parse a CLI-friendly objective name
    ///
    /// Presets first (`damage`, `survivability`, `balanced`), otherwise the
    /// input is treated as a single stat field name.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "damage" | "dps" => Self::damage(),
            "survivability" | "ehp" => Self::survivability(),
            "balanced" => Self::balanced(),
            _ => Self::Single(StatKey::from(raw)),
        }
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(key) => write!(f, "{key}"),
            Self::Blend(weights) => {
                let parts: Vec<String> = weights
                    .iter()
                    .map(|(key, weight)| format!("{key}*{weight}"))
                    .collect();
                f.write_str(&parts.join("+"))
            }
        }
    }
}
