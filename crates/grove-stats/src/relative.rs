//! Ratio extrapolation against a trusted baseline
//!
//! Two engine evaluations of the same build class share the same systematic
//! bias, so their per-field ratio is stable even when both absolute values
//! are wrong by an order of magnitude. Multiplying the trusted baseline by
//! that ratio yields a usable estimate; the ratio itself is the ranking
//! signal. Expect roughly 5-10% error on the estimates - the ordering, not
//! the absolute numbers, is the reliable output.

use crate::key::StatKey;
use crate::snapshot::StatSnapshot;
use indexmap::IndexMap;

/// Result of extrapolating one candidate evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeEstimate {
    /// Per-field change ratio (candidate / baseline engine value)
    pub ratios: IndexMap<StatKey, f64>,
    /// Trusted baseline scaled by the ratios
    pub estimate: StatSnapshot,
    /// Fields whose ratio is undefined (engine baseline 0, candidate not 0)
    pub non_comparable: Vec<StatKey>,
}

impl RelativeEstimate {
    /// Ratio for a field, if comparable
    #[inline]
    #[must_use]
    pub fn ratio(&self, key: &StatKey) -> Option<f64> {
        self.ratios.get(key).copied()
    }
}

/// Extrapolate a candidate's stats from a trusted baseline and two engine
/// evaluations
///
/// Per field: `ratio = engine_candidate / engine_base`, with `0/0`
/// normalized to 1.0 (no change). A field where the engine baseline is zero
/// but the candidate is not has no defined ratio; it is reported in
/// `non_comparable` and excluded from the estimate rather than propagating
/// infinity into the objective.
#[must_use]
pub fn extrapolate(
    trusted: &StatSnapshot,
    engine_base: &StatSnapshot,
    engine_candidate: &StatSnapshot,
    fields: &[StatKey],
) -> RelativeEstimate {
    let mut ratios = IndexMap::new();
    let mut estimate = StatSnapshot::new();
    let mut non_comparable = Vec::new();

    for field in fields {
        let base = engine_base.get(field);
        let candidate = engine_candidate.get(field);

        let ratio = if base == 0.0 {
            if candidate == 0.0 {
                1.0
            } else {
                tracing::debug!(field = %field, candidate, "field not comparable");
                non_comparable.push(field.clone());
                continue;
            }
        } else {
            candidate / base
        };

        ratios.insert(field.clone(), ratio);
        estimate.insert(field.clone(), trusted.get(field) * ratio);
    }

    RelativeEstimate {
        ratios,
        estimate,
        non_comparable,
    }
}
