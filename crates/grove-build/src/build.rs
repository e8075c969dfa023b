//! The build record

use grove_stats::StatSnapshot;
use grove_tree::AllocationSet;
use serde::{Deserialize, Serialize};

/// Full serialized character state
///
/// The `baseline` is the trusted stat record for this exact build, computed
/// out-of-band and embedded at export time. It is never sourced from the
/// calculation engine and is read-only for the lifetime of an optimization
/// run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Tree dataset version the build was exported against
    pub tree_version: String,
    /// Character level
    pub level: u32,
    /// Allocated nodes and mastery selections
    pub allocation: AllocationSet,
    /// Trusted baseline stats for the unmodified build
    pub baseline: StatSnapshot,
    /// Opaque remainder of the build; re-encoded untouched
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl Build {
    /// Build with an empty allocation
    #[must_use]
    pub fn new(tree_version: impl Into<String>, level: u32) -> Self {
        Self {
            tree_version: tree_version.into(),
            level,
            allocation: AllocationSet::new(),
            baseline: StatSnapshot::new(),
            extra: serde_json::Value::Null,
        }
    }

    /// With an allocation
    #[inline]
    #[must_use]
    pub fn with_allocation(mut self, allocation: AllocationSet) -> Self {
        self.allocation = allocation;
        self
    }

    /// With a trusted baseline
    #[inline]
    #[must_use]
    pub fn with_baseline(mut self, baseline: StatSnapshot) -> Self {
        self.baseline = baseline;
        self
    }

    /// Passive points this character may spend
    ///
    /// One point per level past the first; quest rewards live in `extra` and
    /// are outside the optimizer's budget math.
    #[inline]
    #[must_use]
    pub fn points_available(&self) -> u32 {
        self.level.saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_tree::NodeId;

    #[test]
    fn points_track_level() {
        assert_eq!(Build::new("3.25", 90).points_available(), 89);
        assert_eq!(Build::new("3.25", 0).points_available(), 0);
    }

    #[test]
    fn extra_defaults_to_null() {
        let raw = serde_json::json!({
            "tree_version": "3.25",
            "level": 12,
            "allocation": {"nodes": [1], "masteries": {}},
            "baseline": {}
        })
        .to_string();
        let build: Build = serde_json::from_str(&raw).unwrap();
        assert!(build.extra.is_null());
        assert!(build.allocation.contains(NodeId(1)));
    }
}
