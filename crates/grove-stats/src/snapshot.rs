//! Sanitized stat records

use crate::key::StatKey;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A flat record of named numeric stats
///
/// Invariant: every stored value is finite. The engine occasionally reports
/// NaN or infinity for stats it failed to derive; those are normalized to
/// 0.0 on the way in so downstream arithmetic never has to re-check.
/// Insertion order is preserved, which keeps logs and serialized output
/// stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexMap<StatKey, f64>", into = "IndexMap<StatKey, f64>")]
pub struct StatSnapshot {
    values: IndexMap<StatKey, f64>,
}

impl StatSnapshot {
    /// Empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, normalizing non-finite input to 0.0
    pub fn insert(&mut self, key: StatKey, value: f64) {
        self.values.insert(key, sanitize(value));
    }

    /// Value for a field; absent fields read as 0.0
    #[inline]
    #[must_use]
    pub fn get(&self, key: &StatKey) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    /// Value for a field only if the engine reported it
    #[inline]
    #[must_use]
    pub fn reported(&self, key: &StatKey) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no fields were reported
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&StatKey, f64)> {
        self.values.iter().map(|(k, v)| (k, *v))
    }
}

impl From<IndexMap<StatKey, f64>> for StatSnapshot {
    fn from(values: IndexMap<StatKey, f64>) -> Self {
        Self {
            values: values.into_iter().map(|(k, v)| (k, sanitize(v))).collect(),
        }
    }
}

impl From<StatSnapshot> for IndexMap<StatKey, f64> {
    fn from(snapshot: StatSnapshot) -> Self {
        snapshot.values
    }
}

impl FromIterator<(StatKey, f64)> for StatSnapshot {
    fn from_iter<I: IntoIterator<Item = (StatKey, f64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (key, value) in iter {
            out.insert(key, value);
        }
        out
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
