//! Recognized stat field names
//!
//! The engine reports stats as arbitrary name/number pairs. Fields the
//! optimizer understands get a typed variant; everything else lands in the
//! [`StatKey::Other`] bucket unchanged rather than being silently dropped or
//! mis-typed.

use serde::{Deserialize, Serialize};

/// A named stat field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatKey {
    /// Total damage per second of the active skill
    TotalDps,
    /// DPS combined across all damaging components
    CombinedDps,
    /// Average damage of one hit
    AverageHit,
    /// Maximum life
    Life,
    /// Maximum energy shield
    EnergyShield,
    /// Maximum mana
    Mana,
    /// Armour rating
    Armour,
    /// Evasion rating
    Evasion,
    /// Effective hit pool
    EffectiveHitPool,
    /// Critical strike chance
    CritChance,
    /// Attacks per second
    AttackSpeed,
    /// Unrecognized field, preserved verbatim
    Other(String),
}

impl StatKey {
    /// Canonical field name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TotalDps => "TotalDPS",
            Self::CombinedDps => "CombinedDPS",
            Self::AverageHit => "AverageHit",
            Self::Life => "Life",
            Self::EnergyShield => "EnergyShield",
            Self::Mana => "Mana",
            Self::Armour => "Armour",
            Self::Evasion => "Evasion",
            Self::EffectiveHitPool => "TotalEHP",
            Self::CritChance => "CritChance",
            Self::AttackSpeed => "Speed",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for StatKey {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "TotalDPS" => Self::TotalDps,
            "CombinedDPS" => Self::CombinedDps,
            "AverageHit" => Self::AverageHit,
            "Life" => Self::Life,
            "EnergyShield" => Self::EnergyShield,
            "Mana" => Self::Mana,
            "Armour" => Self::Armour,
            "Evasion" => Self::Evasion,
            "TotalEHP" => Self::EffectiveHitPool,
            "CritChance" => Self::CritChance,
            "Speed" => Self::AttackSpeed,
            _ => Self::Other(raw),
        }
    }
}

impl From<&str> for StatKey {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<StatKey> for String {
    fn from(key: StatKey) -> Self {
        key.as_str().to_string()
    }
}

impl std::fmt::Display for StatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_round_trip() {
        for key in [
            StatKey::TotalDps,
            StatKey::CombinedDps,
            StatKey::Life,
            StatKey::EffectiveHitPool,
            StatKey::AttackSpeed,
        ] {
            assert_eq!(StatKey::from(key.as_str()), key);
        }
    }

    #[test]
    fn unknown_names_are_preserved() {
        let key = StatKey::from("SpellSuppressionChance");
        assert_eq!(key, StatKey::Other("SpellSuppressionChance".to_string()));
        assert_eq!(key.as_str(), "SpellSuppressionChance");
    }

    #[test]
    fn serde_uses_canonical_names() {
        let raw = serde_json::to_string(&StatKey::EffectiveHitPool).unwrap();
        assert_eq!(raw, "\"TotalEHP\"");
        let back: StatKey = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, StatKey::EffectiveHitPool);
    }
}
