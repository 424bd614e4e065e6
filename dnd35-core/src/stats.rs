//! Identifiers for the stats a change can target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    /// Key segment used in variable paths, e.g. `ability.strength.score`.
    pub fn key(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Modifier for an ability score: `floor((score - 10) / 2)`.
pub fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SavingThrow {
    Fortitude,
    Reflex,
    Will,
}

impl SavingThrow {
    pub fn key(&self) -> &'static str {
        match self {
            SavingThrow::Fortitude => "fortitude",
            SavingThrow::Reflex => "reflex",
            SavingThrow::Will => "will",
        }
    }

    pub fn ability(&self) -> Ability {
        match self {
            SavingThrow::Fortitude => Ability::Constitution,
            SavingThrow::Reflex => Ability::Dexterity,
            SavingThrow::Will => Ability::Wisdom,
        }
    }

    pub fn all() -> [SavingThrow; 3] {
        [SavingThrow::Fortitude, SavingThrow::Reflex, SavingThrow::Will]
    }
}

/// Save targeted by a change; `all` hits every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveTarget {
    Fortitude,
    Reflex,
    Will,
    All,
}

impl SaveTarget {
    pub fn applies_to(&self, save: SavingThrow) -> bool {
        matches!(
            (self, save),
            (SaveTarget::All, _)
                | (SaveTarget::Fortitude, SavingThrow::Fortitude)
                | (SaveTarget::Reflex, SavingThrow::Reflex)
                | (SaveTarget::Will, SavingThrow::Will)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedKind {
    #[default]
    Land,
    Fly,
    Swim,
    Climb,
    Burrow,
}

impl SpeedKind {
    pub fn key(&self) -> &'static str {
        match self {
            SpeedKind::Land => "land",
            SpeedKind::Fly => "fly",
            SpeedKind::Swim => "swim",
            SpeedKind::Climb => "climb",
            SpeedKind::Burrow => "burrow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttackType {
    #[default]
    Melee,
    Ranged,
}

/// Which attacks a change or contextual change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttackFilter {
    #[default]
    All,
    Melee,
    Ranged,
}

impl AttackFilter {
    pub fn applies_to(&self, attack: AttackType) -> bool {
        matches!(
            (self, attack),
            (AttackFilter::All, _)
                | (AttackFilter::Melee, AttackType::Melee)
                | (AttackFilter::Ranged, AttackType::Ranged)
        )
    }
}

/// Creature size categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    Fine,
    Diminutive,
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    Huge,
    Gargantuan,
    Colossal,
}

impl SizeCategory {
    pub fn numeric(&self) -> i32 {
        match self {
            SizeCategory::Fine => -4,
            SizeCategory::Diminutive => -3,
            SizeCategory::Tiny => -2,
            SizeCategory::Small => -1,
            SizeCategory::Medium => 0,
            SizeCategory::Large => 1,
            SizeCategory::Huge => 2,
            SizeCategory::Gargantuan => 3,
            SizeCategory::Colossal => 4,
        }
    }

    /// Clamps to the fine..colossal range.
    pub fn from_numeric(value: i32) -> SizeCategory {
        match value {
            i32::MIN..=-4 => SizeCategory::Fine,
            -3 => SizeCategory::Diminutive,
            -2 => SizeCategory::Tiny,
            -1 => SizeCategory::Small,
            0 => SizeCategory::Medium,
            1 => SizeCategory::Large,
            2 => SizeCategory::Huge,
            3 => SizeCategory::Gargantuan,
            _ => SizeCategory::Colossal,
        }
    }

    /// Size modifier to attack rolls and armor class.
    pub fn attack_and_ac_modifier(&self) -> i32 {
        match self {
            SizeCategory::Fine => 8,
            SizeCategory::Diminutive => 4,
            SizeCategory::Tiny => 2,
            SizeCategory::Small => 1,
            SizeCategory::Medium => 0,
            SizeCategory::Large => -1,
            SizeCategory::Huge => -2,
            SizeCategory::Gargantuan => -4,
            SizeCategory::Colossal => -8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SizeCategory::Fine => "Fine",
            SizeCategory::Diminutive => "Diminutive",
            SizeCategory::Tiny => "Tiny",
            SizeCategory::Small => "Small",
            SizeCategory::Medium => "Medium",
            SizeCategory::Large => "Large",
            SizeCategory::Huge => "Huge",
            SizeCategory::Gargantuan => "Gargantuan",
            SizeCategory::Colossal => "Colossal",
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ability_modifier() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(18), 4);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(1), -5);
        assert_eq!(ability_modifier(0), -5);
    }

    #[test]
    fn test_size_roundtrip_and_clamp() {
        for size in [SizeCategory::Fine, SizeCategory::Medium, SizeCategory::Colossal] {
            assert_eq!(SizeCategory::from_numeric(size.numeric()), size);
        }
        assert_eq!(SizeCategory::from_numeric(-9), SizeCategory::Fine);
        assert_eq!(SizeCategory::from_numeric(7), SizeCategory::Colossal);
    }

    #[test]
    fn test_save_target() {
        assert!(SaveTarget::All.applies_to(SavingThrow::Will));
        assert!(SaveTarget::Reflex.applies_to(SavingThrow::Reflex));
        assert!(!SaveTarget::Reflex.applies_to(SavingThrow::Fortitude));
    }

    #[test]
    fn test_attack_filter() {
        assert!(AttackFilter::All.applies_to(AttackType::Ranged));
        assert!(!AttackFilter::Melee.applies_to(AttackType::Ranged));
    }
}
