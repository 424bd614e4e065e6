//! Changes: the numeric effects an entity applies to a character.

use crate::bonus::BonusType;
use crate::conditions::Condition;
use crate::formula::Formula;
use crate::stats::{Ability, AttackFilter, SaveTarget, SpeedKind};
use serde::{Deserialize, Serialize};

/// The stat a change modifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeTarget {
    AbilityScore {
        #[serde(alias = "abilityUniqueId")]
        ability: Ability,
    },
    AbilityChecks {
        #[serde(alias = "abilityUniqueId")]
        ability: Ability,
    },
    Ac,
    NaturalAc,
    SavingThrow {
        #[serde(alias = "savingThrowUniqueId")]
        save: SaveTarget,
    },
    Bab,
    Initiative,
    Speed {
        #[serde(default, alias = "speedUniqueId")]
        speed: SpeedKind,
    },
    AttackRolls {
        #[serde(default, rename = "attackType")]
        attack_type: AttackFilter,
    },
    Damage {
        #[serde(default, rename = "attackType")]
        attack_type: AttackFilter,
    },
    CriticalConfirmation {
        #[serde(default, rename = "attackType")]
        attack_type: AttackFilter,
    },
    Skill {
        #[serde(alias = "skillUniqueId")]
        skill: String,
    },
    /// Every skill keyed off `ability`.
    AbilitySkills {
        #[serde(alias = "abilityUniqueId")]
        ability: Ability,
    },
    Hp,
    TemporaryHp,
    Size,
    WeaponSize,
    CustomVariable {
        #[serde(rename = "uniqueId")]
        unique_id: String,
    },
    #[serde(other)]
    Unknown,
}

/// One effect: a formula, a bonus type, and the stat it targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(flatten)]
    pub target: ChangeTarget,
    #[serde(default)]
    pub formula: Formula,
    #[serde(default, alias = "bonusTypeId")]
    pub bonus_type: BonusType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// All must hold for the change to apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stacks: bool,
}

impl Change {
    pub fn new(target: ChangeTarget, formula: impl Into<String>, bonus_type: BonusType) -> Self {
        Self {
            target,
            formula: Formula::expression(formula),
            bonus_type,
            name: None,
            conditions: Vec::new(),
            stacks: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// A numeric slider on a contextual change, e.g. Power Attack points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualVariable {
    /// Exposed to the change formulas as `@{identifier}`.
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

impl ContextualVariable {
    pub fn clamp(&self, value: f64) -> f64 {
        if self.max < self.min {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// A player-toggled modifier bound to attacks (Flanking, Power Attack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackContextualChange {
    pub name: String,
    #[serde(default)]
    pub applies_to: AttackFilter,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default = "default_true")]
    pub optional: bool,
    #[serde(default)]
    pub variables: Vec<ContextualVariable>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

fn default_true() -> bool {
    true
}

impl AttackContextualChange {
    /// Applied without player input.
    pub fn is_mandatory(&self) -> bool {
        self.available && !self.optional && self.variables.is_empty()
    }
}

fn untyped_attack_change(name: &str, attack_type: AttackFilter, value: &str) -> AttackContextualChange {
    let applies_to = attack_type;
    AttackContextualChange {
        name: name.to_string(),
        applies_to,
        available: true,
        optional: true,
        variables: Vec::new(),
        changes: vec![Change::new(ChangeTarget::AttackRolls { attack_type }, value, BonusType::Untyped).named(name)],
    }
}

lazy_static::lazy_static! {
    /// Situational attack modifiers every character can toggle.
    pub static ref DEFAULT_CONTEXTUAL_CHANGES: Vec<AttackContextualChange> = vec![
        untyped_attack_change("Flanking", AttackFilter::Melee, "2"),
        untyped_attack_change("Charging", AttackFilter::Melee, "2"),
        untyped_attack_change("High Ground", AttackFilter::All, "1"),
        untyped_attack_change("Defensive Fighting", AttackFilter::Melee, "-4"),
        untyped_attack_change("Prone", AttackFilter::Melee, "-4"),
    ];
}
