//! Typed bonuses and the D&D 3.5 stacking rules.
//!
//! Every numeric contribution to a derived stat is a [`Source`]. Sources of
//! the same [`BonusType`] only stack when the type says so; otherwise the
//! largest one wins. Penalties always stack.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of a bonus, governing how same-typed bonuses combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BonusType {
    Base,
    Replacement,
    #[default]
    Untyped,
    Circumstance,
    Dodge,
    Enhancement,
    Morale,
    Luck,
    Insight,
    Competence,
    Profane,
    Divine,
    Sacred,
    Resistance,
    Deflection,
    Misc,
    Size,
    Racial,
    Armor,
    Shield,
    NaturalArmor,
    Dexterity,
    Alchemical,
    #[serde(other)]
    Unknown,
}

impl BonusType {
    /// Whether multiple positive bonuses of this type add together.
    pub fn stacks_with_self(&self) -> bool {
        matches!(
            self,
            BonusType::Base
                | BonusType::Replacement
                | BonusType::Untyped
                | BonusType::Circumstance
                | BonusType::Dodge
        )
    }

    /// Whether this type still applies to touch attacks.
    pub fn counts_for_touch_ac(&self) -> bool {
        !matches!(
            self,
            BonusType::Armor | BonusType::Shield | BonusType::NaturalArmor
        )
    }

    /// Whether this type still applies when caught flat-footed.
    pub fn counts_for_flat_footed_ac(&self) -> bool {
        !matches!(self, BonusType::Dexterity | BonusType::Dodge)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BonusType::Base => "Base",
            BonusType::Replacement => "Replacement",
            BonusType::Untyped => "Untyped",
            BonusType::Circumstance => "Circumstance",
            BonusType::Dodge => "Dodge",
            BonusType::Enhancement => "Enhancement",
            BonusType::Morale => "Morale",
            BonusType::Luck => "Luck",
            BonusType::Insight => "Insight",
            BonusType::Competence => "Competence",
            BonusType::Profane => "Profane",
            BonusType::Divine => "Divine",
            BonusType::Sacred => "Sacred",
            BonusType::Resistance => "Resistance",
            BonusType::Deflection => "Deflection",
            BonusType::Misc => "Miscellaneous",
            BonusType::Size => "Size",
            BonusType::Racial => "Racial",
            BonusType::Armor => "Armor",
            BonusType::Shield => "Shield",
            BonusType::NaturalArmor => "Natural Armor",
            BonusType::Dexterity => "Dexterity",
            BonusType::Alchemical => "Alchemical",
            BonusType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BonusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where a source came from, by id only so sheets stay acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOrigin {
    pub origin_type: String,
    pub origin_id: String,
}

/// A single named, typed contribution to a stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub name: String,
    pub bonus_type: BonusType,
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceOrigin>,
    /// Forces this source to add even when its type does not stack.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stacks: bool,
}

impl Source {
    pub fn new(name: impl Into<String>, bonus_type: BonusType, value: i32) -> Self {
        Self {
            name: name.into(),
            bonus_type,
            value,
            origin: None,
            stacks: false,
        }
    }

    pub fn base(name: impl Into<String>, value: i32) -> Self {
        Self::new(name, BonusType::Base, value)
    }

    pub fn with_origin(mut self, origin_type: impl Into<String>, origin_id: impl Into<String>) -> Self {
        self.origin = Some(SourceOrigin {
            origin_type: origin_type.into(),
            origin_id: origin_id.into(),
        });
        self
    }

    pub fn stacking(mut self) -> Self {
        self.stacks = true;
        self
    }
}

/// A source as displayed on the sheet, flagged with whether it counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceValue {
    pub name: String,
    pub bonus_type: BonusType,
    pub value: i32,
    pub relevant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceOrigin>,
}

impl SourceValue {
    fn from_source(source: &Source, bonus_type: BonusType, relevant: bool) -> Self {
        Self {
            name: source.name.clone(),
            bonus_type,
            value: source.value,
            relevant,
            origin: source.origin.clone(),
        }
    }
}

/// Result of combining a set of sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSources {
    pub total: i32,
    /// Sources that contributed to `total`.
    pub applied: Vec<SourceValue>,
    /// Every non-zero source, applied or not.
    pub source_values: Vec<SourceValue>,
}

/// Combine sources according to bonus-type stacking.
///
/// Within a non-stacking type only the largest positive value applies; on a
/// tie the first one seen wins. Negative values and sources flagged
/// [`Source::stacks`] always apply. A `replacement` source discards every
/// `base` source and takes its place.
pub fn combine_sources(sources: &[Source]) -> CombinedSources {
    let has_replacement = sources
        .iter()
        .any(|s| s.bonus_type == BonusType::Replacement && s.value != 0);

    let mut groups: BTreeMap<BonusType, Vec<&Source>> = BTreeMap::new();
    for source in sources.iter().filter(|s| s.value != 0) {
        let bonus_type = match source.bonus_type {
            BonusType::Base if has_replacement => continue,
            BonusType::Replacement => BonusType::Base,
            other => other,
        };
        groups.entry(bonus_type).or_default().push(source);
    }

    let mut total = 0;
    let mut values = Vec::new();
    for (bonus_type, mut group) in groups {
        // Stable: equal values keep their input order.
        group.sort_by(|a, b| b.value.cmp(&a.value));
        let mut best_taken = false;
        for source in group {
            let relevant = if bonus_type.stacks_with_self() || source.stacks || source.value < 0 {
                true
            } else if !best_taken {
                best_taken = true;
                true
            } else {
                false
            };
            if relevant {
                total += source.value;
            }
            values.push(SourceValue::from_source(source, bonus_type, relevant));
        }
    }

    sort_source_values(&mut values);
    let applied = values.iter().filter(|v| v.relevant).cloned().collect();
    CombinedSources {
        total,
        applied,
        source_values: values,
    }
}

/// Base sources first, then the rest by descending value.
fn sort_source_values(values: &mut [SourceValue]) {
    values.sort_by(|a, b| {
        let a_base = a.bonus_type == BonusType::Base;
        let b_base = b.bonus_type == BonusType::Base;
        b_base.cmp(&a_base).then(b.value.cmp(&a.value))
    });
}
