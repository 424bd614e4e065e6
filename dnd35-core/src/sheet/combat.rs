//! Initiative, base attack bonus and saving throws.

use super::{Calculation, CalculatedValue};
use crate::bonus::{combine_sources, BonusType, Source, SourceValue};
use crate::changes::ChangeTarget;
use crate::stats::{Ability, SavingThrow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Iterative attacks stop after this many.
const MAX_ITERATIVE_ATTACKS: usize = 4;

pub(crate) fn calculate_initiative(calc: &mut Calculation<'_>) -> CalculatedValue {
    let mut sources = vec![Source::new(
        "Dexterity modifier",
        BonusType::Untyped,
        calc.ability_modifier(Ability::Dexterity),
    )];
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::Initiative)));
    let initiative = CalculatedValue::from_sources(sources);
    calc.index.set("initiative.total", initiative.total_value);
    initiative
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedBaseAttackBonus {
    /// Sum of class progressions.
    pub base_value: i32,
    pub total_value: i32,
    /// Full attack sequence, e.g. `[11, 6, 1]`.
    pub multiple_base_attack_bonuses: Vec<i32>,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
}

pub(crate) fn calculate_base_attack_bonus(calc: &mut Calculation<'_>) -> CalculatedBaseAttackBonus {
    let mut sources: Vec<Source> = calc
        .classes
        .iter()
        .map(|class| {
            Source::base(
                format!("{} {}", class.name, class.levels),
                class.data.bab_progression.base_attack_bonus(class.levels),
            )
            .with_origin("class", class.id.clone())
        })
        .collect();
    let base_value: i32 = sources.iter().map(|s| s.value).sum();
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::Bab)));
    let combined = combine_sources(&sources);

    calc.index.set("bab.base", base_value);
    calc.index.set("bab.total", combined.total);

    CalculatedBaseAttackBonus {
        base_value,
        total_value: combined.total,
        multiple_base_attack_bonuses: iterative_attacks(combined.total),
        sources,
        source_values: combined.source_values,
    }
}

/// Attack bonuses of a full attack: every 5 points past the first grants
/// another attack at -5.
pub(crate) fn iterative_attacks(total: i32) -> Vec<i32> {
    let mut attacks = vec![total];
    let mut next = total - 5;
    while next > 0 && attacks.len() < MAX_ITERATIVE_ATTACKS {
        attacks.push(next);
        next -= 5;
    }
    attacks
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSavingThrow {
    pub base_value: i32,
    pub total_value: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
}

pub(crate) fn calculate_saving_throws(calc: &mut Calculation<'_>) -> BTreeMap<SavingThrow, CalculatedSavingThrow> {
    SavingThrow::all()
        .into_iter()
        .map(|save| (save, calculate_saving_throw(calc, save)))
        .collect()
}

fn calculate_saving_throw(calc: &mut Calculation<'_>, save: SavingThrow) -> CalculatedSavingThrow {
    let mut sources: Vec<Source> = calc
        .classes
        .iter()
        .map(|class| {
            Source::base(
                format!("{} {}", class.name, class.levels),
                class.data.saves.get(save).base_save(class.levels),
            )
            .with_origin("class", class.id.clone())
        })
        .collect();
    let base_value: i32 = sources.iter().map(|s| s.value).sum();

    let ability = save.ability();
    sources.push(Source::new(
        format!("{} modifier", ability.name()),
        BonusType::Untyped,
        calc.ability_modifier(ability),
    ));
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::SavingThrow { save: s } if s.applies_to(save))));
    let combined = combine_sources(&sources);

    let key = save.key();
    calc.index.set(format!("savingThrow.{key}.base"), base_value);
    calc.index.set(format!("savingThrow.{key}.total"), combined.total);

    CalculatedSavingThrow {
        base_value,
        total_value: combined.total,
        sources,
        source_values: combined.source_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterative_attacks() {
        assert_eq!(iterative_attacks(0), vec![0]);
        assert_eq!(iterative_attacks(5), vec![5]);
        assert_eq!(iterative_attacks(6), vec![6, 1]);
        assert_eq!(iterative_attacks(11), vec![11, 6, 1]);
        assert_eq!(iterative_attacks(20), vec![20, 15, 10, 5]);
        assert_eq!(iterative_attacks(-2), vec![-2]);
    }
}
