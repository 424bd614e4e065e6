use super::{Calculation, CalculatedValue};
use crate::bonus::{combine_sources, BonusType, Source, SourceValue};
use crate::changes::ChangeTarget;
use crate::stats::{ability_modifier, Ability};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedAbility {
    pub base_score: i32,
    pub total_score: i32,
    pub modifier: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
    /// Modifier plus `ABILITY_CHECKS` changes.
    pub check: CalculatedValue,
}

pub(crate) fn calculate_ability_scores(calc: &mut Calculation<'_>) -> BTreeMap<Ability, CalculatedAbility> {
    Ability::all()
        .into_iter()
        .map(|ability| (ability, calculate_ability(calc, ability)))
        .collect()
}

fn calculate_ability(calc: &mut Calculation<'_>, ability: Ability) -> CalculatedAbility {
    let input = *calc.base.base_abilities.get(ability);
    let mut sources = vec![
        Source::base("Base score", input.base_score),
        Source::new("Drain", BonusType::Untyped, -input.drain),
        Source::new("Damage", BonusType::Untyped, -input.damage),
        Source::new("Penalty", BonusType::Untyped, -input.penalty),
    ];
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::AbilityScore { ability: a } if *a == ability)));
    let combined = combine_sources(&sources);
    let total_score = combined.total.max(0);
    let modifier = ability_modifier(total_score);

    let key = ability.key();
    calc.index.set(format!("ability.{key}.base"), input.base_score);
    calc.index.set(format!("ability.{key}.score"), total_score);
    calc.index.set(format!("ability.{key}.modifier"), modifier);

    let mut check_sources = vec![Source::new(format!("{} modifier", ability.name()), BonusType::Untyped, modifier)];
    check_sources.extend(calc.sources(|target| matches!(target, ChangeTarget::AbilityChecks { ability: a } if *a == ability)));
    let check = CalculatedValue::from_sources(check_sources);
    calc.index.set(format!("ability.{key}.check"), check.total_value);

    tracing::debug!(ability = key, score = total_score, modifier, "ability score");
    CalculatedAbility {
        base_score: input.base_score,
        total_score,
        modifier,
        sources,
        source_values: combined.source_values,
        check,
    }
}
