use super::Calculation;
use crate::bonus::{combine_sources, BonusType, Source, SourceValue};
use crate::changes::ChangeTarget;
use crate::stats::Ability;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedHitPoints {
    pub max_hp: i32,
    pub current_hp: i32,
    pub current_damage: i32,
    pub temporary_hp: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
    pub temporary_hp_sources: Vec<SourceValue>,
}

pub(crate) fn calculate_hit_points(calc: &mut Calculation<'_>) -> CalculatedHitPoints {
    let base = calc.base;
    let level = base.character_level();

    let mut sources: Vec<Source> = base
        .class_levels()
        .into_iter()
        .map(|entry| {
            Source::base(
                format!("Level {} ({} {})", entry.character_level, entry.class_id, entry.class_level),
                entry.hp_roll.unwrap_or(0),
            )
        })
        .collect();
    let con = calc.ability_modifier(Ability::Constitution);
    sources.push(Source::new("Constitution", BonusType::Untyped, con * level as i32));
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::Hp)));
    let combined = combine_sources(&sources);
    let max_hp = combined.total.max(0);

    let mut temporary = vec![Source::base("Temporary hit points", base.temporary_hp)];
    temporary.extend(calc.sources(|target| matches!(target, ChangeTarget::TemporaryHp)));
    let temporary = combine_sources(&temporary);
    let temporary_hp = temporary.total.max(0);

    let current_damage = base.current_damage.max(0);
    let current_hp = match base.custom_current_hp {
        Some(custom) => custom.min(max_hp),
        None => max_hp - current_damage,
    };

    calc.index.set("hp.max", max_hp);
    calc.index.set("hp.current", current_hp);
    calc.index.set("hp.temporary", temporary_hp);
    calc.index.set("hp.damage", current_damage);

    CalculatedHitPoints {
        max_hp,
        current_hp,
        current_damage,
        temporary_hp,
        sources,
        source_values: combined.source_values,
        temporary_hp_sources: temporary.source_values,
    }
}
