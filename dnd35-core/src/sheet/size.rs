use super::Calculation;
use crate::bonus::{combine_sources, Source, SourceValue};
use crate::changes::ChangeTarget;
use crate::character::RaceData;
use crate::stats::SizeCategory;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSize {
    pub base_size: SizeCategory,
    pub current_size: SizeCategory,
    pub numeric_value: i32,
    /// Size modifier to attack rolls and armor class.
    pub modifier: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
}

/// Race size (or the base data override) shifted by `SIZE` changes.
pub(crate) fn calculate_size(calc: &mut Calculation<'_>) -> CalculatedSize {
    let race_size = calc
        .base
        .race
        .as_ref()
        .and_then(|id| calc.ctx.compendium.get(id))
        .and_then(|race| race.typed::<RaceData>())
        .map(|race| race.size);
    let base_size = calc.base.size.or(race_size).unwrap_or_default();

    let shifts = calc.sources(|target| matches!(target, ChangeTarget::Size));
    let combined = combine_sources(&shifts);
    let numeric_value = (base_size.numeric() + combined.total).clamp(
        SizeCategory::Fine.numeric(),
        SizeCategory::Colossal.numeric(),
    );
    let current_size = SizeCategory::from_numeric(numeric_value);
    let modifier = current_size.attack_and_ac_modifier();

    calc.index.set("size.base", base_size.numeric());
    calc.index.set("size.total", numeric_value);
    calc.index.set("size.modifier", modifier);

    CalculatedSize {
        base_size,
        current_size,
        numeric_value,
        modifier,
        sources: shifts,
        source_values: combined.source_values,
    }
}
