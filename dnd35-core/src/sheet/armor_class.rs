use super::{Calculation, CalculatedValue};
use crate::bonus::{BonusType, Source};
use crate::changes::ChangeTarget;
use crate::character::ArmorData;
use crate::stats::Ability;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedArmorClass {
    pub total_ac: CalculatedValue,
    pub touch_ac: CalculatedValue,
    pub flat_footed_ac: CalculatedValue,
    pub natural_ac: CalculatedValue,
    /// Lowest max dexterity bonus among equipped armor and shields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_dex_bonus: Option<i32>,
}

pub(crate) fn calculate_armor_class(calc: &mut Calculation<'_>) -> CalculatedArmorClass {
    let mut sources = vec![Source::base("Base", 10)];

    let mut max_dex_bonus: Option<i32> = None;
    let mut worn = Vec::new();
    for (entity_type, bonus_type) in [("armor", BonusType::Armor), ("shield", BonusType::Shield)] {
        for computed in calc.equipped_of_type(entity_type) {
            let data: ArmorData = computed.entity.typed().unwrap_or_default();
            if let Some(cap) = data.max_dex_bonus {
                max_dex_bonus = Some(max_dex_bonus.map_or(cap, |current| current.min(cap)));
            }
            worn.push(
                Source::new(computed.entity.name.clone(), bonus_type, data.total_bonus())
                    .with_origin(computed.entity.entity_type.clone(), computed.entity.id.clone()),
            );
        }
    }

    let dex = calc.ability_modifier(Ability::Dexterity);
    let dex = max_dex_bonus.map_or(dex, |cap| dex.min(cap));
    sources.push(Source::new("Dexterity", BonusType::Dexterity, dex));
    sources.push(Source::new("Size", BonusType::Size, calc.number("size.modifier")));
    sources.extend(worn);

    let natural_ac = CalculatedValue::from_sources(calc.sources(|target| matches!(target, ChangeTarget::NaturalAc)));
    sources.push(Source::new("Natural armor", BonusType::NaturalArmor, natural_ac.total_value));
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::Ac)));

    let touch: Vec<Source> = sources
        .iter()
        .filter(|s| s.bonus_type.counts_for_touch_ac())
        .cloned()
        .collect();
    let flat_footed: Vec<Source> = sources
        .iter()
        .filter(|s| s.bonus_type.counts_for_flat_footed_ac())
        .cloned()
        .collect();

    let armor_class = CalculatedArmorClass {
        total_ac: CalculatedValue::from_sources(sources),
        touch_ac: CalculatedValue::from_sources(touch),
        flat_footed_ac: CalculatedValue::from_sources(flat_footed),
        natural_ac,
        max_dex_bonus,
    };

    calc.index.set("ac.total", armor_class.total_ac.total_value);
    calc.index.set("ac.touch.total", armor_class.touch_ac.total_value);
    calc.index.set("ac.flatFooted.total", armor_class.flat_footed_ac.total_value);
    calc.index.set("ac.natural.total", armor_class.natural_ac.total_value);
    armor_class
}
