//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use dnd35_core::stats::Ability;
use dnd35_core::{calculate_character_sheet, CalculationContext, CharacterBaseData, CharacterSheet, Compendium};

pub const SRD_JSON: &str = include_str!("../fixtures/srd.json");

pub fn compendium() -> Compendium {
    Compendium::from_json(SRD_JSON).unwrap()
}

pub fn context() -> CalculationContext {
    CalculationContext::new(compendium())
}

/// Human with every ability at 10.
pub fn human(name: &str) -> CharacterBaseData {
    CharacterBaseData::new(name).with_race("human")
}

/// Human fighter rolling 10 hit points per level.
pub fn fighter(level: usize) -> CharacterBaseData {
    human("Valeros")
        .with_ability(Ability::Strength, 16)
        .with_ability(Ability::Constitution, 14)
        .with_levels("fighter", level, 10)
}

pub fn sheet(base: &CharacterBaseData) -> CharacterSheet {
    calculate_character_sheet(base, &context())
}
