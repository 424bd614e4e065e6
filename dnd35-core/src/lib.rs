//! D&D 3.5 character sheet calculation engine.
//!
//! This crate provides:
//! - Typed bonuses and the 3.5 stacking rules
//! - A formula language with dice and `@variable` references
//! - Compendium entities, schemas and filter configurations
//! - Provider resolution for granted and chosen entities
//! - Deterministic character sheet calculation
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd35_core::{calculate_character_sheet, CalculationContext, CharacterBaseData, Compendium};
//!
//! let compendium = Compendium::from_json(&std::fs::read_to_string("srd.json")?)?;
//! let ctx = CalculationContext::new(compendium);
//!
//! let fighter = CharacterBaseData::new("Thorin")
//!     .with_race("dwarf")
//!     .with_levels("fighter", 3, 8)
//!     .with_item("longsword");
//!
//! let sheet = calculate_character_sheet(&fighter, &ctx);
//! println!("AC {}", sheet.armor_class.total_ac.total_value);
//! ```

pub mod ability_generation;
pub mod bonus;
pub mod cge;
pub mod changes;
pub mod character;
pub mod compendium;
pub mod conditions;
pub mod context;
pub mod diagnostics;
pub mod dice;
pub mod entity;
pub mod filter;
pub mod formula;
pub mod sheet;
pub mod stats;
pub mod variables;

// Primary public API
pub use ability_generation::{roll_4d6_drop_lowest, AbilityMethod, AbilityRoll};
pub use bonus::{combine_sources, BonusType, CombinedSources, Source, SourceValue};
pub use character::{CharacterBaseData, CharacterId};
pub use compendium::{Compendium, CompendiumDataPort, CompendiumError, InMemoryCompendiumPort};
pub use context::{CalculationContext, CalculationOptions};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use entity::{ComputedEntity, StandardEntity};
pub use formula::{evaluate_formula, format_formula, Formula};
pub use sheet::{
    calculate_character_sheet, consume_resource, recalculate_attack, recharge_resource, AttackContextState,
    CharacterSheet,
};
