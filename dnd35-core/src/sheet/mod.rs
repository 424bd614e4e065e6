//! Character sheet calculation.
//!
//! [`calculate_character_sheet`] resolves every provider on the character,
//! collects the changes of the entities that ended up active, and then
//! computes each stat in a fixed order: size, ability scores, initiative,
//! hit points, base attack bonus, saving throws, armor class, skills,
//! speeds, custom variables, resources and attacks. Each step writes its totals into the
//! substitution index so formulas in later steps can read them.
//!
//! Nothing here fails. Missing content and broken formulas become
//! [`Diagnostics`] shipped on the sheet.

mod abilities;
mod armor_class;
mod attacks;
mod combat;
mod compile;
mod custom_variables;
mod hit_points;
mod resources;
mod size;
mod skills;
mod speeds;

pub use abilities::CalculatedAbility;
pub use armor_class::CalculatedArmorClass;
pub use attacks::{recalculate_attack, AttackContextState, CalculatedAttack, CalculatedAttackData, DamageFormula};
pub use combat::{CalculatedBaseAttackBonus, CalculatedSavingThrow};
pub use compile::CompiledChange;
pub use custom_variables::CalculatedCustomVariable;
pub use hit_points::CalculatedHitPoints;
pub use resources::{consume_resource, recharge_all_resources, recharge_resource, CalculatedResource};
pub use size::CalculatedSize;
pub use skills::{CalculatedSkill, SkillDefinition, SRD_SKILLS};

use crate::bonus::{combine_sources, Source, SourceValue};
use crate::cge::{resolve_cge, ResolveContext, SelectionStatus};
use crate::changes::DEFAULT_CONTEXTUAL_CHANGES;
use crate::character::{CharacterBaseData, CharacterId, ClassData};
use crate::context::CalculationContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::entity::ComputedEntity;
use crate::stats::{ability_modifier, Ability, SavingThrow, SpeedKind};
use crate::variables::SubstitutionIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A derived number and everything that went into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedValue {
    pub total_value: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
}

impl CalculatedValue {
    pub fn from_sources(sources: Vec<Source>) -> Self {
        let combined = combine_sources(&sources);
        Self {
            total_value: combined.total,
            sources,
            source_values: combined.source_values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLevelSummary {
    pub class_id: String,
    pub name: String,
    pub level: usize,
}

/// The fully derived character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSheet {
    pub id: CharacterId,
    pub name: String,
    pub level: usize,
    pub classes: Vec<ClassLevelSummary>,
    pub size: CalculatedSize,
    pub ability_scores: BTreeMap<Ability, CalculatedAbility>,
    pub initiative: CalculatedValue,
    pub hit_points: CalculatedHitPoints,
    pub base_attack_bonus: CalculatedBaseAttackBonus,
    pub saving_throws: BTreeMap<SavingThrow, CalculatedSavingThrow>,
    pub armor_class: CalculatedArmorClass,
    pub skills: BTreeMap<String, CalculatedSkill>,
    pub speeds: BTreeMap<SpeedKind, CalculatedValue>,
    /// Resource properties are mirrored here as `resources.{id}.*`.
    pub custom_variables: Vec<CalculatedCustomVariable>,
    pub resources: BTreeMap<String, CalculatedResource>,
    pub attack_data: CalculatedAttackData,
    /// Everything resolved onto the character, suppressed entities included.
    pub computed_entities: Vec<ComputedEntity>,
    pub selections: Vec<SelectionStatus>,
    pub substitution_values: SubstitutionIndex,
    pub diagnostics: Diagnostics,
    /// Kept for attack recalculation.
    #[serde(skip)]
    pub changes: Vec<CompiledChange>,
}

impl CharacterSheet {
    pub fn ability(&self, ability: Ability) -> Option<&CalculatedAbility> {
        self.ability_scores.get(&ability)
    }

    pub fn saving_throw(&self, save: SavingThrow) -> Option<&CalculatedSavingThrow> {
        self.saving_throws.get(&save)
    }

    pub fn skill(&self, skill_id: &str) -> Option<&CalculatedSkill> {
        self.skills.get(skill_id)
    }

    pub fn resource(&self, resource_id: &str) -> Option<&CalculatedResource> {
        self.resources.get(resource_id)
    }

    pub fn speed(&self, kind: SpeedKind) -> Option<&CalculatedValue> {
        self.speeds.get(&kind)
    }

    pub fn custom_variable(&self, unique_id: &str) -> Option<&CalculatedCustomVariable> {
        self.custom_variables.iter().find(|v| v.unique_id == unique_id)
    }

    pub fn active_entities(&self) -> impl Iterator<Item = &ComputedEntity> {
        self.computed_entities.iter().filter(|e| e.is_active())
    }
}

/// A class the character has levels in, with its typed data.
#[derive(Debug, Clone)]
pub(crate) struct ClassInfo {
    pub id: String,
    pub name: String,
    pub levels: usize,
    pub data: ClassData,
}

/// Shared state threaded through the stat steps.
pub(crate) struct Calculation<'a> {
    pub base: &'a CharacterBaseData,
    pub ctx: &'a CalculationContext,
    pub classes: Vec<ClassInfo>,
    pub entities: &'a [ComputedEntity],
    pub changes: &'a [CompiledChange],
    pub index: SubstitutionIndex,
    pub diagnostics: Diagnostics,
}

impl<'a> Calculation<'a> {
    pub(crate) fn number(&self, key: &str) -> i32 {
        self.index.number(key).map_or(0, |v| v.floor() as i32)
    }

    pub(crate) fn ability_modifier(&self, ability: Ability) -> i32 {
        self.number(&format!("ability.{}.modifier", ability.key()))
    }

    /// Active entities of `entity_type` placed directly by an item root.
    pub(crate) fn equipped_of_type(&self, entity_type: &'static str) -> impl Iterator<Item = &'a ComputedEntity> + 'a {
        let entities: &'a [ComputedEntity] = self.entities;
        entities.iter().filter(move |e| {
            e.is_active() && e.entity.entity_type == entity_type && e.meta.instance_id.starts_with("item:")
        })
    }
}

fn class_infos(base: &CharacterBaseData, ctx: &CalculationContext) -> Vec<ClassInfo> {
    base.levels_by_class()
        .into_iter()
        .filter_map(|(id, levels)| {
            let entity = ctx.compendium.get(&id)?;
            Some(ClassInfo {
                name: entity.name.clone(),
                data: entity.typed().unwrap_or_default(),
                id,
                levels,
            })
        })
        .collect()
}

/// Variables visible before anything resolves: level, class levels, and
/// unmodified ability scores and base attack bonus.
fn base_index(base: &CharacterBaseData, classes: &[ClassInfo]) -> SubstitutionIndex {
    let mut index = SubstitutionIndex::new();
    index.set("level", base.character_level() as f64);
    for class in classes {
        index.set(format!("class.{}.level", class.id), class.levels as f64);
    }
    for ability in Ability::all() {
        let input = base.base_abilities.get(ability);
        let score = (input.base_score - input.drain - input.damage - input.penalty).max(0);
        let key = ability.key();
        index.set(format!("ability.{key}.base"), input.base_score);
        index.set(format!("ability.{key}.score"), score);
        index.set(format!("ability.{key}.modifier"), ability_modifier(score));
    }
    let bab: i32 = classes
        .iter()
        .map(|c| c.data.bab_progression.base_attack_bonus(c.levels))
        .sum();
    index.set("bab.base", bab);
    index.set("bab.total", bab);
    index
}

/// Compute the full sheet for `base` against the context's compendium.
pub fn calculate_character_sheet(base: &CharacterBaseData, ctx: &CalculationContext) -> CharacterSheet {
    let span = tracing::debug_span!("calculate_character_sheet", character = %base.name);
    let _enter = span.enter();

    let mut diagnostics = Diagnostics::new();
    let roots = compile::build_roots(base, ctx, &mut diagnostics);
    let classes = class_infos(base, ctx);
    let index = base_index(base, &classes);

    let resolve_ctx =
        ResolveContext::new(&ctx.compendium, &base.selections, &index).with_max_depth(ctx.options.max_provider_depth);
    let resolution = resolve_cge(&roots, &resolve_ctx);
    diagnostics.append(resolution.diagnostics);

    for computed in &resolution.entities {
        for violation in ctx.compendium.violations().iter().filter(|v| v.entity_id == computed.entity.id) {
            diagnostics.push(
                Diagnostic::warning(DiagnosticKind::SchemaViolation, violation.to_string())
                    .with_context(computed.meta.instance_id.clone()),
            );
        }
    }

    let (changes, entity_contextual) = compile::compile_changes(&resolution.entities);
    tracing::debug!(
        entities = resolution.entities.len(),
        changes = changes.len(),
        "collected changes"
    );

    let mut calc = Calculation {
        base,
        ctx,
        classes,
        entities: &resolution.entities,
        changes: &changes,
        index,
        diagnostics,
    };

    let size = size::calculate_size(&mut calc);
    let ability_scores = abilities::calculate_ability_scores(&mut calc);
    let initiative = combat::calculate_initiative(&mut calc);
    let hit_points = hit_points::calculate_hit_points(&mut calc);
    let base_attack_bonus = combat::calculate_base_attack_bonus(&mut calc);
    let saving_throws = combat::calculate_saving_throws(&mut calc);
    let armor_class = armor_class::calculate_armor_class(&mut calc);
    let skills = skills::calculate_skills(&mut calc);
    let speeds = speeds::calculate_speeds(&mut calc);
    let mut custom_variables = custom_variables::calculate_custom_variables(&mut calc);
    let resources = resources::calculate_resources(&mut calc);
    custom_variables.extend(resources.values().flat_map(CalculatedResource::custom_variables));

    let mut contextual = Vec::new();
    if ctx.options.include_default_contextual_changes {
        contextual.extend(DEFAULT_CONTEXTUAL_CHANGES.iter().cloned());
    }
    contextual.extend(entity_contextual);
    let attack_data = attacks::calculate_attacks(&mut calc, contextual);

    let Calculation {
        classes,
        index,
        diagnostics,
        ..
    } = calc;

    CharacterSheet {
        id: base.id,
        name: base.name.clone(),
        level: base.character_level(),
        classes: classes
            .into_iter()
            .map(|c| ClassLevelSummary {
                class_id: c.id,
                name: c.name,
                level: c.levels,
            })
            .collect(),
        size,
        ability_scores,
        initiative,
        hit_points,
        base_attack_bonus,
        saving_throws,
        armor_class,
        skills,
        speeds,
        custom_variables,
        resources,
        attack_data,
        computed_entities: resolution.entities,
        selections: resolution.selections,
        substitution_values: index,
        diagnostics,
        changes,
    }
}
