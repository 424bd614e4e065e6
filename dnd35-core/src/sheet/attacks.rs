//! Weapon attacks and the contextual changes a player can toggle on them.
//!
//! Attacks are the one part of the sheet that can be recomputed on its own:
//! [`recalculate_attack`] re-derives a single attack from a finished sheet
//! with a different contextual selection, without touching anything else.

use super::combat::iterative_attacks;
use super::compile::{report_warnings, ChangeEvaluator, CompiledChange};
use super::{Calculation, CalculatedValue, CharacterSheet};
use crate::bonus::{combine_sources, BonusType, Source, SourceOrigin, SourceValue};
use crate::changes::{AttackContextualChange, ChangeTarget};
use crate::character::WeaponData;
use crate::context::CalculationContext;
use crate::diagnostics::Diagnostics;
use crate::entity::ComputedEntity;
use crate::formula::FormulaCache;
use crate::stats::{Ability, AttackType};
use crate::variables::{SubstitutionIndex, VariableLookup};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const CONTEXTUAL_ORIGIN: &str = "contextualChange";

/// Player-toggled preview state for one attack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttackContextState {
    /// Names of the contextual changes switched on.
    pub selected_changes: BTreeSet<String>,
    /// Slider values by contextual change name, then variable identifier.
    pub variables: BTreeMap<String, BTreeMap<String, f64>>,
}

impl AttackContextState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change(mut self, name: impl Into<String>) -> Self {
        self.selected_changes.insert(name.into());
        self
    }

    pub fn with_variable(mut self, change: impl Into<String>, identifier: impl Into<String>, value: f64) -> Self {
        let change = change.into();
        self.selected_changes.insert(change.clone());
        self.variables.entry(change).or_default().insert(identifier.into(), value);
        self
    }

    fn variable(&self, change: &str, identifier: &str) -> Option<f64> {
        self.variables.get(change)?.get(identifier).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageFormula {
    /// e.g. `1d8 + 4`.
    pub formula: String,
    pub critical_formula: String,
    /// Flat damage bonuses.
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
    /// Dice added by changes, not multiplied on a critical hit.
    pub extra_dice: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedAttack {
    /// Instance id of the weapon's computed entity.
    pub instance_id: String,
    pub weapon_id: String,
    pub name: String,
    pub attack_type: AttackType,
    pub weapon: WeaponData,
    pub attack_bonus: CalculatedValue,
    /// Bonuses of a full attack, highest first.
    pub full_attack: Vec<i32>,
    pub damage: DamageFormula,
    pub critical_confirmation: CalculatedValue,
    pub applied_contextual_changes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedAttackData {
    pub attacks: Vec<CalculatedAttack>,
    /// Every contextual change on offer, defaults first.
    pub attack_context_changes: Vec<AttackContextualChange>,
}

/// Everything an attack reads from a finished (or nearly finished) sheet.
struct AttackScope<'a> {
    evaluator: ChangeEvaluator<'a>,
    formulas: &'a FormulaCache,
    index: &'a SubstitutionIndex,
    changes: &'a [CompiledChange],
    contextual: &'a [AttackContextualChange],
}

pub(crate) fn calculate_attacks(
    calc: &mut Calculation<'_>,
    contextual: Vec<AttackContextualChange>,
) -> CalculatedAttackData {
    let weapons: Vec<&ComputedEntity> = calc.equipped_of_type("weapon").collect();
    let scope = AttackScope {
        evaluator: calc.evaluator(),
        formulas: &calc.ctx.formulas,
        index: &calc.index,
        changes: calc.changes,
        contextual: &contextual,
    };
    let state = AttackContextState::default();
    let attacks = weapons
        .into_iter()
        .map(|weapon| build_attack(&scope, weapon, &state, &mut calc.diagnostics))
        .collect();
    CalculatedAttackData {
        attacks,
        attack_context_changes: contextual,
    }
}

/// Re-derive one attack of `sheet` with `state` applied.
///
/// `None` when the index is out of range or the weapon is no longer on
/// the sheet.
pub fn recalculate_attack(
    sheet: &CharacterSheet,
    attack_index: usize,
    state: &AttackContextState,
    ctx: &CalculationContext,
) -> Option<CalculatedAttack> {
    let attack = sheet.attack_data.attacks.get(attack_index)?;
    let weapon = sheet
        .computed_entities
        .iter()
        .find(|e| e.meta.instance_id == attack.instance_id)?;
    let scope = AttackScope {
        evaluator: ChangeEvaluator {
            entities: &sheet.computed_entities,
            formulas: &ctx.formulas,
        },
        formulas: &ctx.formulas,
        index: &sheet.substitution_values,
        changes: &sheet.changes,
        contextual: &sheet.attack_data.attack_context_changes,
    };
    let mut diagnostics = Diagnostics::new();
    Some(build_attack(&scope, weapon, state, &mut diagnostics))
}

#[derive(Default)]
struct AttackParts {
    attack: Vec<Source>,
    damage: Vec<Source>,
    extra_dice: Vec<String>,
    confirmation: Vec<Source>,
}

impl AttackParts {
    fn add_change(
        &mut self,
        scope: &AttackScope<'_>,
        change: &CompiledChange,
        attack_type: AttackType,
        extra: Option<&dyn VariableLookup>,
        diagnostics: &mut Diagnostics,
    ) {
        match change.target() {
            ChangeTarget::AttackRolls { attack_type: filter } if filter.applies_to(attack_type) => {
                self.attack
                    .extend(scope.evaluator.evaluate(change, scope.index, extra, diagnostics));
            }
            ChangeTarget::CriticalConfirmation { attack_type: filter } if filter.applies_to(attack_type) => {
                self.confirmation
                    .extend(scope.evaluator.evaluate(change, scope.index, extra, diagnostics));
            }
            ChangeTarget::Damage { attack_type: filter } if filter.applies_to(attack_type) => {
                let Some(text) = scope.evaluator.format(change, scope.index, extra, diagnostics) else {
                    return;
                };
                match text.trim().parse::<i32>() {
                    Ok(value) => {
                        let mut source = Source::new(change.name.clone(), change.change.bonus_type, value)
                            .with_origin(change.origin.origin_type.clone(), change.origin.origin_id.clone());
                        if change.change.stacks {
                            source = source.stacking();
                        }
                        self.damage.push(source);
                    }
                    Err(_) => self.extra_dice.push(text),
                }
            }
            _ => {}
        }
    }
}

fn build_attack(
    scope: &AttackScope<'_>,
    weapon: &ComputedEntity,
    state: &AttackContextState,
    diagnostics: &mut Diagnostics,
) -> CalculatedAttack {
    let entity = &weapon.entity;
    let data: WeaponData = entity.typed().unwrap_or_default();
    let attack_type = data.attack_type;
    let number = |key: &str| scope.index.number(key).map_or(0, |v| v.floor() as i32);
    let modifier = |ability: Ability| number(&format!("ability.{}.modifier", ability.key()));

    let attack_ability = if attack_type == AttackType::Ranged || data.finesse {
        Ability::Dexterity
    } else {
        Ability::Strength
    };
    let bab = number("bab.total");

    let mut parts = AttackParts::default();
    parts.attack.push(Source::base("Base attack bonus", bab));
    parts.attack.push(Source::new(
        format!("{} modifier", attack_ability.name()),
        BonusType::Untyped,
        modifier(attack_ability),
    ));
    parts.attack.push(Source::new("Size", BonusType::Size, number("size.modifier")));
    parts.attack.push(
        Source::new(entity.name.clone(), BonusType::Enhancement, data.attack_enhancement())
            .with_origin(entity.entity_type.clone(), entity.id.clone()),
    );

    parts.damage.push(Source::new(
        "Strength",
        BonusType::Untyped,
        strength_damage(&data, modifier(Ability::Strength)),
    ));
    parts.damage.push(
        Source::new(entity.name.clone(), BonusType::Enhancement, data.enhancement_bonus)
            .with_origin(entity.entity_type.clone(), entity.id.clone()),
    );

    for change in scope.changes {
        parts.add_change(scope, change, attack_type, None, diagnostics);
    }

    let mut applied = Vec::new();
    for contextual in scope.contextual {
        if !contextual.available || !contextual.applies_to.applies_to(attack_type) {
            continue;
        }
        if !contextual.is_mandatory() && !state.selected_changes.contains(&contextual.name) {
            continue;
        }
        let mut variables = SubstitutionIndex::new();
        for variable in &contextual.variables {
            let value = state
                .variable(&contextual.name, &variable.identifier)
                .unwrap_or(variable.min);
            variables.set(variable.identifier.clone(), variable.clamp(value));
        }
        for change in &contextual.changes {
            let compiled = CompiledChange {
                change: change.clone(),
                name: change.name.clone().unwrap_or_else(|| contextual.name.clone()),
                origin: SourceOrigin {
                    origin_type: CONTEXTUAL_ORIGIN.to_string(),
                    origin_id: contextual.name.clone(),
                },
                variables: SubstitutionIndex::new(),
            };
            parts.add_change(scope, &compiled, attack_type, Some(&variables as &dyn VariableLookup), diagnostics);
        }
        applied.push(contextual.name.clone());
    }

    let attack_bonus = CalculatedValue::from_sources(parts.attack);
    let full_attack = iterative_attacks(bab)
        .into_iter()
        .map(|b| attack_bonus.total_value - (bab - b))
        .collect();

    let mut confirmation = vec![Source::base("Attack bonus", attack_bonus.total_value)];
    confirmation.extend(parts.confirmation);
    let critical_confirmation = CalculatedValue::from_sources(confirmation);

    let damage = damage_formula(
        scope.formulas,
        &weapon.meta.instance_id,
        &data,
        parts.damage,
        parts.extra_dice,
        diagnostics,
    );

    tracing::debug!(
        weapon = %entity.id,
        attack = attack_bonus.total_value,
        damage = %damage.formula,
        "attack"
    );
    CalculatedAttack {
        instance_id: weapon.meta.instance_id.clone(),
        weapon_id: entity.id.clone(),
        name: entity.name.clone(),
        attack_type,
        weapon: data,
        attack_bonus,
        full_attack,
        damage,
        critical_confirmation,
        applied_contextual_changes: applied,
    }
}

/// Strength to damage: one and a half times for two-handed melee weapons
/// (penalties are not multiplied), none for ranged unless the weapon says so.
fn strength_damage(weapon: &WeaponData, strength: i32) -> i32 {
    match weapon.attack_type {
        AttackType::Ranged if weapon.strength_to_damage != Some(true) => 0,
        AttackType::Melee if weapon.two_handed && strength > 0 => strength * 3 / 2,
        _ => strength,
    }
}

fn damage_formula(
    formulas: &FormulaCache,
    context: &str,
    weapon: &WeaponData,
    sources: Vec<Source>,
    extra_dice: Vec<String>,
    diagnostics: &mut Diagnostics,
) -> DamageFormula {
    let combined = combine_sources(&sources);
    let empty = SubstitutionIndex::new();
    let base = format!("{} + ({})", weapon.damage_dice, combined.total);

    let mut normal = base.clone();
    let mut critical = format!("({base}) * {}", weapon.critical_multiplier.max(1));
    for dice in &extra_dice {
        normal.push_str(&format!(" + ({dice})"));
        critical.push_str(&format!(" + ({dice})"));
    }

    let formula = formulas.format_str(&normal, &empty);
    let critical_formula = formulas.format_str(&critical, &empty);
    report_warnings(diagnostics, context, formula.warnings);
    report_warnings(diagnostics, context, critical_formula.warnings);

    DamageFormula {
        formula: formula.value,
        critical_formula: critical_formula.value,
        sources,
        source_values: combined.source_values,
        extra_dice,
    }
}
