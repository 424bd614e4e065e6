//! Resolution roots built from base data, and the change list collected
//! from whatever resolved onto the character.

use super::Calculation;
use crate::bonus::{Source, SourceOrigin};
use crate::cge::CgeRoot;
use crate::changes::{AttackContextualChange, Change, ChangeTarget};
use crate::character::{CharacterBaseData, ClassData, SystemLevelsData};
use crate::conditions::ConditionContext;
use crate::context::CalculationContext;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::entity::{ComputedEntity, EntitySource, OriginType};
use crate::formula::{Evaluation, Formula, FormulaCache, FormulaWarning};
use crate::variables::{Layered, SubstitutionIndex, VariableLookup, ENTITY_PREFIX};
use std::collections::HashSet;

// ============================================================================
// Roots
// ============================================================================

/// One root per race, class level, character level, equipped item, active
/// buff and custom entity, in that order.
pub(crate) fn build_roots(
    base: &CharacterBaseData,
    ctx: &CalculationContext,
    diagnostics: &mut Diagnostics,
) -> Vec<CgeRoot> {
    let compendium = &ctx.compendium;
    let mut roots = Vec::new();

    if let Some(race_id) = &base.race {
        match compendium.get(race_id) {
            Some(race) => roots.push(CgeRoot::entity(
                format!("race:{race_id}"),
                EntitySource {
                    origin_type: OriginType::Race,
                    origin_id: race_id.clone(),
                    name: race.name.clone(),
                },
                race.clone(),
            )),
            None => diagnostics.push(
                Diagnostic::warning(DiagnosticKind::EntityNotFound, format!("Race '{race_id}' not found"))
                    .with_context("race"),
            ),
        }
    }

    let mut missing_classes: HashSet<&str> = HashSet::new();
    let class_levels = base.class_levels();
    for entry in &class_levels {
        let Some(class) = compendium.get(&entry.class_id) else {
            if missing_classes.insert(entry.class_id.as_str()) {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::ClassNotFound,
                        format!("Class '{}' not found", entry.class_id),
                    )
                    .with_context(format!("level {}", entry.character_level)),
                );
            }
            continue;
        };
        let data: ClassData = class.typed().unwrap_or_default();
        let key = format!("class:{}:{}", entry.class_id, entry.class_level);
        let source = EntitySource {
            origin_type: OriginType::ClassLevel,
            origin_id: format!("{}:{}", entry.class_id, entry.class_level),
            name: format!("{} {}", class.name, entry.class_level),
        };
        let providers = data.levels.providers_at(entry.class_level).to_vec();
        if entry.class_level == 1 {
            let mut root = CgeRoot::entity(key, source, class.clone());
            root.providers = providers;
            roots.push(root);
        } else if !providers.is_empty() {
            roots.push(CgeRoot::providers(key, source, providers));
        }
    }

    if let Some(system_id) = &base.system_levels {
        match compendium.get(system_id) {
            Some(system) => {
                let data: SystemLevelsData = system.typed().unwrap_or_default();
                for level in 1..=base.character_level() {
                    let providers = data.levels.providers_at(level);
                    if providers.is_empty() {
                        continue;
                    }
                    roots.push(CgeRoot::providers(
                        format!("level:{level}"),
                        EntitySource {
                            origin_type: OriginType::CharacterLevel,
                            origin_id: level.to_string(),
                            name: format!("Level {level}"),
                        },
                        providers.to_vec(),
                    ));
                }
            }
            None => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::EntityNotFound,
                    format!("System level table '{system_id}' not found"),
                )
                .with_context("systemLevels"),
            ),
        }
    }

    for item in base.equipment.iter().filter(|i| i.equipped) {
        match compendium.get(&item.item_id) {
            Some(entity) => roots.push(CgeRoot::entity(
                format!("item:{}", item.instance_id),
                EntitySource {
                    origin_type: OriginType::Item,
                    origin_id: item.instance_id.clone(),
                    name: entity.name.clone(),
                },
                entity.clone(),
            )),
            None => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::EntityNotFound,
                    format!("Item '{}' not found", item.item_id),
                )
                .with_context(format!("equipment {}", item.instance_id)),
            ),
        }
    }

    for buff in base.buffs.iter().filter(|b| b.active) {
        match compendium.get(&buff.buff_id) {
            Some(entity) => roots.push(CgeRoot::entity(
                format!("buff:{}", buff.instance_id),
                EntitySource {
                    origin_type: OriginType::Buff,
                    origin_id: buff.instance_id.clone(),
                    name: entity.name.clone(),
                },
                entity.clone(),
            )),
            None => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::EntityNotFound,
                    format!("Buff '{}' not found", buff.buff_id),
                )
                .with_context(format!("buff {}", buff.instance_id)),
            ),
        }
    }

    for entity in &base.custom_entities {
        roots.push(CgeRoot::entity(
            format!("custom:{}", entity.id),
            EntitySource {
                origin_type: OriginType::Custom,
                origin_id: entity.id.clone(),
                name: entity.name.clone(),
            },
            entity.clone(),
        ));
    }

    tracing::debug!(roots = roots.len(), "built resolution roots");
    roots
}

// ============================================================================
// Changes
// ============================================================================

/// A change lifted off an active entity, ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledChange {
    pub change: Change,
    /// Display name of the resulting source.
    pub name: String,
    pub origin: SourceOrigin,
    /// The owning entity's fields as `@entity.*`.
    pub variables: SubstitutionIndex,
}

impl CompiledChange {
    pub fn target(&self) -> &ChangeTarget {
        &self.change.target
    }
}

/// Changes and contextual changes of every active entity, in entity order.
pub(crate) fn compile_changes(entities: &[ComputedEntity]) -> (Vec<CompiledChange>, Vec<AttackContextualChange>) {
    let mut changes = Vec::new();
    let mut contextual = Vec::new();
    for computed in entities.iter().filter(|e| e.is_active()) {
        let entity = &computed.entity;
        contextual.extend(entity.contextual_changes.iter().cloned());
        if entity.changes.is_empty() {
            continue;
        }
        let variables = entity.variables(ENTITY_PREFIX);
        let origin = SourceOrigin {
            origin_type: entity.entity_type.clone(),
            origin_id: entity.id.clone(),
        };
        for change in &entity.changes {
            if change.target == ChangeTarget::Unknown {
                tracing::debug!(entity = %entity.id, "skipping change with unknown target");
                continue;
            }
            changes.push(CompiledChange {
                change: change.clone(),
                name: change.name.clone().unwrap_or_else(|| entity.name.clone()),
                origin: origin.clone(),
                variables: variables.clone(),
            });
        }
    }
    (changes, contextual)
}

/// Record formula warnings against the source they came from.
pub(crate) fn report_warnings(diagnostics: &mut Diagnostics, context: &str, warnings: Vec<FormulaWarning>) {
    for warning in warnings {
        let kind = match warning {
            FormulaWarning::UnknownVariable(_) | FormulaWarning::NonNumericVariable(_) => DiagnosticKind::UnknownVariable,
            _ => DiagnosticKind::FormulaError,
        };
        diagnostics.push(Diagnostic::warning(kind, warning.to_string()).with_context(context));
    }
}

/// Checks conditions and evaluates compiled changes.
#[derive(Clone, Copy)]
pub(crate) struct ChangeEvaluator<'a> {
    pub entities: &'a [ComputedEntity],
    pub formulas: &'a FormulaCache,
}

impl ChangeEvaluator<'_> {
    /// Numeric value of `change`, or `None` when its conditions fail.
    pub(crate) fn evaluate(
        &self,
        change: &CompiledChange,
        index: &SubstitutionIndex,
        extra: Option<&dyn VariableLookup>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Source> {
        let value = self.run(change, index, extra, diagnostics, |formulas, formula, vars| {
            formulas.evaluate(formula, vars)
        })?;
        let mut source = Source::new(change.name.clone(), change.change.bonus_type, value.floor() as i32)
            .with_origin(change.origin.origin_type.clone(), change.origin.origin_id.clone());
        if change.change.stacks {
            source = source.stacking();
        }
        Some(source)
    }

    /// Formatted formula text of `change`, dice kept symbolic.
    pub(crate) fn format(
        &self,
        change: &CompiledChange,
        index: &SubstitutionIndex,
        extra: Option<&dyn VariableLookup>,
        diagnostics: &mut Diagnostics,
    ) -> Option<String> {
        self.run(change, index, extra, diagnostics, |formulas, formula, vars| {
            formulas.format(formula, vars)
        })
    }

    fn run<T>(
        &self,
        change: &CompiledChange,
        index: &SubstitutionIndex,
        extra: Option<&dyn VariableLookup>,
        diagnostics: &mut Diagnostics,
        body: impl FnOnce(&FormulaCache, &Formula, &dyn VariableLookup) -> Evaluation<T>,
    ) -> Option<T> {
        let mut variables = Layered::new(index).then(&change.variables);
        if let Some(extra) = extra {
            variables = variables.then(extra);
        }
        let conditions = ConditionContext {
            variables: &variables,
            entities: self.entities,
            formulas: self.formulas,
        }
        .evaluate(&change.change.conditions);
        report_warnings(diagnostics, &change.name, conditions.warnings);
        if !conditions.value {
            return None;
        }
        let evaluation = body(self.formulas, &change.change.formula, &variables);
        report_warnings(diagnostics, &change.name, evaluation.warnings);
        Some(evaluation.value)
    }
}

impl<'a> Calculation<'a> {
    /// The evaluator does not borrow `self`.
    pub(crate) fn evaluator(&self) -> ChangeEvaluator<'a> {
        ChangeEvaluator {
            entities: self.entities,
            formulas: &self.ctx.formulas,
        }
    }

    /// Evaluate every change whose target satisfies `matches`.
    pub(crate) fn sources(&mut self, matches: impl Fn(&ChangeTarget) -> bool) -> Vec<Source> {
        let evaluator = self.evaluator();
        self.changes
            .iter()
            .filter(|c| matches(c.target()))
            .filter_map(|c| evaluator.evaluate(c, &self.index, None, &mut self.diagnostics))
            .collect()
    }
}
