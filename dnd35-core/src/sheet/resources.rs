//! Resource pools declared in the `resources` field of active entities,
//! e.g. daily bardic music uses.
//!
//! Each property (`max`, `min`, `defaultChargesPerUse`, `rechargeAmount`)
//! is a base formula plus every `CUSTOM_VARIABLE` change targeting
//! `resources.{id}.{property}`, and is published under that key. The
//! stored current value is reported unclamped; [`consume_resource`] and
//! [`recharge_resource`] keep it within bounds when they update it.

use super::compile::CompiledChange;
use super::custom_variables::CalculatedCustomVariable;
use super::{Calculation, CalculatedValue, CharacterSheet};
use crate::bonus::{BonusType, Source, SourceOrigin};
use crate::changes::{Change, ChangeTarget};
use crate::character::{CharacterBaseData, ResourceDefinition};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::formula::Formula;
use crate::variables::{SubstitutionIndex, ENTITY_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const RESOURCE_PREFIX: &str = "resources.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedResource {
    pub unique_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max: CalculatedValue,
    pub min: CalculatedValue,
    pub current_value: i32,
    pub default_charges_per_use: CalculatedValue,
    pub recharge_amount: CalculatedValue,
}

impl CalculatedResource {
    /// Each property as a custom variable named `resources.{id}.{property}`.
    pub fn custom_variables(&self) -> Vec<CalculatedCustomVariable> {
        let current = CalculatedValue::from_sources(vec![Source::base("Current value", self.current_value)]);
        [
            ("max", &self.max),
            ("min", &self.min),
            ("current", &current),
            ("defaultChargesPerUse", &self.default_charges_per_use),
            ("rechargeAmount", &self.recharge_amount),
        ]
        .into_iter()
        .map(|(property, value)| CalculatedCustomVariable {
            unique_id: format!("{RESOURCE_PREFIX}{}.{property}", self.unique_id),
            total_value: value.total_value,
            sources: value.sources.clone(),
            source_values: value.source_values.clone(),
        })
        .collect()
    }
}

/// A definition together with the entity that declared it.
struct DeclaredResource {
    definition: ResourceDefinition,
    origin: SourceOrigin,
    variables: SubstitutionIndex,
}

fn declared_resources(calc: &mut Calculation<'_>) -> Vec<DeclaredResource> {
    let entities = calc.entities;
    let mut declared: Vec<DeclaredResource> = Vec::new();
    for computed in entities.iter().filter(|e| e.is_active()) {
        let entity = &computed.entity;
        let Some(raw) = entity.fields.get("resources") else {
            continue;
        };
        let definitions: Vec<ResourceDefinition> = match serde_json::from_value(raw.clone()) {
            Ok(definitions) => definitions,
            Err(error) => {
                calc.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::SchemaViolation,
                        format!("{}: unreadable resources: {error}", entity.id),
                    )
                    .with_context(computed.meta.instance_id.clone()),
                );
                continue;
            }
        };
        for definition in definitions {
            if declared.iter().any(|d| d.definition.resource_id == definition.resource_id) {
                tracing::debug!(resource = %definition.resource_id, entity = %entity.id, "resource already declared");
                continue;
            }
            declared.push(DeclaredResource {
                definition,
                origin: SourceOrigin {
                    origin_type: entity.entity_type.clone(),
                    origin_id: entity.id.clone(),
                },
                variables: entity.variables(ENTITY_PREFIX),
            });
        }
    }
    declared
}

/// Base formula plus matching custom variable changes, published to the index.
fn property(calc: &mut Calculation<'_>, declared: &DeclaredResource, property: &str, formula: Formula) -> CalculatedValue {
    let resource = &declared.definition;
    let key = format!("{RESOURCE_PREFIX}{}.{property}", resource.resource_id);
    let mut change = Change::new(
        ChangeTarget::CustomVariable { unique_id: key.clone() },
        String::new(),
        BonusType::Base,
    );
    change.formula = formula;
    let base = CompiledChange {
        change,
        name: format!("{} {property}", resource.name),
        origin: declared.origin.clone(),
        variables: declared.variables.clone(),
    };

    let evaluator = calc.evaluator();
    let mut sources: Vec<Source> = evaluator
        .evaluate(&base, &calc.index, None, &mut calc.diagnostics)
        .into_iter()
        .collect();
    sources.extend(calc.sources(|target| matches!(target, ChangeTarget::CustomVariable { unique_id } if *unique_id == key)));
    let value = CalculatedValue::from_sources(sources);
    calc.index.set(key, value.total_value);
    value
}

pub(crate) fn calculate_resources(calc: &mut Calculation<'_>) -> BTreeMap<String, CalculatedResource> {
    let mut resources = BTreeMap::new();
    for declared in declared_resources(calc) {
        let definition = &declared.definition;
        let max = property(calc, &declared, "max", definition.max_value_formula.clone());
        let min = property(
            calc,
            &declared,
            "min",
            definition.min_value_formula.clone().unwrap_or_else(|| Formula::expression("0")),
        );
        let default_charges_per_use = property(
            calc,
            &declared,
            "defaultChargesPerUse",
            definition
                .default_charges_per_use_formula
                .clone()
                .unwrap_or_else(|| Formula::expression("1")),
        );
        let recharge_amount = property(
            calc,
            &declared,
            "rechargeAmount",
            definition
                .recharge_formula
                .clone()
                .unwrap_or_else(|| definition.max_value_formula.clone()),
        );

        let stored = calc
            .base
            .resource_current_values
            .get(&definition.resource_id)
            .map(|state| state.current_value);
        let current_value = match (stored, &definition.initial_value_formula) {
            (Some(current), _) => current,
            (None, Some(initial)) => property(calc, &declared, "initial", initial.clone()).total_value,
            (None, None) => max.total_value,
        };
        calc.index.set(
            format!("{RESOURCE_PREFIX}{}.current", definition.resource_id),
            current_value,
        );

        tracing::debug!(resource = %definition.resource_id, max = max.total_value, current = current_value, "resource");
        resources.insert(
            definition.resource_id.clone(),
            CalculatedResource {
                unique_id: definition.resource_id.clone(),
                name: definition.name.clone(),
                description: definition.description.clone(),
                max,
                min,
                current_value,
                default_charges_per_use,
                recharge_amount,
            },
        );
    }
    resources
}

/// True for custom variable ids owned by a resource.
pub(crate) fn is_resource_variable(unique_id: &str) -> bool {
    unique_id.starts_with(RESOURCE_PREFIX)
}

/// Spend `charges` (default charges per use when `None`), never going below
/// the minimum. Returns the new current value.
pub fn consume_resource(base: &mut CharacterBaseData, resource: &CalculatedResource, charges: Option<i32>) -> i32 {
    let charges = charges.unwrap_or(resource.default_charges_per_use.total_value);
    let current = resource
        .current_value
        .saturating_sub(charges)
        .max(resource.min.total_value);
    base.set_resource_current(&resource.unique_id, current);
    current
}

/// Restore `amount` (the recharge amount when `None`), never going above
/// the maximum. Returns the new current value.
pub fn recharge_resource(base: &mut CharacterBaseData, resource: &CalculatedResource, amount: Option<i32>) -> i32 {
    let amount = amount.unwrap_or(resource.recharge_amount.total_value);
    let current = resource
        .current_value
        .saturating_add(amount)
        .min(resource.max.total_value);
    base.set_resource_current(&resource.unique_id, current);
    current
}

/// Recharge every resource on `sheet` by its recharge amount, as after a rest.
pub fn recharge_all_resources(base: &mut CharacterBaseData, sheet: &CharacterSheet) {
    for resource in sheet.resources.values() {
        recharge_resource(base, resource, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(total: i32) -> CalculatedValue {
        CalculatedValue::from_sources(vec![Source::base("Base", total)])
    }

    fn ki_pool(current_value: i32) -> CalculatedResource {
        CalculatedResource {
            unique_id: "ki_pool".into(),
            name: "Ki Pool".into(),
            description: None,
            max: value(4),
            min: value(0),
            current_value,
            default_charges_per_use: value(1),
            recharge_amount: value(2),
        }
    }

    fn stored(base: &CharacterBaseData) -> Option<i32> {
        base.resource_current_values.get("ki_pool").map(|s| s.current_value)
    }

    #[test]
    fn test_consume_respects_minimum() {
        let mut base = CharacterBaseData::new("Ember");
        assert_eq!(consume_resource(&mut base, &ki_pool(4), None), 3);
        assert_eq!(stored(&base), Some(3));
        assert_eq!(consume_resource(&mut base, &ki_pool(3), Some(6)), 0);
        assert_eq!(consume_resource(&mut base, &ki_pool(0), None), 0);
    }

    #[test]
    fn test_recharge_respects_maximum() {
        let mut base = CharacterBaseData::new("Ember");
        assert_eq!(recharge_resource(&mut base, &ki_pool(1), None), 3);
        assert_eq!(recharge_resource(&mut base, &ki_pool(3), Some(3)), 4);
        assert_eq!(stored(&base), Some(4));
    }

    #[test]
    fn test_custom_variables_mirror_properties() {
        let variables = ki_pool(2).custom_variables();
        let ids: Vec<&str> = variables.iter().map(|v| v.unique_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "resources.ki_pool.max",
                "resources.ki_pool.min",
                "resources.ki_pool.current",
                "resources.ki_pool.defaultChargesPerUse",
                "resources.ki_pool.rechargeAmount",
            ]
        );
        assert_eq!(variables[2].total_value, 2);
    }

    #[test]
    fn test_resource_variable_ids() {
        assert!(is_resource_variable("resources.ki_pool.max"));
        assert!(!is_resource_variable("sneakAttackDice"));
    }
}
