//! Conditions gating whether a change applies.

use crate::entity::ComputedEntity;
use crate::filter::FilterCondition;
use crate::formula::{CaseOperator, Evaluation, FormulaCache};
use crate::variables::VariableLookup;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CountRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Numeric comparison of two formulas.
    #[serde(rename_all = "camelCase")]
    Simple {
        first_formula: String,
        operator: CaseOperator,
        second_formula: String,
    },
    /// The character has entities matching the given criteria.
    #[serde(rename_all = "camelCase")]
    HasEntity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_type: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<FilterCondition>,
        /// Without a count at least one match is required.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<CountRange>,
    },
}

impl Condition {
    pub fn simple(first: impl Into<String>, operator: CaseOperator, second: impl Into<String>) -> Self {
        Condition::Simple {
            first_formula: first.into(),
            operator,
            second_formula: second.into(),
        }
    }

    pub fn has_entity(entity_id: impl Into<String>) -> Self {
        Condition::HasEntity {
            entity_id: Some(entity_id.into()),
            entity_type: None,
            filter: Vec::new(),
            count: None,
        }
    }
}

/// What conditions are checked against.
pub struct ConditionContext<'a> {
    pub variables: &'a dyn VariableLookup,
    pub entities: &'a [ComputedEntity],
    pub formulas: &'a FormulaCache,
}

impl ConditionContext<'_> {
    fn check(&self, condition: &Condition, warnings: &mut Vec<crate::formula::FormulaWarning>) -> bool {
        match condition {
            Condition::Simple {
                first_formula,
                operator,
                second_formula,
            } => {
                let left = self.formulas.evaluate_str(first_formula, self.variables);
                let right = self.formulas.evaluate_str(second_formula, self.variables);
                warnings.extend(left.warnings);
                warnings.extend(right.warnings);
                operator.compare(left.value, right.value)
            }
            Condition::HasEntity {
                entity_id,
                entity_type,
                filter,
                count,
            } => {
                let found = self
                    .entities
                    .iter()
                    .filter(|computed| computed.is_active())
                    .filter(|computed| entity_id.as_ref().map_or(true, |id| computed.id() == id.as_str()))
                    .filter(|computed| {
                        entity_type
                            .as_ref()
                            .map_or(true, |t| computed.entity.entity_type == *t)
                    })
                    .filter(|computed| {
                        filter
                            .iter()
                            .all(|condition| condition.evaluate(&computed.entity, self.variables))
                    })
                    .count();
                match count {
                    Some(range) => {
                        range.min.map_or(true, |min| found >= min) && range.max.map_or(true, |max| found <= max)
                    }
                    None => found > 0,
                }
            }
        }
    }

    /// True when every condition holds. An empty list always holds.
    pub fn evaluate(&self, conditions: &[Condition]) -> Evaluation<bool> {
        let mut warnings = Vec::new();
        let value = conditions.iter().all(|c| self.check(c, &mut warnings));
        Evaluation { value, warnings }
    }
}
