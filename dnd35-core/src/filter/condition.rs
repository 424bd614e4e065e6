//! Property conditions over entities, with `@variable` values.
//!
//! OR over an empty condition list matches nothing; AND and NOT over an
//! empty list match everything.

use crate::conditions::{Condition, ConditionContext};
use crate::entity::StandardEntity;
use crate::formula::FormulaCache;
use crate::variables::VariableLookup;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "in")]
    In,
    /// The field holds a condition list that must hold for the current variables.
    #[serde(rename = "meets_conditions")]
    MeetsConditions,
    #[serde(other)]
    Unsupported,
}

/// `field operator value`, e.g. `requiredBab <= @bab.total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluate against one entity. Unresolvable `@` references fail.
    pub fn evaluate(&self, entity: &StandardEntity, variables: &dyn VariableLookup) -> bool {
        let actual = entity.value_at(&self.field);
        if self.operator == FilterOperator::MeetsConditions {
            return meets_conditions(actual.as_ref(), variables);
        }
        let expected = match resolve_value(&self.value, variables) {
            Some(value) => value,
            None => return false,
        };
        compare(actual.as_ref(), self.operator, &expected)
    }
}

fn resolve_value(value: &Value, variables: &dyn VariableLookup) -> Option<Value> {
    match value {
        Value::String(text) => match text.strip_prefix('@') {
            Some(name) => variables.lookup(name).map(|v| v.to_json()),
            None => Some(value.clone()),
        },
        other => Some(other.clone()),
    }
}

/// A missing field has no requirements. A malformed list never holds.
fn meets_conditions(field: Option<&Value>, variables: &dyn VariableLookup) -> bool {
    let conditions: Vec<Condition> = match field {
        None | Some(Value::Null) => return true,
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(conditions) => conditions,
            Err(error) => {
                tracing::debug!(%error, "unreadable condition list in filter field");
                return false;
            }
        },
    };
    let formulas = FormulaCache::new();
    ConditionContext {
        variables,
        entities: &[],
        formulas: &formulas,
    }
    .evaluate(&conditions)
    .value
}

/// Loose equality: numbers compare numerically regardless of int/float.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

pub(crate) fn compare(actual: Option<&Value>, operator: FilterOperator, expected: &Value) -> bool {
    let numeric = || match (actual.and_then(Value::as_f64), expected.as_f64()) {
        (Some(l), Some(r)) => Some((l, r)),
        _ => None,
    };
    match operator {
        FilterOperator::Eq => actual.is_some_and(|a| values_equal(a, expected)),
        FilterOperator::Ne => !actual.is_some_and(|a| values_equal(a, expected)),
        FilterOperator::Gt => numeric().is_some_and(|(l, r)| l > r),
        FilterOperator::Lt => numeric().is_some_and(|(l, r)| l < r),
        FilterOperator::Ge => numeric().is_some_and(|(l, r)| l >= r),
        FilterOperator::Le => numeric().is_some_and(|(l, r)| l <= r),
        FilterOperator::Contains => match (actual, expected) {
            (Some(Value::Array(items)), expected) => items.iter().any(|item| values_equal(item, expected)),
            (Some(Value::String(haystack)), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        FilterOperator::In => match (actual, expected) {
            (Some(actual), Value::Array(options)) => options.iter().any(|option| values_equal(option, actual)),
            _ => false,
        },
        FilterOperator::MeetsConditions | FilterOperator::Unsupported => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
    Not,
}

/// Strict hides non-matching entities; permissive keeps them flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    #[default]
    Strict,
    Permissive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntityFilter {
    #[serde(rename = "type", default)]
    pub logic: FilterLogic,
    #[serde(default)]
    pub filter_policy: FilterPolicy,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
}

impl EntityFilter {
    pub fn all(conditions: Vec<FilterCondition>) -> Self {
        Self {
            logic: FilterLogic::And,
            filter_policy: FilterPolicy::Strict,
            conditions,
        }
    }

    pub fn permissive(mut self) -> Self {
        self.filter_policy = FilterPolicy::Permissive;
        self
    }

    pub fn matches(&self, entity: &StandardEntity, variables: &dyn VariableLookup) -> bool {
        let mut results = self.conditions.iter().map(|c| c.evaluate(entity, variables));
        match self.logic {
            FilterLogic::And => results.all(|passed| passed),
            FilterLogic::Or => results.any(|passed| passed),
            FilterLogic::Not => results.all(|passed| !passed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult<'a> {
    pub entity: &'a StandardEntity,
    pub matches: bool,
}

/// Run a filter over entities, keeping or flagging per its policy.
pub fn filter_entities_with_variables<'a, I>(
    entities: I,
    filter: &EntityFilter,
    variables: &dyn VariableLookup,
) -> Vec<FilterResult<'a>>
where
    I: IntoIterator<Item = &'a StandardEntity>,
{
    entities
        .into_iter()
        .map(|entity| FilterResult {
            entity,
            matches: filter.matches(entity, variables),
        })
        .filter(|result| result.matches || filter.filter_policy == FilterPolicy::Permissive)
        .collect()
}

/// Strict matches only, ignoring the filter's own policy.
pub fn matching_entities<'a, I>(entities: I, filter: &EntityFilter, variables: &dyn VariableLookup) -> Vec<&'a StandardEntity>
where
    I: IntoIterator<Item = &'a StandardEntity>,
{
    entities
        .into_iter()
        .filter(|entity| filter.matches(entity, variables))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::SubstitutionIndex;
    use serde_json::json;

    fn no_variables() -> SubstitutionIndex {
        SubstitutionIndex::new()
    }

    fn feats() -> Vec<StandardEntity> {
        vec![
            StandardEntity::new("power-attack", "feat", "Power Attack")
                .with_tags(&["combat"])
                .with_field("requiredBab", json!(1)),
            StandardEntity::new("cleave", "feat", "Cleave")
                .with_tags(&["combat"])
                .with_field("requiredBab", json!(1))
                .with_field("prerequisites", json!(["power-attack"])),
            StandardEntity::new("great-cleave", "feat", "Great Cleave")
                .with_tags(&["combat"])
                .with_field("requiredBab", json!(4)),
            StandardEntity::new("skill-focus", "feat", "Skill Focus").with_tags(&["general"]),
        ]
    }

    fn bab(value: f64) -> SubstitutionIndex {
        [("bab.total", value)].into_iter().collect()
    }

    #[test]
    fn test_variable_reference_in_value() {
        let filter = EntityFilter::all(vec![FilterCondition::new("requiredBab", FilterOperator::Le, json!("@bab.total"))]);
        let entities = feats();
        let ids: Vec<_> = matching_entities(&entities, &filter, &bab(2.0)).into_iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["power-attack", "cleave"]);
    }

    #[test]
    fn test_missing_variable_fails_condition() {
        let filter = EntityFilter::all(vec![FilterCondition::new("requiredBab", FilterOperator::Le, json!("@bab.total"))]);
        let entities = feats();
        assert!(matching_entities(&entities, &filter, &no_variables()).is_empty());
    }

    #[test]
    fn test_permissive_flags_instead_of_dropping() {
        let filter = EntityFilter::all(vec![FilterCondition::new("requiredBab", FilterOperator::Le, json!("@bab.total"))])
            .permissive();
        let entities = feats();
        let results = filter_entities_with_variables(&entities, &filter, &bab(2.0));
        assert_eq!(results.len(), 4);
        assert!(results[0].matches);
        assert!(!results[2].matches);
        assert!(!results[3].matches);
    }

    #[test]
    fn test_contains_and_in() {
        let entities = feats();
        let contains = FilterCondition::new("tags", FilterOperator::Contains, json!("general"));
        assert!(contains.evaluate(&entities[3], &no_variables()));
        assert!(!contains.evaluate(&entities[0], &no_variables()));

        let name_contains = FilterCondition::new("name", FilterOperator::Contains, json!("Cleave"));
        assert!(name_contains.evaluate(&entities[2], &no_variables()));

        let within = FilterCondition::new("id", FilterOperator::In, json!(["cleave", "skill-focus"]));
        assert!(within.evaluate(&entities[1], &no_variables()));
        let not_array = FilterCondition::new("id", FilterOperator::In, json!("cleave"));
        assert!(!not_array.evaluate(&entities[1], &no_variables()));
    }

    #[test]
    fn test_logic_variants() {
        let entities = feats();
        let combat = FilterCondition::new("tags", FilterOperator::Contains, json!("combat"));
        let high = FilterCondition::new("requiredBab", FilterOperator::Ge, json!(4));
        let or = EntityFilter {
            logic: FilterLogic::Or,
            filter_policy: FilterPolicy::Strict,
            conditions: vec![high.clone(), FilterCondition::new("id", FilterOperator::Eq, json!("skill-focus"))],
        };
        assert_eq!(matching_entities(&entities, &or, &no_variables()).len(), 2);

        let not = EntityFilter {
            logic: FilterLogic::Not,
            filter_policy: FilterPolicy::Strict,
            conditions: vec![combat],
        };
        let ids: Vec<_> = matching_entities(&entities, &not, &no_variables()).into_iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["skill-focus"]);
    }

    #[test]
    fn test_numeric_comparison_requires_numbers() {
        let entities = feats();
        let condition = FilterCondition::new("name", FilterOperator::Gt, json!(1));
        assert!(!condition.evaluate(&entities[0], &no_variables()));
        let int_float = FilterCondition::new("requiredBab", FilterOperator::Eq, json!(1.0));
        assert!(int_float.evaluate(&entities[0], &no_variables()));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let entities = feats();
        assert_eq!(matching_entities(&entities, &EntityFilter::default(), &no_variables()).len(), 4);
    }

    #[test]
    fn test_empty_or_matches_nothing() {
        let entities = feats();
        let or = EntityFilter {
            logic: FilterLogic::Or,
            filter_policy: FilterPolicy::Strict,
            conditions: Vec::new(),
        };
        assert!(matching_entities(&entities, &or, &no_variables()).is_empty());
        let not = EntityFilter {
            logic: FilterLogic::Not,
            ..or
        };
        assert_eq!(matching_entities(&entities, &not, &no_variables()).len(), 4);
    }

    #[test]
    fn test_meets_conditions_operator() {
        let entities = vec![
            StandardEntity::new("power-attack", "feat", "Power Attack").with_field(
                "conditions",
                json!([{ "type": "simple", "firstFormula": "@bab.total", "operator": ">=", "secondFormula": "1" }]),
            ),
            StandardEntity::new("great-cleave", "feat", "Great Cleave").with_field(
                "conditions",
                json!([{ "type": "simple", "firstFormula": "@bab.total", "operator": ">=", "secondFormula": "4" }]),
            ),
            StandardEntity::new("dodge", "feat", "Dodge"),
            StandardEntity::new("broken", "feat", "Broken").with_field("conditions", json!("bab over 9000")),
        ];
        let filter: EntityFilter = serde_json::from_value(json!({
            "type": "AND",
            "conditions": [{ "field": "conditions", "operator": "meets_conditions", "value": null }]
        }))
        .unwrap();
        let ids: Vec<_> = matching_entities(&entities, &filter, &bab(2.0)).into_iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["power-attack", "dodge"]);
        let ids: Vec<_> = matching_entities(&entities, &filter, &bab(5.0)).into_iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["power-attack", "great-cleave", "dodge"]);
    }

    #[test]
    fn test_wire_format() {
        let filter: EntityFilter = serde_json::from_value(json!({
            "type": "OR",
            "filterPolicy": "permissive",
            "conditions": [{ "field": "level", "operator": "<=", "value": "@level" }]
        }))
        .unwrap();
        assert_eq!(filter.logic, FilterLogic::Or);
        assert_eq!(filter.filter_policy, FilterPolicy::Permissive);
        assert_eq!(filter.conditions[0].operator, FilterOperator::Le);
    }
}
