//! Substitution indices and entity variable generation.
//!
//! A substitution index is a flat map from dotted variable path to value.
//! Entities are flattened into one so formulas and filters can reference
//! `@entity.level`, `@entity.tags` and friends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default prefix for entity-derived variables.
pub const ENTITY_PREFIX: &str = "entity";

/// Nesting beyond this depth is not flattened.
pub const MAX_VARIABLE_DEPTH: usize = 10;

/// A variable value: number, string, or list of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Number(f64),
    Text(String),
    List(Vec<VariableValue>),
}

impl VariableValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            VariableValue::Number(n) => Some(*n),
            VariableValue::Text(s) => s.trim().parse().ok(),
            VariableValue::List(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            VariableValue::Number(n) => number_to_json(*n),
            VariableValue::Text(s) => Value::String(s.clone()),
            VariableValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Primitive JSON values only; objects and nulls have no variable form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(VariableValue::Number),
            Value::String(s) => Some(VariableValue::Text(s.clone())),
            Value::Bool(b) => Some(VariableValue::Number(if *b { 1.0 } else { 0.0 })),
            Value::Array(items) => items
                .iter()
                .map(VariableValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(VariableValue::List),
            Value::Null | Value::Object(_) => None,
        }
    }
}

impl From<f64> for VariableValue {
    fn from(value: f64) -> Self {
        VariableValue::Number(value)
    }
}

impl From<i32> for VariableValue {
    fn from(value: i32) -> Self {
        VariableValue::Number(f64::from(value))
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

/// Integral numbers serialize without a fractional part.
pub(crate) fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Read-only variable lookup. Implemented by indices and layered views.
pub trait VariableLookup {
    fn lookup(&self, key: &str) -> Option<&VariableValue>;
}

/// Flat map from variable path to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstitutionIndex(BTreeMap<String, VariableValue>);

impl SubstitutionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&VariableValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(VariableValue::as_number)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<VariableValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert only when the key is not present yet.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: VariableValue) {
        self.0.entry(key.into()).or_insert(value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove_prefix(&mut self, prefix: &str) {
        let dotted = format!("{prefix}.");
        self.0.retain(|k, _| !k.starts_with(&dotted));
    }

    /// Copy every entry of `other`, overwriting on collision.
    pub fn extend(&mut self, other: &SubstitutionIndex) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl VariableLookup for SubstitutionIndex {
    fn lookup(&self, key: &str) -> Option<&VariableValue> {
        self.0.get(key)
    }
}

impl<K: Into<String>, V: Into<VariableValue>> FromIterator<(K, V)> for SubstitutionIndex {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Several indices searched in order; the first hit wins.
pub struct Layered<'a> {
    layers: Vec<&'a dyn VariableLookup>,
}

impl<'a> Layered<'a> {
    pub fn new(first: &'a dyn VariableLookup) -> Self {
        Self { layers: vec![first] }
    }

    pub fn then(mut self, next: &'a dyn VariableLookup) -> Self {
        self.layers.push(next);
        self
    }
}

impl VariableLookup for Layered<'_> {
    fn lookup(&self, key: &str) -> Option<&VariableValue> {
        self.layers.iter().find_map(|layer| layer.lookup(key))
    }
}

/// Flatten a JSON object into variables under `prefix`.
///
/// Booleans become `1`/`0`. Arrays always emit `<path>.length` and are kept
/// as a list when every element is primitive. Nulls are skipped. Objects
/// nested deeper than [`MAX_VARIABLE_DEPTH`] are silently cut off.
pub fn generate_entity_variables(entity: &Value, prefix: &str) -> SubstitutionIndex {
    let mut index = SubstitutionIndex::new();
    if let Value::Object(map) = entity {
        for (key, value) in map {
            flatten_into(&mut index, &format!("{prefix}.{key}"), value, 1);
        }
    }
    index
}

fn flatten_into(index: &mut SubstitutionIndex, path: &str, value: &Value, depth: usize) {
    if depth > MAX_VARIABLE_DEPTH {
        return;
    }
    match value {
        Value::Null => {}
        Value::Bool(b) => index.set(path, if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                index.set(path, n);
            }
        }
        Value::String(s) => index.set(path, VariableValue::Text(s.clone())),
        Value::Array(items) => {
            index.set(format!("{path}.length"), items.len() as f64);
            if !items.is_empty() {
                let primitives: Option<Vec<_>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Array(_) => None,
                        other => VariableValue::from_json(other),
                    })
                    .collect();
                if let Some(list) = primitives {
                    index.set(path, VariableValue::List(list));
                }
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(index, &format!("{path}.{key}"), nested, depth + 1);
            }
        }
    }
}

/// Add entity variables to `existing` without overriding anything in it.
pub fn merge_entity_variables(
    entity: &Value,
    existing: &SubstitutionIndex,
    prefix: &str,
) -> SubstitutionIndex {
    let mut merged = existing.clone();
    for (key, value) in generate_entity_variables(entity, prefix).0 {
        merged.set_if_absent(key, value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_fields_and_arrays() {
        let vars = generate_entity_variables(&json!({"level": 3, "tags": ["fire", "evocation"]}), ENTITY_PREFIX);
        assert_eq!(vars.get("entity.level"), Some(&VariableValue::Number(3.0)));
        assert_eq!(
            vars.get("entity.tags"),
            Some(&VariableValue::List(vec!["fire".into(), "evocation".into()]))
        );
        assert_eq!(vars.get("entity.tags.length"), Some(&VariableValue::Number(2.0)));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_booleans_become_numbers() {
        let vars = generate_entity_variables(&json!({"isActive": true, "hidden": false}), ENTITY_PREFIX);
        assert_eq!(vars.number("entity.isActive"), Some(1.0));
        assert_eq!(vars.number("entity.hidden"), Some(0.0));
    }

    #[test]
    fn test_empty_array_and_nulls() {
        let vars = generate_entity_variables(&json!({"items": [], "gone": null, "empty": {}}), ENTITY_PREFIX);
        assert_eq!(vars.number("entity.items.length"), Some(0.0));
        assert!(!vars.contains("entity.items"));
        assert!(!vars.contains("entity.gone"));
        assert!(!vars.contains("entity.empty"));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_nested_objects_use_dots() {
        let vars = generate_entity_variables(&json!({"classData": {"classLevels": {"wizard": 3}}}), "spell");
        assert_eq!(vars.number("spell.classData.classLevels.wizard"), Some(3.0));
    }

    #[test]
    fn test_arrays_of_objects_only_emit_length() {
        let vars = generate_entity_variables(&json!({"changes": [{"a": 1}]}), ENTITY_PREFIX);
        assert_eq!(vars.number("entity.changes.length"), Some(1.0));
        assert!(!vars.contains("entity.changes"));
    }

    #[test]
    fn test_deep_nesting_truncated() {
        let mut value = json!({"leaf": 1});
        for _ in 0..12 {
            value = json!({ "n": value });
        }
        let vars = generate_entity_variables(&value, ENTITY_PREFIX);
        assert!(vars.is_empty());

        let mut shallow = json!({"leaf": 1});
        for _ in 0..8 {
            shallow = json!({ "n": shallow });
        }
        let vars = generate_entity_variables(&shallow, ENTITY_PREFIX);
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_merge_existing_wins() {
        let existing: SubstitutionIndex = [("entity.level", 9.0)].into_iter().collect();
        let merged = merge_entity_variables(&json!({"level": 3, "cost": 2}), &existing, ENTITY_PREFIX);
        assert_eq!(merged.number("entity.level"), Some(9.0));
        assert_eq!(merged.number("entity.cost"), Some(2.0));
    }

    #[test]
    fn test_layered_lookup_order() {
        let first: SubstitutionIndex = [("a", 1.0)].into_iter().collect();
        let second: SubstitutionIndex = [("a", 2.0), ("b", 3.0)].into_iter().collect();
        let layered = Layered::new(&first).then(&second);
        assert_eq!(layered.lookup("a").and_then(VariableValue::as_number), Some(1.0));
        assert_eq!(layered.lookup("b").and_then(VariableValue::as_number), Some(3.0));
        assert!(layered.lookup("c").is_none());
    }
}
