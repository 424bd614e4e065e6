//! Declarative filter configurations for entity browsers.

use super::condition::values_equal;
use crate::entity::{EntitySchemaDefinition, FieldType, StandardEntity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Current filter selections, keyed by filter id.
pub type FilterState = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: Value,
    pub label: String,
}

impl FilterOption {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetFilterDef {
    pub id: String,
    pub label: String,
    pub facet_field: String,
    #[serde(default)]
    pub multi_select: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationPrimary {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub options: Vec<FilterOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSecondary {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_format: Option<String>,
}

/// Two dependent selectors over a map field, e.g. class then spell level
/// from `classData.classLevels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationFilterDef {
    pub id: String,
    pub label: String,
    pub relation_map_path: String,
    pub primary: RelationPrimary,
    pub secondary: RelationSecondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeFilterDef {
    pub id: String,
    pub label: String,
    pub entity_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroupDef {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub children: Vec<FilterDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterDef {
    Facet(FacetFilterDef),
    Relation(RelationFilterDef),
    EntityType(EntityTypeFilterDef),
    Group(FilterGroupDef),
}

impl FilterDef {
    pub fn id(&self) -> &str {
        match self {
            FilterDef::Facet(f) => &f.id,
            FilterDef::Relation(f) => &f.id,
            FilterDef::EntityType(f) => &f.id,
            FilterDef::Group(f) => &f.id,
        }
    }

    pub fn matches(&self, entity: &StandardEntity, state: &FilterState) -> bool {
        match self {
            FilterDef::Facet(facet) => matches_facet(entity, &facet.facet_field, state.get(&facet.id)),
            FilterDef::Relation(relation) => matches_relation(
                entity,
                relation,
                state.get(&relation.primary.id),
                state.get(&relation.secondary.id),
            ),
            FilterDef::EntityType(def) => match state.get(&def.id).map(unset_as_none) {
                Some(Some(Value::Array(types))) => {
                    types.iter().any(|t| t.as_str() == Some(entity.entity_type.as_str()))
                }
                Some(Some(Value::String(single))) => *single == entity.entity_type,
                _ => true,
            },
            FilterDef::Group(group) => group.children.iter().all(|child| child.matches(entity, state)),
        }
    }
}

/// `None` for the values that mean "no selection".
fn unset_as_none(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        other => Some(other),
    }
}

/// Facet match: scalar equality, array membership, or any-of for
/// multi-select values.
pub fn matches_facet(entity: &StandardEntity, facet_field: &str, value: Option<&Value>) -> bool {
    let Some(selected) = value.and_then(unset_as_none) else {
        return true;
    };
    let field = entity.value_at(facet_field);
    let field_has = |candidate: &Value| match &field {
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, candidate)),
        Some(actual) => values_equal(actual, candidate),
        None => false,
    };
    match selected {
        Value::Array(options) => options.iter().any(field_has),
        single => field_has(single),
    }
}

pub fn matches_relation(
    entity: &StandardEntity,
    relation: &RelationFilterDef,
    primary: Option<&Value>,
    secondary: Option<&Value>,
) -> bool {
    let Some(primary) = primary.and_then(unset_as_none) else {
        return true;
    };
    let Some(key) = value_key(primary) else {
        return true;
    };
    let Some(Value::Object(map)) = entity.value_at(&relation.relation_map_path) else {
        return false;
    };
    let Some(entity_value) = map.get(&key) else {
        return false;
    };
    match secondary.and_then(unset_as_none) {
        None => true,
        Some(expected) => values_equal(entity_value, expected) || value_key(expected) == value_key(entity_value),
    }
}

fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// All filters for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFilterConfig {
    pub entity_type: String,
    pub label: String,
    pub filters: Vec<FilterDef>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,
}

/// Keep entities passing every filter in `config`; order is preserved.
pub fn apply_filter_config<'a>(
    entities: &'a [StandardEntity],
    config: &EntityFilterConfig,
    state: &FilterState,
) -> Vec<&'a StandardEntity> {
    entities
        .iter()
        .filter(|entity| config.filters.iter().all(|filter| filter.matches(entity, state)))
        .collect()
}

/// Ids a filter state may hold, with relation filters contributing both
/// their primary and secondary ids.
pub fn all_filter_ids(config: &EntityFilterConfig) -> Vec<String> {
    fn collect(filter: &FilterDef, ids: &mut Vec<String>) {
        match filter {
            FilterDef::Group(group) => group.children.iter().for_each(|child| collect(child, ids)),
            FilterDef::Relation(relation) => {
                ids.push(relation.primary.id.clone());
                ids.push(relation.secondary.id.clone());
            }
            other => ids.push(other.id().to_string()),
        }
    }
    let mut ids = Vec::new();
    for filter in &config.filters {
        collect(filter, &mut ids);
    }
    ids
}

/// Every filter id mapped to its declared default, or null.
pub fn initial_filter_state(config: &EntityFilterConfig) -> FilterState {
    let mut declared: BTreeMap<&str, &Value> = BTreeMap::new();
    let mut stack: Vec<&FilterDef> = config.filters.iter().collect();
    while let Some(filter) = stack.pop() {
        match filter {
            FilterDef::Facet(FacetFilterDef {
                id,
                default_value: Some(value),
                ..
            })
            | FilterDef::EntityType(EntityTypeFilterDef {
                id,
                default_value: Some(value),
                ..
            }) => {
                declared.insert(id.as_str(), value);
            }
            FilterDef::Group(group) => stack.extend(group.children.iter()),
            _ => {}
        }
    }
    all_filter_ids(config)
        .into_iter()
        .map(|id| {
            let value = config
                .defaults
                .get(&id)
                .or_else(|| declared.get(id.as_str()).copied())
                .filter(|v| !v.is_object())
                .cloned()
                .unwrap_or(Value::Null);
            (id, value)
        })
        .collect()
}

/// Secondary options available for a primary selection, sorted.
pub fn relation_secondary_options(
    relation: &RelationFilterDef,
    entities: &[StandardEntity],
    primary: &str,
) -> Vec<FilterOption> {
    if primary.is_empty() {
        return Vec::new();
    }
    let mut values: Vec<Value> = Vec::new();
    for entity in entities {
        if let Some(Value::Object(map)) = entity.value_at(&relation.relation_map_path) {
            if let Some(value) = map.get(primary).filter(|v| !v.is_null()) {
                if !values.iter().any(|seen| values_equal(seen, value)) {
                    values.push(value.clone());
                }
            }
        }
    }
    values.sort_by(|a, b| match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => display_value(a).cmp(&display_value(b)),
    });
    let format = relation.secondary.label_format.as_deref().unwrap_or("{value}");
    values
        .into_iter()
        .map(|value| {
            let label = format.replace("{value}", &display_value(&value));
            FilterOption { value, label }
        })
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Facets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetType {
    Text,
    Select,
    Multiselect,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFacet {
    pub field_name: String,
    pub display_name: String,
    pub facet_type: FacetType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

impl EntityFacet {
    fn new(field_name: &str, display_name: &str, facet_type: FacetType, options: Vec<Value>) -> Self {
        Self {
            field_name: field_name.to_string(),
            display_name: display_name.to_string(),
            facet_type,
            options,
        }
    }
}

fn distinct(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Facets for browsing entities of one schema.
///
/// Name, type and tags are always offered. Schema fields become facets by
/// type; options come from `allowedValues` or from the entities themselves.
pub fn generate_facets(schema: &EntitySchemaDefinition, entities: &[StandardEntity]) -> Vec<EntityFacet> {
    let mut facets = vec![
        EntityFacet::new("name", "Name", FacetType::Text, Vec::new()),
        EntityFacet::new(
            "entityType",
            "Type",
            FacetType::Select,
            distinct(entities.iter().map(|e| Value::String(e.entity_type.clone()))),
        ),
        EntityFacet::new(
            "tags",
            "Tags",
            FacetType::Multiselect,
            distinct(entities.iter().flat_map(|e| e.tags.iter().cloned().map(Value::String))),
        ),
    ];

    for field in &schema.fields {
        let display = field.description.as_deref().unwrap_or(&field.name);
        let from_entities = || {
            distinct(
                entities
                    .iter()
                    .filter_map(|e| e.field(&field.name))
                    .filter_map(Value::as_array)
                    .flatten()
                    .cloned(),
            )
        };
        let facet = match field.field_type {
            FieldType::String | FieldType::Integer if !field.allowed_values.is_empty() => {
                EntityFacet::new(&field.name, display, FacetType::Select, field.allowed_values.clone())
            }
            FieldType::String => EntityFacet::new(&field.name, display, FacetType::Text, Vec::new()),
            FieldType::Integer | FieldType::Number => {
                EntityFacet::new(&field.name, display, FacetType::Number, Vec::new())
            }
            FieldType::Boolean => EntityFacet::new(&field.name, display, FacetType::Boolean, Vec::new()),
            FieldType::StringArray | FieldType::IntegerArray | FieldType::Reference => {
                let mut options = if field.allowed_values.is_empty() {
                    from_entities()
                } else {
                    field.allowed_values.clone()
                };
                if field.field_type != FieldType::StringArray {
                    options.sort_by(|a, b| match (a.as_f64(), b.as_f64()) {
                        (Some(x), Some(y)) => x.total_cmp(&y),
                        _ => display_value(a).cmp(&display_value(b)),
                    });
                }
                EntityFacet::new(&field.name, display, FacetType::Multiselect, options)
            }
            FieldType::Enum if !field.options.is_empty() => EntityFacet::new(
                &field.name,
                display,
                FacetType::Select,
                field.options.iter().map(|o| o.value.clone()).collect(),
            ),
            _ => continue,
        };
        facets.push(facet);
    }
    facets
}
