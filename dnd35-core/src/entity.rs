//! Compendium entities, their schemas, and computed wrappers.

use crate::cge::{EntityProvider, SuppressionConfig};
use crate::changes::{AttackContextualChange, Change};
use crate::variables::{generate_entity_variables, SubstitutionIndex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An immutable compendium item: spell, feat, item, class, buff, ...
///
/// Well-known fields are typed. Everything else the entity's schema
/// declares lives in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardEntity {
    pub id: String,
    pub entity_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    #[serde(default, alias = "legacy_contextualChanges", skip_serializing_if = "Vec::is_empty")]
    pub contextual_changes: Vec<AttackContextualChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<EntityProvider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppression: Vec<SuppressionConfig>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StandardEntity {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            image: None,
            changes: Vec::new(),
            contextual_changes: Vec::new(),
            providers: Vec::new(),
            suppression: Vec::new(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_provider(mut self, provider: EntityProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_suppression(mut self, suppression: SuppressionConfig) -> Self {
        self.suppression.push(suppression);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Dot-path lookup over the whole entity, typed fields included.
    pub fn value_at(&self, path: &str) -> Option<Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let root = match head {
            "id" => Value::String(self.id.clone()),
            "entityType" => Value::String(self.entity_type.clone()),
            "name" => Value::String(self.name.clone()),
            "description" => Value::String(self.description.clone()?),
            "tags" => Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            "image" => Value::String(self.image.clone()?),
            _ => {
                let value = self.fields.get(head)?;
                return match rest {
                    Some(rest) => get_nested_value(value, rest).cloned(),
                    None => Some(value.clone()),
                };
            }
        };
        match rest {
            Some(rest) => get_nested_value(&root, rest).cloned(),
            None => Some(root),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Flattened variables for this entity, e.g. `entity.level`.
    pub fn variables(&self, prefix: &str) -> SubstitutionIndex {
        generate_entity_variables(&self.to_value(), prefix)
    }

    /// Interpret the schema-driven fields as a typed view.
    pub fn typed<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).ok()
    }
}

/// Dot-path traversal. Missing segments and non-object parents yield `None`.
pub fn get_nested_value<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

// ============================================================================
// Schemas
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    StringArray,
    IntegerArray,
    Reference,
    Object,
    ObjectArray,
    Enum,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityFieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub non_empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<EnumOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_fields: Vec<EntityFieldDefinition>,
    #[serde(default)]
    pub is_formula: bool,
}

impl EntityFieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
            non_empty: false,
            description: None,
            reference_type: None,
            allowed_values: Vec::new(),
            options: Vec::new(),
            object_fields: Vec::new(),
            is_formula: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = values;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaAddon {
    Searchable,
    Taggable,
    Imageable,
    Effectful,
    Suppressing,
    Providable,
    #[serde(other)]
    Other,
}

/// Field list and addons for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchemaDefinition {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EntityFieldDefinition>,
    #[serde(default)]
    pub addons: Vec<SchemaAddon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaViolation {
    pub entity_id: String,
    pub field: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.entity_id, self.field, self.message)
    }
}

impl EntitySchemaDefinition {
    pub fn has_addon(&self, addon: SchemaAddon) -> bool {
        self.addons.contains(&addon)
    }

    /// Check an entity's fields against this schema.
    pub fn validate(&self, entity: &StandardEntity) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        if entity.entity_type != self.type_name {
            violations.push(SchemaViolation {
                entity_id: entity.id.clone(),
                field: "entityType".to_string(),
                message: format!("expected '{}', found '{}'", self.type_name, entity.entity_type),
            });
        }
        validate_fields(&entity.id, "", &self.fields, &entity.fields, &mut violations);
        violations
    }
}

fn validate_fields(
    entity_id: &str,
    prefix: &str,
    definitions: &[EntityFieldDefinition],
    values: &Map<String, Value>,
    violations: &mut Vec<SchemaViolation>,
) {
    for definition in definitions {
        let path = format!("{prefix}{}", definition.name);
        let mut report = |message: String| {
            violations.push(SchemaViolation {
                entity_id: entity_id.to_string(),
                field: path.clone(),
                message,
            })
        };
        let value = match values.get(&definition.name) {
            None | Some(Value::Null) => {
                if !definition.optional {
                    report("required field is missing".to_string());
                }
                continue;
            }
            Some(value) => value,
        };

        let type_ok = match definition.field_type {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::StringArray | FieldType::Reference => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldType::IntegerArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_i64() || v.is_u64())),
            FieldType::Object => value.is_object(),
            FieldType::ObjectArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
            FieldType::Enum => definition.options.iter().any(|o| &o.value == value),
            FieldType::Other => true,
        };
        if !type_ok {
            report(format!("value {value} does not match type {:?}", definition.field_type));
            continue;
        }

        if !definition.allowed_values.is_empty() {
            let allowed = |v: &Value| definition.allowed_values.contains(v);
            let ok = match value {
                Value::Array(items) => items.iter().all(allowed),
                other => allowed(other),
            };
            if !ok {
                report(format!("value {value} is not an allowed value"));
            }
        }

        if definition.non_empty && value.as_array().is_some_and(|items| items.is_empty()) {
            report("must not be empty".to_string());
        }

        match (definition.field_type, value) {
            (FieldType::Object, Value::Object(map)) => {
                validate_fields(entity_id, &format!("{path}."), &definition.object_fields, map, violations);
            }
            (FieldType::ObjectArray, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if let Value::Object(map) = item {
                        validate_fields(
                            entity_id,
                            &format!("{path}[{i}]."),
                            &definition.object_fields,
                            map,
                            violations,
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Computed entities
// ============================================================================

/// What brought a computed entity onto the character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginType {
    Race,
    ClassLevel,
    CharacterLevel,
    Item,
    Buff,
    Custom,
    /// Granted or selected through another entity's provider.
    Entity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySource {
    pub origin_type: OriginType,
    pub origin_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    pub source: EntitySource,
    /// Deterministic path identifying this occurrence of the entity.
    pub instance_id: String,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_by: Option<String>,
}

/// A standard entity as it ended up on a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedEntity {
    #[serde(flatten)]
    pub entity: StandardEntity,
    #[serde(rename = "_meta")]
    pub meta: EntityMeta,
}

impl ComputedEntity {
    pub fn new(entity: StandardEntity, source: EntitySource, instance_id: impl Into<String>) -> Self {
        Self {
            entity,
            meta: EntityMeta {
                source,
                instance_id: instance_id.into(),
                suppressed: false,
                suppressed_reason: None,
                suppressed_by: None,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.entity.id
    }

    pub fn is_active(&self) -> bool {
        !self.meta.suppressed
    }
}
