//! Rules content: entities plus schemas, and the port that serves them.

use crate::entity::{EntitySchemaDefinition, SchemaViolation, StandardEntity};
use crate::filter::matches_facet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompendiumError {
    #[error("Invalid compendium JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Duplicate entity id '{0}'")]
    DuplicateId(String),
    #[error("{} schema violation(s), first: {}", .0.len(), .0.first().map(|v| v.to_string()).unwrap_or_default())]
    SchemaViolations(Vec<SchemaViolation>),
    #[error("Compendium not found: {0}")]
    NotFound(String),
}

/// Entities as they appear in files: grouped by type or as one list.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityListing {
    ByType(BTreeMap<String, Vec<StandardEntity>>),
    Flat(Vec<StandardEntity>),
}

impl EntityListing {
    fn into_vec(self) -> Vec<StandardEntity> {
        match self {
            EntityListing::Flat(entities) => entities,
            EntityListing::ByType(groups) => groups.into_values().flatten().collect(),
        }
    }
}

/// Accept either listing shape for a `Vec<StandardEntity>` field.
pub(crate) fn deserialize_entity_listing<'de, D>(deserializer: D) -> Result<Vec<StandardEntity>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(EntityListing::deserialize(deserializer)?.into_vec())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompendium {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    entities: Option<EntityListing>,
    #[serde(default)]
    schemas: Vec<EntitySchemaDefinition>,
}

/// Immutable rules content with id and type indices.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Compendium {
    pub id: String,
    pub name: String,
    entities: Vec<StandardEntity>,
    schemas: Vec<EntitySchemaDefinition>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
    #[serde(skip)]
    violations: Vec<SchemaViolation>,
}

impl Compendium {
    /// Build and index a compendium. On duplicate ids the first entity wins.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entities: Vec<StandardEntity>,
        schemas: Vec<EntitySchemaDefinition>,
    ) -> Self {
        let mut compendium = Self {
            id: id.into(),
            name: name.into(),
            entities: Vec::new(),
            schemas,
            by_id: HashMap::new(),
            violations: Vec::new(),
        };
        for entity in entities {
            if compendium.by_id.contains_key(&entity.id) {
                tracing::warn!(id = %entity.id, "duplicate entity id ignored");
                continue;
            }
            compendium.by_id.insert(entity.id.clone(), compendium.entities.len());
            compendium.entities.push(entity);
        }
        compendium.violations = compendium.validate();
        compendium
    }

    /// Parse a compendium file. Schema violations are recorded, not fatal.
    pub fn from_json(json: &str) -> Result<Self, CompendiumError> {
        let raw: RawCompendium = serde_json::from_str(json)?;
        let entities = raw.entities.map(EntityListing::into_vec).unwrap_or_default();
        let mut seen = std::collections::HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.id.as_str()) {
                return Err(CompendiumError::DuplicateId(entity.id.clone()));
            }
        }
        let compendium = Self::new(raw.id, raw.name, entities, raw.schemas);
        if !compendium.violations.is_empty() {
            tracing::warn!(
                compendium = %compendium.id,
                count = compendium.violations.len(),
                "compendium has schema violations"
            );
        }
        Ok(compendium)
    }

    /// Like [`Compendium::from_json`] but any schema violation is an error.
    pub fn from_json_strict(json: &str) -> Result<Self, CompendiumError> {
        let compendium = Self::from_json(json)?;
        if compendium.violations.is_empty() {
            Ok(compendium)
        } else {
            Err(CompendiumError::SchemaViolations(compendium.violations))
        }
    }

    pub fn get(&self, id: &str) -> Option<&StandardEntity> {
        self.by_id.get(id).and_then(|index| self.entities.get(*index))
    }

    pub fn entities(&self) -> &[StandardEntity] {
        &self.entities
    }

    pub fn entities_of_type<'a>(&'a self, entity_type: &str) -> impl Iterator<Item = &'a StandardEntity> + 'a {
        let entity_type = entity_type.to_string();
        self.entities.iter().filter(move |e| e.entity_type == entity_type)
    }

    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for entity in &self.entities {
            if !types.contains(&entity.entity_type.as_str()) {
                types.push(&entity.entity_type);
            }
        }
        types
    }

    pub fn schemas(&self) -> &[EntitySchemaDefinition] {
        &self.schemas
    }

    pub fn schema(&self, entity_type: &str) -> Option<&EntitySchemaDefinition> {
        self.schemas.iter().find(|s| s.type_name == entity_type)
    }

    /// Violations found when the compendium was built.
    pub fn violations(&self) -> &[SchemaViolation] {
        &self.violations
    }

    fn validate(&self) -> Vec<SchemaViolation> {
        self.entities
            .iter()
            .filter_map(|entity| self.schema(&entity.entity_type).map(|schema| schema.validate(entity)))
            .flatten()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<'de> Deserialize<'de> for Compendium {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawCompendium::deserialize(deserializer)?;
        let entities = raw.entities.map(EntityListing::into_vec).unwrap_or_default();
        Ok(Compendium::new(raw.id, raw.name, entities, raw.schemas))
    }
}

// ============================================================================
// Data port
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompendiumReference {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeInfo {
    pub type_name: String,
    pub display_name: String,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Field name to selected value(s), matched like facet filters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPage {
    pub entities: Vec<StandardEntity>,
    pub total: usize,
    pub has_more: bool,
}

/// Where compendiums come from. The calculator itself only ever sees a
/// loaded [`Compendium`].
pub trait CompendiumDataPort {
    fn available_compendiums(&self) -> Vec<CompendiumReference>;
    fn load_compendium(&self, id: &str) -> Result<&Compendium, CompendiumError>;
    fn entity_types(&self, compendium_id: &str) -> Vec<EntityTypeInfo>;
    fn entities(&self, compendium_id: &str, entity_type: &str, query: &EntityQuery) -> EntityPage;
    fn entity_by_id(&self, compendium_id: &str, entity_type: &str, entity_id: &str) -> Option<&StandardEntity>;
    fn entity_schema(&self, compendium_id: &str, entity_type: &str) -> Option<&EntitySchemaDefinition>;
}

/// Port over compendiums already held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCompendiumPort {
    compendiums: Vec<Compendium>,
}

impl InMemoryCompendiumPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compendium(mut self, compendium: Compendium) -> Self {
        self.insert(compendium);
        self
    }

    /// Add or replace a compendium with the same id.
    pub fn insert(&mut self, compendium: Compendium) {
        self.compendiums.retain(|c| c.id != compendium.id);
        self.compendiums.push(compendium);
    }

    fn find(&self, id: &str) -> Option<&Compendium> {
        self.compendiums.iter().find(|c| c.id == id)
    }
}

fn matches_search(entity: &StandardEntity, search: &str) -> bool {
    let needle = search.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    entity.name.to_lowercase().contains(&needle)
        || entity
            .description
            .as_ref()
            .is_some_and(|d| d.to_lowercase().contains(&needle))
        || entity.tags.iter().any(|t| t.to_lowercase().contains(&needle))
}

impl CompendiumDataPort for InMemoryCompendiumPort {
    fn available_compendiums(&self) -> Vec<CompendiumReference> {
        self.compendiums
            .iter()
            .map(|c| CompendiumReference {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect()
    }

    fn load_compendium(&self, id: &str) -> Result<&Compendium, CompendiumError> {
        self.find(id).ok_or_else(|| CompendiumError::NotFound(id.to_string()))
    }

    fn entity_types(&self, compendium_id: &str) -> Vec<EntityTypeInfo> {
        let Some(compendium) = self.find(compendium_id) else {
            return Vec::new();
        };
        let mut types: Vec<EntityTypeInfo> = compendium
            .entity_types()
            .into_iter()
            .map(|type_name| {
                let description = compendium.schema(type_name).and_then(|s| s.description.clone());
                EntityTypeInfo {
                    type_name: type_name.to_string(),
                    display_name: description.clone().unwrap_or_else(|| type_name.to_string()),
                    count: compendium.entities_of_type(type_name).count(),
                    description,
                }
            })
            .collect();
        types.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        types
    }

    fn entities(&self, compendium_id: &str, entity_type: &str, query: &EntityQuery) -> EntityPage {
        let Some(compendium) = self.find(compendium_id) else {
            return EntityPage {
                entities: Vec::new(),
                total: 0,
                has_more: false,
            };
        };
        let matching: Vec<&StandardEntity> = compendium
            .entities_of_type(entity_type)
            .filter(|e| query.search.as_deref().map_or(true, |s| matches_search(e, s)))
            .filter(|e| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| matches_facet(e, field, Some(value)))
            })
            .collect();
        let total = matching.len();
        let limit = query.limit.unwrap_or(total);
        let entities: Vec<StandardEntity> = matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = query.offset + entities.len() < total;
        EntityPage {
            entities,
            total,
            has_more,
        }
    }

    fn entity_by_id(&self, compendium_id: &str, entity_type: &str, entity_id: &str) -> Option<&StandardEntity> {
        self.find(compendium_id)?
            .get(entity_id)
            .filter(|e| e.entity_type == entity_type)
    }

    fn entity_schema(&self, compendium_id: &str, entity_type: &str) -> Option<&EntitySchemaDefinition> {
        self.find(compendium_id)?.schema(entity_type)
    }
}
