//! Provider and suppression definitions carried by entities.

use crate::filter::EntityFilter;
use serde::{Deserialize, Serialize};

/// Entities included automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GrantedConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specific_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EntityFilter>,
}

/// A choice of `min..=max` entities from a candidate list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EntityFilter>,
    #[serde(default)]
    pub min: usize,
    #[serde(default = "default_max")]
    pub max: usize,
}

fn default_max() -> usize {
    1
}

impl Selector {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: None,
            entity_ids: Vec::new(),
            filter: None,
            min: 1,
            max: 1,
        }
    }

    pub fn of_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn from_ids(mut self, ids: &[&str]) -> Self {
        self.entity_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_filter(mut self, filter: EntityFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn choose(mut self, min: usize, max: usize) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EntityProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted: Option<GrantedConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
}

impl EntityProvider {
    pub fn granting(ids: &[&str]) -> Self {
        Self {
            granted: Some(GrantedConfig {
                specific_ids: ids.iter().map(|id| id.to_string()).collect(),
                filter: None,
            }),
            selector: None,
        }
    }

    pub fn selecting(selector: Selector) -> Self {
        Self {
            granted: None,
            selector: Some(selector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionScope {
    /// Entities the character already has.
    #[default]
    Applied,
    /// Candidates offered by selectors.
    Selectable,
    All,
}

impl SuppressionScope {
    pub fn covers(&self, target: SuppressionScope) -> bool {
        *self == SuppressionScope::All || *self == target
    }
}

/// Declares entities this one switches off, e.g. an archetype replacing
/// a class feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionConfig {
    #[serde(default)]
    pub scope: SuppressionScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<EntityFilter>,
}

impl SuppressionConfig {
    pub fn ids(scope: SuppressionScope, ids: &[&str]) -> Self {
        Self {
            scope,
            ids: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
