//! Selector slots: what can be chosen, what was chosen, and editing.

use super::tree::ProviderState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Chosen entity ids per selection key, as stored on the character.
pub type Selections = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCandidate {
    pub entity_id: String,
    pub name: String,
    #[serde(default)]
    pub ineligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_by: Option<String>,
}

/// One selector slot after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionStatus {
    pub key: String,
    pub selector_name: String,
    pub min: usize,
    pub max: usize,
    pub candidates: Vec<SelectionCandidate>,
    /// Valid choices, in stored order.
    pub selected: Vec<String>,
    pub incomplete: bool,
    pub state: ProviderState,
}

impl SelectionStatus {
    pub fn candidate(&self, entity_id: &str) -> Option<&SelectionCandidate> {
        self.candidates.iter().find(|c| c.entity_id == entity_id)
    }

    pub fn remaining(&self) -> usize {
        self.max.saturating_sub(self.selected.len())
    }

    /// Candidates the player may still pick.
    pub fn available(&self) -> impl Iterator<Item = &SelectionCandidate> {
        self.candidates
            .iter()
            .filter(|c| !c.ineligible && !self.selected.contains(&c.entity_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("'{entity_id}' is already selected for '{key}'")]
    AlreadySelected { key: String, entity_id: String },
    #[error("'{key}' already has its maximum of {max} selections")]
    MaxReached { key: String, max: usize },
    #[error("'{entity_id}' is not a candidate for '{key}'")]
    NotCandidate { key: String, entity_id: String },
    #[error("'{entity_id}' is not eligible for '{key}'")]
    Ineligible { key: String, entity_id: String },
    #[error("'{entity_id}' is not selected for '{key}'")]
    NotSelected { key: String, entity_id: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionValidation {
    pub errors: Vec<SelectionError>,
    pub warnings: Vec<String>,
}

impl SelectionValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a full proposed choice list for a slot.
pub fn validate_selection(status: &SelectionStatus, entity_ids: &[String]) -> SelectionValidation {
    let mut validation = SelectionValidation::default();
    let mut seen: Vec<&str> = Vec::new();
    for id in entity_ids {
        if seen.contains(&id.as_str()) {
            validation.errors.push(SelectionError::AlreadySelected {
                key: status.key.clone(),
                entity_id: id.clone(),
            });
            continue;
        }
        seen.push(id);
        match status.candidate(id) {
            None => validation.errors.push(SelectionError::NotCandidate {
                key: status.key.clone(),
                entity_id: id.clone(),
            }),
            Some(candidate) if candidate.ineligible => validation.errors.push(SelectionError::Ineligible {
                key: status.key.clone(),
                entity_id: id.clone(),
            }),
            Some(_) => {}
        }
    }
    if seen.len() > status.max {
        validation.errors.push(SelectionError::MaxReached {
            key: status.key.clone(),
            max: status.max,
        });
    }
    if seen.len() < status.min {
        validation.warnings.push(format!(
            "'{}' needs {} more selection(s)",
            status.selector_name,
            status.min - seen.len()
        ));
    }
    validation
}

/// Add one choice to the stored selections.
pub fn apply_selection(selections: &mut Selections, status: &SelectionStatus, entity_id: &str) -> Result<(), SelectionError> {
    let current = selections.get(&status.key).map(Vec::as_slice).unwrap_or_default();
    if current.iter().any(|id| id == entity_id) {
        return Err(SelectionError::AlreadySelected {
            key: status.key.clone(),
            entity_id: entity_id.to_string(),
        });
    }
    let candidate = status.candidate(entity_id).ok_or_else(|| SelectionError::NotCandidate {
        key: status.key.clone(),
        entity_id: entity_id.to_string(),
    })?;
    if candidate.ineligible {
        return Err(SelectionError::Ineligible {
            key: status.key.clone(),
            entity_id: entity_id.to_string(),
        });
    }
    if current.len() >= status.max {
        return Err(SelectionError::MaxReached {
            key: status.key.clone(),
            max: status.max,
        });
    }
    selections
        .entry(status.key.clone())
        .or_default()
        .push(entity_id.to_string());
    Ok(())
}

/// Remove one choice and every nested selection made beneath it.
pub fn remove_selection(selections: &mut Selections, key: &str, entity_id: &str) -> Result<(), SelectionError> {
    let not_selected = || SelectionError::NotSelected {
        key: key.to_string(),
        entity_id: entity_id.to_string(),
    };
    let chosen = selections.get_mut(key).ok_or_else(not_selected)?;
    let position = chosen.iter().position(|id| id == entity_id).ok_or_else(not_selected)?;
    chosen.remove(position);
    if chosen.is_empty() {
        selections.remove(key);
    }

    let path = key.split_once('#').map_or(key, |(path, _)| path);
    let nested = format!("{path}/{entity_id}");
    selections.retain(|k, _| {
        let nested_key = k
            .strip_prefix(&nested)
            .is_some_and(|rest| rest.starts_with('#') || rest.starts_with('/'));
        !nested_key
    });
    Ok(())
}
