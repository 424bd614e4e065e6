//! Which entities switch off which.
//!
//! Suppressors are visited in resolution order. Suppression is not
//! transitive: an entity that is itself suppressed suppresses nothing.
//! The first suppressor of a target wins and entities never suppress
//! themselves.

use super::types::SuppressionScope;
use crate::entity::StandardEntity;
use crate::filter::matching_entities;
use crate::variables::VariableLookup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuppressionMethod {
    Id,
    Tag,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressionInfo {
    pub suppressed_by: String,
    pub method: SuppressionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Suppressed entity id to the first suppression that hit it.
pub type SuppressionResult = BTreeMap<String, SuppressionInfo>;

/// Compute suppressions of `targets` by `suppressors` for one scope.
///
/// For the applied scope pass the same list twice; for the selectable
/// scope pass the character's active entities and the selector candidates.
pub fn calculate_suppressions(
    suppressors: &[&StandardEntity],
    targets: &[&StandardEntity],
    scope: SuppressionScope,
    variables: &dyn VariableLookup,
) -> SuppressionResult {
    let mut result = SuppressionResult::new();

    for suppressor in suppressors {
        if result.contains_key(&suppressor.id) {
            continue;
        }
        for config in suppressor.suppression.iter().filter(|c| c.scope.covers(scope)) {
            let mut hit = |target: &StandardEntity, method: SuppressionMethod| {
                if target.id != suppressor.id && !result.contains_key(&target.id) {
                    tracing::debug!(entity = %target.id, by = %suppressor.id, ?method, "entity suppressed");
                    result.insert(
                        target.id.clone(),
                        SuppressionInfo {
                            suppressed_by: suppressor.id.clone(),
                            method,
                            reason: config.reason.clone(),
                        },
                    );
                }
            };

            for id in &config.ids {
                if let Some(target) = targets.iter().find(|t| t.id == *id) {
                    hit(*target, SuppressionMethod::Id);
                }
            }
            if !config.tags.is_empty() {
                for target in targets.iter().filter(|t| t.tags.iter().any(|tag| config.tags.contains(tag))) {
                    hit(*target, SuppressionMethod::Tag);
                }
            }
            if let Some(filter) = &config.filter {
                for target in matching_entities(targets.iter().copied(), filter, variables) {
                    hit(target, SuppressionMethod::Filter);
                }
            }
        }
    }
    result
}
