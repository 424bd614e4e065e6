//! Content-defined variables (`CUSTOM_VARIABLE` changes grouped by id).
//!
//! A custom variable may read another through `@customVariable.{id}`, so
//! they are evaluated in dependency order. Variables caught in a cycle are
//! reported and evaluate to 0. Ids under `resources.` belong to the
//! resource step.

use super::resources::is_resource_variable;
use super::Calculation;
use crate::bonus::{combine_sources, Source, SourceValue};
use crate::changes::ChangeTarget;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const CUSTOM_VARIABLE_PREFIX: &str = "customVariable.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedCustomVariable {
    pub unique_id: String,
    pub total_value: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
}

pub(crate) fn calculate_custom_variables(calc: &mut Calculation<'_>) -> Vec<CalculatedCustomVariable> {
    let mut ids: Vec<String> = Vec::new();
    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for change in calc.changes {
        let ChangeTarget::CustomVariable { unique_id } = change.target() else {
            continue;
        };
        if is_resource_variable(unique_id) {
            continue;
        }
        if !ids.contains(unique_id) {
            ids.push(unique_id.clone());
        }
        let entry = dependencies.entry(unique_id.clone()).or_default();
        for reference in change.change.formula.variable_references() {
            if let Some(other) = reference.strip_prefix(CUSTOM_VARIABLE_PREFIX) {
                entry.insert(other.to_string());
            }
        }
    }
    if ids.is_empty() {
        return Vec::new();
    }
    for deps in dependencies.values_mut() {
        deps.retain(|d| ids.contains(d));
    }

    let (order, cycles) = evaluation_order(&ids, &dependencies);
    let mut cyclic: BTreeSet<String> = BTreeSet::new();
    for cycle in cycles {
        calc.diagnostics.push(
            Diagnostic::warning(
                DiagnosticKind::CustomVariableCycle,
                format!("Custom variables depend on each other: {}", cycle.join(" -> ")),
            )
            .with_context("customVariables"),
        );
        cyclic.extend(cycle);
    }
    for id in &cyclic {
        calc.index.set(format!("{CUSTOM_VARIABLE_PREFIX}{id}"), 0);
    }

    let mut computed: HashMap<String, CalculatedCustomVariable> = HashMap::new();
    for id in order {
        let variable = if cyclic.contains(&id) {
            CalculatedCustomVariable {
                unique_id: id.clone(),
                ..Default::default()
            }
        } else {
            let sources =
                calc.sources(|target| matches!(target, ChangeTarget::CustomVariable { unique_id } if *unique_id == id));
            let combined = combine_sources(&sources);
            calc.index.set(format!("{CUSTOM_VARIABLE_PREFIX}{id}"), combined.total);
            CalculatedCustomVariable {
                unique_id: id.clone(),
                total_value: combined.total,
                sources,
                source_values: combined.source_values,
            }
        };
        computed.insert(id, variable);
    }

    ids.iter().filter_map(|id| computed.remove(id)).collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first topological order plus every cycle found on the way.
fn evaluation_order(
    ids: &[String],
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) -> (Vec<String>, Vec<Vec<String>>) {
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut stack = Vec::new();
    let mut order = Vec::new();
    let mut cycles = Vec::new();
    for id in ids {
        visit(id, dependencies, &mut marks, &mut stack, &mut order, &mut cycles);
    }
    (order, cycles)
}

fn visit(
    id: &str,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
    marks: &mut HashMap<String, Mark>,
    stack: &mut Vec<String>,
    order: &mut Vec<String>,
    cycles: &mut Vec<Vec<String>>,
) {
    match marks.get(id) {
        Some(Mark::Done) => return,
        Some(Mark::Visiting) => {
            if let Some(start) = stack.iter().position(|s| s == id) {
                cycles.push(stack[start..].to_vec());
            }
            return;
        }
        None => {}
    }
    marks.insert(id.to_string(), Mark::Visiting);
    stack.push(id.to_string());
    if let Some(deps) = dependencies.get(id) {
        for dep in deps {
            visit(dep, dependencies, marks, stack, order, cycles);
        }
    }
    stack.pop();
    marks.insert(id.to_string(), Mark::Done);
    order.push(id.to_string());
}
