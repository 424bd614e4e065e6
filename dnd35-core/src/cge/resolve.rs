//! Provider resolution: roots to a tree of granted and chosen entities.
//!
//! Each root (race, class level, item, ...) carries providers. Granted
//! parts are included directly; selector parts read the stored
//! [`Selections`] under a deterministic key. Entities pulled in by a
//! provider may carry providers of their own, which are expanded one tier
//! deeper with the entity's fields available as `@parent.*`.
//!
//! Selectable-scope suppression depends on what is active, and what is
//! active depends on the choices it constrains. Resolution therefore runs
//! once to find the active suppressors, then again with their targets
//! marked ineligible so stored choices of them are dropped.

use super::selection::{SelectionCandidate, SelectionStatus, Selections};
use super::suppression::{calculate_suppressions, SuppressionResult};
use super::tree::{CgeTree, NodeId, ProviderState};
use super::types::{EntityProvider, Selector, SuppressionScope};
use crate::compendium::Compendium;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::entity::{ComputedEntity, EntitySource, OriginType, StandardEntity};
use crate::filter::{filter_entities_with_variables, matching_entities};
use crate::variables::SubstitutionIndex;
use serde::Serialize;
use std::collections::HashSet;

/// Prefix under which a providing entity's fields are visible to the
/// filters of the providers it carries.
pub const PARENT_PREFIX: &str = "parent";

pub const DEFAULT_MAX_PROVIDER_DEPTH: usize = 10;

/// Where a provider chain starts.
#[derive(Debug, Clone)]
pub struct CgeRoot {
    /// Origin path, e.g. `class:fighter:1` or `item:longsword-1`.
    pub key: String,
    pub source: EntitySource,
    /// Entity placed on the character under `key`, if the root has one.
    pub entity: Option<StandardEntity>,
    /// Providers in addition to the entity's own.
    pub providers: Vec<EntityProvider>,
}

impl CgeRoot {
    pub fn entity(key: impl Into<String>, source: EntitySource, entity: StandardEntity) -> Self {
        Self {
            key: key.into(),
            source,
            entity: Some(entity),
            providers: Vec::new(),
        }
    }

    pub fn providers(key: impl Into<String>, source: EntitySource, providers: Vec<EntityProvider>) -> Self {
        Self {
            key: key.into(),
            source,
            entity: None,
            providers,
        }
    }
}

pub struct ResolveContext<'a> {
    pub compendium: &'a Compendium,
    pub selections: &'a Selections,
    /// Character variables visible to eligibility filters.
    pub variables: &'a SubstitutionIndex,
    pub max_depth: usize,
}

impl<'a> ResolveContext<'a> {
    pub fn new(compendium: &'a Compendium, selections: &'a Selections, variables: &'a SubstitutionIndex) -> Self {
        Self {
            compendium,
            selections,
            variables,
            max_depth: DEFAULT_MAX_PROVIDER_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CgeResolution {
    /// Every entity placed on the character, suppressed ones included.
    pub entities: Vec<ComputedEntity>,
    #[serde(skip)]
    pub tree: CgeTree,
    pub selections: Vec<SelectionStatus>,
    pub diagnostics: Diagnostics,
}

impl CgeResolution {
    pub fn active_entities(&self) -> impl Iterator<Item = &ComputedEntity> {
        self.entities.iter().filter(|e| e.is_active())
    }

    pub fn entity(&self, instance_id: &str) -> Option<&ComputedEntity> {
        self.entities.iter().find(|e| e.meta.instance_id == instance_id)
    }

    pub fn selection(&self, key: &str) -> Option<&SelectionStatus> {
        self.selections.iter().find(|s| s.key == key)
    }

    pub fn incomplete_selections(&self) -> impl Iterator<Item = &SelectionStatus> {
        self.selections.iter().filter(|s| s.incomplete)
    }
}

/// Resolve every root in order.
pub fn resolve_cge(roots: &[CgeRoot], ctx: &ResolveContext<'_>) -> CgeResolution {
    let first = Resolver::new(ctx, SuppressionResult::new()).run(roots);
    let blocked = first.selectable_suppressions();
    if blocked.is_empty() {
        return first.finish();
    }
    tracing::debug!(blocked = blocked.len(), "re-resolving with selectable suppression");
    Resolver::new(ctx, blocked).run(roots).finish()
}

/// Resolve a single provider hanging off `key`.
pub fn resolve_provider(
    provider: &EntityProvider,
    key: &str,
    source: EntitySource,
    ctx: &ResolveContext<'_>,
) -> CgeResolution {
    resolve_cge(&[CgeRoot::providers(key, source, vec![provider.clone()])], ctx)
}

struct Resolver<'r, 'a> {
    ctx: &'r ResolveContext<'a>,
    tree: CgeTree,
    entities: Vec<ComputedEntity>,
    statuses: Vec<SelectionStatus>,
    diagnostics: Diagnostics,
    /// Candidates switched off by selectable-scope suppression.
    blocked: SuppressionResult,
}

/// Where a provider sits and what it inherits.
struct Frame<'f> {
    parent: Option<NodeId>,
    path: &'f str,
    owner: Option<&'f str>,
    /// Origin given to entities this frame places. Roots pass their own;
    /// nested frames name the providing entity.
    source: &'f EntitySource,
    variables: &'f SubstitutionIndex,
    /// Entity ids from the root down to the owner.
    chain: &'f [String],
}

impl<'r, 'a> Resolver<'r, 'a> {
    fn new(ctx: &'r ResolveContext<'a>, blocked: SuppressionResult) -> Self {
        Self {
            ctx,
            tree: CgeTree::new(),
            entities: Vec::new(),
            statuses: Vec::new(),
            diagnostics: Diagnostics::new(),
            blocked,
        }
    }

    fn run(mut self, roots: &[CgeRoot]) -> Self {
        for root in roots {
            self.resolve_root(root);
        }
        self.apply_suppression();
        self
    }

    fn resolve_root(&mut self, root: &CgeRoot) {
        let mut variables = self.ctx.variables.clone();
        let mut chain = Vec::new();
        let mut providers: Vec<&EntityProvider> = Vec::new();
        if let Some(entity) = &root.entity {
            tracing::debug!(root = %root.key, entity = %entity.id, "resolving root entity");
            self.entities
                .push(ComputedEntity::new(entity.clone(), root.source.clone(), root.key.clone()));
            variables.remove_prefix(&format!("{PARENT_PREFIX}."));
            variables.extend(&entity.variables(PARENT_PREFIX));
            chain.push(entity.id.clone());
            providers.extend(entity.providers.iter());
        }
        providers.extend(root.providers.iter());

        let frame = Frame {
            parent: None,
            path: &root.key,
            owner: root.entity.as_ref().map(|_| root.key.as_str()),
            source: &root.source,
            variables: &variables,
            chain: &chain,
        };
        for provider in providers {
            self.expand(&frame, provider);
        }
    }

    fn expand(&mut self, frame: &Frame<'_>, provider: &EntityProvider) {
        let node = self
            .tree
            .push(frame.parent, frame.path, frame.owner.map(str::to_string), provider.clone());
        let depth = self.tree.get(node).map_or(0, |n| n.depth);
        if depth > self.ctx.max_depth {
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::DepthExceeded,
                    format!("Provider nesting exceeds the maximum depth of {}", self.ctx.max_depth),
                )
                .with_context(frame.path),
            );
            return;
        }
        if provider.granted.is_none() && provider.selector.is_none() {
            self.diagnostics.push(
                Diagnostic::warning(DiagnosticKind::EmptyProvider, "Provider has neither granted nor selector")
                    .with_context(frame.path),
            );
            return;
        }
        if let Some(selector) = &provider.selector {
            if selector.min > selector.max {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::SelectorMinExceedsMax,
                        format!(
                            "Selector '{}' requires at least {} but allows at most {}",
                            selector.id, selector.min, selector.max
                        ),
                    )
                    .with_context(frame.path),
                );
                return;
            }
        }

        let granted = self.granted_entities(frame, provider);
        let mut state = ProviderState::Resolved;
        let mut selected = Vec::new();
        if let Some(selector) = &provider.selector {
            match self.resolve_selector(frame, node, selector) {
                Some((chosen, complete)) => {
                    if complete {
                        selected = chosen;
                    } else {
                        state = ProviderState::PendingChoice;
                    }
                }
                None => return,
            }
        }

        if let Some(n) = self.tree.get_mut(node) {
            n.state = state;
        }

        let mut placed: HashSet<String> = HashSet::new();
        for (entity, is_selected) in granted
            .into_iter()
            .map(|e| (e, false))
            .chain(selected.into_iter().map(|e| (e, true)))
        {
            if !placed.insert(entity.id.clone()) {
                continue;
            }
            if frame.chain.contains(&entity.id) {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::ProviderCycle,
                        format!("'{}' provides itself through its own providers", entity.id),
                    )
                    .with_context(frame.path),
                );
                continue;
            }
            let instance_id = format!("{}/{}", frame.path, entity.id);
            if let Some(n) = self.tree.get_mut(node) {
                if is_selected {
                    n.selected.push(instance_id.clone());
                } else {
                    n.granted.push(instance_id.clone());
                }
            }
            self.place(frame, node, entity, instance_id);
        }
    }

    /// Add an entity to the character and expand its own providers.
    fn place(&mut self, frame: &Frame<'_>, node: NodeId, entity: &'a StandardEntity, instance_id: String) {
        self.entities
            .push(ComputedEntity::new(entity.clone(), frame.source.clone(), instance_id.clone()));

        if entity.providers.is_empty() {
            return;
        }
        let mut variables = frame.variables.clone();
        variables.remove_prefix(&format!("{PARENT_PREFIX}."));
        variables.extend(&entity.variables(PARENT_PREFIX));
        let mut chain = frame.chain.to_vec();
        chain.push(entity.id.clone());
        let child_source = EntitySource {
            origin_type: OriginType::Entity,
            origin_id: entity.id.clone(),
            name: entity.name.clone(),
        };
        let child = Frame {
            parent: Some(node),
            path: &instance_id,
            owner: Some(&instance_id),
            source: &child_source,
            variables: &variables,
            chain: &chain,
        };
        for provider in &entity.providers {
            self.expand(&child, provider);
        }
    }

    fn granted_entities(&mut self, frame: &Frame<'_>, provider: &EntityProvider) -> Vec<&'a StandardEntity> {
        let Some(granted) = &provider.granted else {
            return Vec::new();
        };
        let compendium = self.ctx.compendium;
        let mut entities: Vec<&'a StandardEntity> = Vec::new();
        for id in &granted.specific_ids {
            match compendium.get(id) {
                Some(entity) => entities.push(entity),
                None => self.diagnostics.push(
                    Diagnostic::warning(DiagnosticKind::EntityNotFound, format!("Granted entity '{id}' not found"))
                        .with_context(frame.path),
                ),
            }
        }
        if let Some(filter) = &granted.filter {
            for entity in matching_entities(compendium.entities().iter(), filter, frame.variables) {
                if !entities.iter().any(|e| e.id == entity.id) {
                    entities.push(entity);
                }
            }
        }
        entities
    }

    /// Build the selection status for a selector. Returns the valid chosen
    /// entities and whether the slot is complete, or `None` when the
    /// selector cannot offer anything.
    fn resolve_selector(
        &mut self,
        frame: &Frame<'_>,
        node: NodeId,
        selector: &Selector,
    ) -> Option<(Vec<&'a StandardEntity>, bool)> {
        let key = format!("{}#{}", frame.path, selector.id);
        let candidates = self.candidates(frame, selector)?;
        if let Some(n) = self.tree.get_mut(node) {
            n.selection_key = Some(key.clone());
        }

        let selections = self.ctx.selections;
        let mut chosen: Vec<&'a StandardEntity> = Vec::new();
        for id in selections.get(&key).into_iter().flatten() {
            if chosen.iter().any(|e| e.id == *id) {
                continue;
            }
            match candidates.iter().find(|(entity, _)| entity.id == *id) {
                None => self.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::SelectionNotCandidate,
                        format!("'{id}' is not a candidate for '{}'", selector.name),
                    )
                    .with_context(key.as_str()),
                ),
                Some((_, false)) => {
                    let message = match self.blocked.get(id) {
                        Some(info) => format!(
                            "'{id}' is suppressed by '{}' and cannot be chosen for '{}'",
                            info.suppressed_by, selector.name
                        ),
                        None => format!("'{id}' is not eligible for '{}'", selector.name),
                    };
                    self.diagnostics.push(
                        Diagnostic::warning(DiagnosticKind::SelectionIneligible, message).with_context(key.as_str()),
                    );
                }
                Some(_) if chosen.len() >= selector.max => self.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::SelectionOverMax,
                        format!("'{id}' exceeds the maximum of {} for '{}'", selector.max, selector.name),
                    )
                    .with_context(key.as_str()),
                ),
                Some((entity, true)) => chosen.push(*entity),
            }
        }

        let incomplete = chosen.len() < selector.min;
        if incomplete {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::IncompleteSelection,
                    format!(
                        "'{}' has {} of {} required selection(s)",
                        selector.name,
                        chosen.len(),
                        selector.min
                    ),
                )
                .with_context(key.as_str()),
            );
        }

        self.statuses.push(SelectionStatus {
            key,
            selector_name: selector.name.clone(),
            min: selector.min,
            max: selector.max,
            candidates: candidates
                .iter()
                .map(|(entity, eligible)| SelectionCandidate {
                    entity_id: entity.id.clone(),
                    name: entity.name.clone(),
                    ineligible: !eligible,
                    suppressed_by: self.blocked.get(&entity.id).map(|info| info.suppressed_by.clone()),
                })
                .collect(),
            selected: chosen.iter().map(|e| e.id.clone()).collect(),
            incomplete,
            state: if incomplete {
                ProviderState::PendingChoice
            } else {
                ProviderState::Resolved
            },
        });
        Some((chosen, !incomplete))
    }

    /// Candidate entities with their eligibility.
    fn candidates(&mut self, frame: &Frame<'_>, selector: &Selector) -> Option<Vec<(&'a StandardEntity, bool)>> {
        let compendium = self.ctx.compendium;
        let pool: Vec<&'a StandardEntity> = if !selector.entity_ids.is_empty() {
            let mut pool = Vec::new();
            for id in &selector.entity_ids {
                match compendium.get(id) {
                    Some(entity) => pool.push(entity),
                    None => self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::EntityNotFound,
                            format!("Selector candidate '{id}' not found"),
                        )
                        .with_context(frame.path),
                    ),
                }
            }
            pool
        } else if selector.filter.is_some() {
            match &selector.entity_type {
                Some(entity_type) => compendium.entities_of_type(entity_type).collect(),
                None => compendium.entities().iter().collect(),
            }
        } else if let Some(entity_type) = &selector.entity_type {
            compendium.entities_of_type(entity_type).collect()
        } else {
            self.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::InvalidProvider,
                    format!("Selector '{}' has no entityIds, entityType or filter", selector.id),
                )
                .with_context(frame.path),
            );
            return None;
        };

        let candidates: Vec<(&'a StandardEntity, bool)> = match &selector.filter {
            Some(filter) => filter_entities_with_variables(pool, filter, frame.variables)
                .into_iter()
                .map(|result| (result.entity, result.matches))
                .collect(),
            None => pool.into_iter().map(|entity| (entity, true)).collect(),
        };
        Some(
            candidates
                .into_iter()
                .map(|(entity, eligible)| (entity, eligible && !self.blocked.contains_key(&entity.id)))
                .collect(),
        )
    }

    fn finish(self) -> CgeResolution {
        tracing::debug!(
            entities = self.entities.len(),
            nodes = self.tree.len(),
            selections = self.statuses.len(),
            "provider resolution complete"
        );
        CgeResolution {
            entities: self.entities,
            tree: self.tree,
            selections: self.statuses,
            diagnostics: self.diagnostics,
        }
    }

    fn apply_suppression(&mut self) {
        let refs: Vec<&StandardEntity> = self.entities.iter().map(|e| &e.entity).collect();
        let result = calculate_suppressions(&refs, &refs, SuppressionScope::Applied, self.ctx.variables);
        if result.is_empty() {
            return;
        }
        for computed in &mut self.entities {
            if let Some(info) = result.get(computed.id()) {
                computed.meta.suppressed = true;
                computed.meta.suppressed_by = Some(info.suppressed_by.clone());
                computed.meta.suppressed_reason = info.reason.clone();
            }
        }

        // Nodes are stored parents first, so one pass reaches every descendant.
        let mut suppressed: HashSet<String> = self
            .entities
            .iter()
            .filter(|e| !e.is_active())
            .map(|e| e.meta.instance_id.clone())
            .collect();
        let mut inherited: Vec<(String, String)> = Vec::new();
        for node in self.tree.iter_mut() {
            let Some(owner) = &node.owner else { continue };
            if !suppressed.contains(owner) {
                continue;
            }
            node.state = ProviderState::Suppressed;
            for instance in node.granted.iter().chain(node.selected.iter()) {
                if suppressed.insert(instance.clone()) {
                    inherited.push((instance.clone(), owner.clone()));
                }
            }
        }
        for (instance, owner) in inherited {
            let owner_by = self
                .entities
                .iter()
                .find(|e| e.meta.instance_id == owner)
                .and_then(|e| e.meta.suppressed_by.clone());
            if let Some(computed) = self.entities.iter_mut().find(|e| e.meta.instance_id == instance) {
                computed.meta.suppressed = true;
                computed.meta.suppressed_by = owner_by;
                computed.meta.suppressed_reason = Some(format!("Provided by suppressed '{owner}'"));
            }
        }

        let suppressed_keys: Vec<String> = self
            .tree
            .iter()
            .filter(|n| n.state == ProviderState::Suppressed)
            .filter_map(|n| n.selection_key.clone())
            .collect();
        for status in &mut self.statuses {
            if suppressed_keys.contains(&status.key) {
                status.state = ProviderState::Suppressed;
            }
        }
    }

    /// Candidates of any selector that an active entity suppresses with
    /// the selectable scope.
    fn selectable_suppressions(&self) -> SuppressionResult {
        let suppressors: Vec<&StandardEntity> = self
            .entities
            .iter()
            .filter(|e| e.is_active())
            .map(|e| &e.entity)
            .filter(|e| e.suppression.iter().any(|s| s.scope.covers(SuppressionScope::Selectable)))
            .collect();
        if suppressors.is_empty() {
            return SuppressionResult::new();
        }
        let compendium = self.ctx.compendium;
        let mut targets: Vec<&StandardEntity> = Vec::new();
        for candidate in self.statuses.iter().flat_map(|s| s.candidates.iter()) {
            if targets.iter().any(|t| t.id == candidate.entity_id) {
                continue;
            }
            if let Some(entity) = compendium.get(&candidate.entity_id) {
                targets.push(entity);
            }
        }
        calculate_suppressions(&suppressors, &targets, SuppressionScope::Selectable, self.ctx.variables)
    }
}
