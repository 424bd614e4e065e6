//! Arena of resolved provider nodes.

use super::types::EntityProvider;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Lifecycle of one provider during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderState {
    /// Structurally invalid or beyond the depth cap; contributes nothing.
    Unresolved,
    /// Selector waiting on more choices.
    PendingChoice,
    Resolved,
    /// The entity owning this provider was suppressed.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgeNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: usize,
    /// Instance path of the owner, e.g. `class:fighter:1/combat-expertise`.
    pub path: String,
    /// Instance id of the entity carrying the provider, if any.
    pub owner: Option<String>,
    pub provider: EntityProvider,
    pub selection_key: Option<String>,
    pub state: ProviderState,
    /// Instance ids of the entities this node contributed.
    pub granted: Vec<String>,
    pub selected: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CgeTree {
    nodes: Vec<CgeNode>,
}

impl CgeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and link it under `parent`.
    pub fn push(
        &mut self,
        parent: Option<NodeId>,
        path: impl Into<String>,
        owner: Option<String>,
        provider: EntityProvider,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = parent.and_then(|p| self.get(p)).map_or(0, |p| p.depth + 1);
        self.nodes.push(CgeNode {
            id,
            parent,
            children: Vec::new(),
            depth,
            path: path.into(),
            owner,
            provider,
            selection_key: None,
            state: ProviderState::Unresolved,
            granted: Vec::new(),
            selected: Vec::new(),
        });
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p.0)) {
            parent.children.push(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&CgeNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut CgeNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn roots(&self) -> impl Iterator<Item = &CgeNode> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &CgeNode> {
        self.get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.get(*child))
    }

    /// Parent first, root last.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent);
        while let Some(node) = current {
            chain.push(node);
            current = self.get(node).and_then(|n| n.parent);
        }
        chain
    }

    pub fn iter(&self) -> impl Iterator<Item = &CgeNode> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CgeNode> {
        self.nodes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_links() {
        let mut tree = CgeTree::new();
        let root = tree.push(None, "class:fighter:1", None, EntityProvider::default());
        let child = tree.push(
            Some(root),
            "class:fighter:1/combat-expertise",
            Some("class:fighter:1/combat-expertise".into()),
            EntityProvider::default(),
        );
        let grandchild = tree.push(Some(child), "x", None, EntityProvider::default());

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(grandchild).unwrap().depth, 2);
        assert_eq!(tree.ancestors(grandchild), vec![child, root]);
        assert_eq!(tree.children(root).map(|n| n.id).collect::<Vec<_>>(), vec![child]);
        assert_eq!(tree.roots().count(), 1);
        assert_eq!(tree.max_depth(), 2);
    }
}
