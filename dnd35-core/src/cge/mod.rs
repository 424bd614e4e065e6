//! Configurable grantable entities: providers that grant or offer entities,
//! their resolution into a tree, suppression, and selection editing.

pub mod resolve;
pub mod selection;
pub mod suppression;
pub mod tree;
pub mod types;

pub use resolve::{
    resolve_cge, resolve_provider, CgeResolution, CgeRoot, ResolveContext, DEFAULT_MAX_PROVIDER_DEPTH, PARENT_PREFIX,
};
pub use selection::{
    apply_selection, remove_selection, validate_selection, SelectionCandidate, SelectionError, SelectionStatus,
    SelectionValidation, Selections,
};
pub use suppression::{calculate_suppressions, SuppressionInfo, SuppressionMethod, SuppressionResult};
pub use tree::{CgeNode, CgeTree, NodeId, ProviderState};
pub use types::{EntityProvider, GrantedConfig, Selector, SuppressionConfig, SuppressionScope};
