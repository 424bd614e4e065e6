//! Entity filtering: property conditions for eligibility and declarative
//! browser filter configs.

pub mod condition;
pub mod config;
pub mod registry;

pub use condition::{
    filter_entities_with_variables, matching_entities, EntityFilter, FilterCondition, FilterLogic, FilterOperator,
    FilterPolicy, FilterResult,
};
pub use config::{
    all_filter_ids, apply_filter_config, generate_facets, initial_filter_state, matches_facet, matches_relation,
    relation_secondary_options, EntityFacet, EntityFilterConfig, FacetFilterDef, FacetType, FilterDef,
    FilterGroupDef, FilterOption, FilterState, RelationFilterDef,
};
pub use registry::FilterConfigRegistry;
