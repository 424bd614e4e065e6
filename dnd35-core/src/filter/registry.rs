//! Filter configurations by entity type, with built-ins for the core types.

use super::config::{
    EntityFilterConfig, EntityTypeFilterDef, FacetFilterDef, FilterDef, FilterOption, RelationFilterDef,
    RelationPrimary, RelationSecondary,
};
use serde_json::Map;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FilterConfigRegistry {
    configs: HashMap<String, EntityFilterConfig>,
}

impl FilterConfigRegistry {
    /// A registry with no configs at all.
    pub fn empty() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// A registry pre-loaded with the spell, feat and equipment configs.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for config in BUILTIN_FILTER_CONFIGS.iter() {
            registry.register(config.clone());
        }
        registry
    }

    /// Register a config for its entity type; the last registration wins.
    pub fn register(&mut self, config: EntityFilterConfig) {
        tracing::debug!(entity_type = %config.entity_type, "registering filter config");
        self.configs.insert(config.entity_type.clone(), config);
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityFilterConfig> {
        self.configs.get(entity_type)
    }

    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.configs.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for FilterConfigRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn facet(id: &str, label: &str, multi_select: bool) -> FilterDef {
    FilterDef::Facet(FacetFilterDef {
        id: id.to_string(),
        label: label.to_string(),
        facet_field: id.to_string(),
        multi_select,
        default_value: None,
    })
}

fn spell_config() -> EntityFilterConfig {
    let classes = [
        ("wizard", "Wizard"),
        ("sorcerer", "Sorcerer"),
        ("cleric", "Cleric"),
        ("druid", "Druid"),
        ("bard", "Bard"),
        ("paladin", "Paladin"),
        ("ranger", "Ranger"),
    ];
    EntityFilterConfig {
        entity_type: "spell".to_string(),
        label: "Spells".to_string(),
        filters: vec![
            FilterDef::Relation(RelationFilterDef {
                id: "classLevel".to_string(),
                label: "Class and Level".to_string(),
                relation_map_path: "classData.classLevels".to_string(),
                primary: RelationPrimary {
                    id: "class".to_string(),
                    label: "Class".to_string(),
                    options: classes.iter().map(|(v, l)| FilterOption::new(*v, *l)).collect(),
                },
                secondary: RelationSecondary {
                    id: "level".to_string(),
                    label: "Level".to_string(),
                    label_format: Some("Level {value}".to_string()),
                },
            }),
            facet("school", "School", true),
            facet("components", "Components", true),
            facet("castingTime", "Casting Time", true),
            facet("range", "Range", true),
            facet("spellResistance", "Spell Resistance", false),
        ],
        defaults: Map::new(),
    }
}

fn feat_config() -> EntityFilterConfig {
    EntityFilterConfig {
        entity_type: "feat".to_string(),
        label: "Feats".to_string(),
        filters: vec![facet("tags", "Tags", true), facet("category", "Category", false)],
        defaults: Map::new(),
    }
}

fn equipment_config() -> EntityFilterConfig {
    EntityFilterConfig {
        entity_type: "equipment".to_string(),
        label: "Equipment".to_string(),
        filters: vec![FilterDef::EntityType(EntityTypeFilterDef {
            id: "entityType".to_string(),
            label: "Type".to_string(),
            entity_types: ["weapon", "armor", "shield", "item"].iter().map(|t| t.to_string()).collect(),
            default_value: None,
        })],
        defaults: Map::new(),
    }
}

lazy_static::lazy_static! {
    pub static ref BUILTIN_FILTER_CONFIGS: Vec<EntityFilterConfig> =
        vec![spell_config(), feat_config(), equipment_config()];
}
