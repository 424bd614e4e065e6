//! Everything a calculation reads besides the character itself.
//!
//! Built once per loaded compendium and shared by reference afterwards.

use crate::cge::DEFAULT_MAX_PROVIDER_DEPTH;
use crate::compendium::Compendium;
use crate::filter::FilterConfigRegistry;
use crate::formula::FormulaCache;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculationOptions {
    pub max_provider_depth: usize,
    /// Offer Flanking, Charging and the other standard situational modifiers.
    pub include_default_contextual_changes: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            max_provider_depth: DEFAULT_MAX_PROVIDER_DEPTH,
            include_default_contextual_changes: true,
        }
    }
}

#[derive(Debug)]
pub struct CalculationContext {
    pub compendium: Compendium,
    pub filter_registry: FilterConfigRegistry,
    pub formulas: FormulaCache,
    pub options: CalculationOptions,
}

impl CalculationContext {
    pub fn new(compendium: Compendium) -> Self {
        Self {
            compendium,
            filter_registry: FilterConfigRegistry::with_builtins(),
            formulas: FormulaCache::new(),
            options: CalculationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CalculationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_filter_registry(mut self, registry: FilterConfigRegistry) -> Self {
        self.filter_registry = registry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_default_when_missing() {
        let options: CalculationOptions = serde_json::from_value(json!({ "maxProviderDepth": 4 })).unwrap();
        assert_eq!(options.max_provider_depth, 4);
        assert!(options.include_default_contextual_changes);
    }

    #[test]
    fn test_context_has_builtin_filters() {
        let ctx = CalculationContext::new(Compendium::new("empty", "Empty", Vec::new(), Vec::new()));
        assert!(ctx.filter_registry.get("spell").is_some());
        assert_eq!(ctx.options.max_provider_depth, 10);
    }
}
