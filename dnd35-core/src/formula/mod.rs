//! Formula language: arithmetic, dice, functions and `@variable` references.
//!
//! Formulas are parsed once into an [`Expr`] and evaluated against a
//! [`VariableLookup`]. Evaluation never fails: unknown variables, parse
//! errors and bad dice evaluate to `0` and are reported as
//! [`FormulaWarning`]s.

mod eval;
mod parser;

pub use eval::{DiceMode, FormulaWarning};
pub use parser::{extract_variable_references, parse, BinaryOp, Expr, FormulaError, Function, Keep};

use crate::variables::{VariableLookup, VariableValue};
use eval::Evaluator;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A value together with the warnings produced computing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<T> {
    pub value: T,
    pub warnings: Vec<FormulaWarning>,
}

impl<T> Evaluation<T> {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A formula as stored in content: a bare string, `{ "expression" }`, or
/// a switch over cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Formula {
    Switch(SwitchFormula),
    Expression(ExpressionFormula),
    Text(String),
}

impl Formula {
    pub fn expression(expression: impl Into<String>) -> Self {
        Formula::Expression(ExpressionFormula {
            expression: expression.into(),
        })
    }

    /// Variable names this formula may read.
    pub fn variable_references(&self) -> Vec<String> {
        match self {
            Formula::Text(text) => extract_variable_references(text),
            Formula::Expression(f) => extract_variable_references(&f.expression),
            Formula::Switch(switch) => {
                let mut names = extract_variable_references(&switch.switch_expression);
                for case in &switch.cases {
                    names.extend(extract_variable_references(&case.result_expression));
                }
                names.extend(extract_variable_references(&switch.default_value));
                names
            }
        }
    }
}

impl Default for Formula {
    fn default() -> Self {
        Formula::Text("0".to_string())
    }
}

impl From<&str> for Formula {
    fn from(value: &str) -> Self {
        Formula::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionFormula {
    pub expression: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchTag {
    #[serde(rename = "switch")]
    Switch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchFormula {
    #[serde(rename = "type")]
    pub tag: SwitchTag,
    pub switch_expression: String,
    #[serde(default)]
    pub cases: Vec<SwitchCase>,
    #[serde(default = "zero_expression")]
    pub default_value: String,
}

fn zero_expression() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CaseOperator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl CaseOperator {
    pub fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            CaseOperator::Eq => left == right,
            CaseOperator::Ne => left != right,
            CaseOperator::Gt => left > right,
            CaseOperator::Lt => left < right,
            CaseOperator::Ge => left >= right,
            CaseOperator::Le => left <= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCase {
    pub case_value: CaseValue,
    #[serde(default)]
    pub operator: CaseOperator,
    pub result_expression: String,
}

enum SwitchValue {
    Number(f64),
    Text(String),
}

impl SwitchCase {
    fn matches(&self, value: &SwitchValue) -> bool {
        let case_number = match &self.case_value {
            CaseValue::Number(n) => Some(*n),
            CaseValue::Text(s) => s.trim().parse::<f64>().ok(),
        };
        let switch_number = match value {
            SwitchValue::Number(n) => Some(*n),
            SwitchValue::Text(s) => s.trim().parse::<f64>().ok(),
        };
        if let (Some(l), Some(r)) = (switch_number, case_number) {
            return self.operator.compare(l, r);
        }

        let case_text = match &self.case_value {
            CaseValue::Number(n) => n.to_string(),
            CaseValue::Text(s) => s.clone(),
        };
        let switch_text = match value {
            SwitchValue::Number(n) => n.to_string(),
            SwitchValue::Text(s) => s.clone(),
        };
        match self.operator {
            CaseOperator::Eq => switch_text == case_text,
            CaseOperator::Ne => switch_text != case_text,
            _ => false,
        }
    }
}

fn parse_warning(formula: &str, error: &FormulaError) -> FormulaWarning {
    FormulaWarning::Parse {
        formula: formula.to_string(),
        error: error.clone(),
    }
}

/// Memoized formula parser.
///
/// Shared by every calculation against the same compendium. Parse results,
/// including failures, are cached by source text.
#[derive(Debug, Default)]
pub struct FormulaCache {
    parsed: RwLock<HashMap<String, Arc<Result<Expr, FormulaError>>>>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, source: &str) -> Arc<Result<Expr, FormulaError>> {
        {
            let parsed = self.parsed.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = parsed.get(source) {
                return Arc::clone(hit);
            }
        }
        tracing::trace!(formula = source, "parsing formula");
        let result = Arc::new(parse(source));
        let mut parsed = self.parsed.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(parsed.entry(source.to_string()).or_insert(result))
    }

    pub fn len(&self) -> usize {
        self.parsed.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn run<T>(
        &self,
        source: &str,
        vars: &dyn VariableLookup,
        dice: DiceMode<'_>,
        fallback: T,
        body: impl FnOnce(&mut Evaluator<'_, '_>, &Expr) -> T,
    ) -> Evaluation<T> {
        let parsed = self.parse(source);
        match parsed.as_ref() {
            Ok(expr) => {
                let mut evaluator = Evaluator::new(vars, dice);
                let value = body(&mut evaluator, expr);
                Evaluation {
                    value,
                    warnings: evaluator.warnings,
                }
            }
            Err(error) => Evaluation {
                value: fallback,
                warnings: vec![parse_warning(source, error)],
            },
        }
    }

    pub fn evaluate_str(&self, source: &str, vars: &dyn VariableLookup) -> Evaluation<f64> {
        self.run(source, vars, DiceMode::Average, 0.0, |e, expr| e.eval(expr))
    }

    pub fn roll_str(&self, source: &str, vars: &dyn VariableLookup, rng: &mut dyn RngCore) -> Evaluation<f64> {
        self.run(source, vars, DiceMode::Roll(rng), 0.0, |e, expr| e.eval(expr))
    }

    /// Dice kept symbolic, variables substituted, like dice merged.
    pub fn format_str(&self, source: &str, vars: &dyn VariableLookup) -> Evaluation<String> {
        self.run(source, vars, DiceMode::Average, "0".to_string(), |e, expr| {
            match e.symbolic(expr) {
                Some(sum) => sum.to_string(),
                None => eval::substituted(expr, e),
            }
        })
    }

    /// The expression a formula reduces to once switch cases are decided.
    pub fn select_expression(&self, formula: &Formula, vars: &dyn VariableLookup) -> Evaluation<String> {
        match formula {
            Formula::Text(text) => Evaluation {
                value: text.clone(),
                warnings: Vec::new(),
            },
            Formula::Expression(f) => Evaluation {
                value: f.expression.clone(),
                warnings: Vec::new(),
            },
            Formula::Switch(switch) => {
                let mut warnings = Vec::new();
                let value = self.switch_value(&switch.switch_expression, vars, &mut warnings);
                let selected = switch
                    .cases
                    .iter()
                    .find(|case| case.matches(&value))
                    .map(|case| case.result_expression.clone())
                    .unwrap_or_else(|| switch.default_value.clone());
                Evaluation {
                    value: selected,
                    warnings,
                }
            }
        }
    }

    fn switch_value(
        &self,
        source: &str,
        vars: &dyn VariableLookup,
        warnings: &mut Vec<FormulaWarning>,
    ) -> SwitchValue {
        if let Ok(Expr::Variable(name)) = self.parse(source).as_ref() {
            if let Some(VariableValue::Text(text)) = vars.lookup(name) {
                return SwitchValue::Text(text.clone());
            }
        }
        let evaluation = self.evaluate_str(source, vars);
        warnings.extend(evaluation.warnings);
        SwitchValue::Number(evaluation.value)
    }

    pub fn evaluate(&self, formula: &Formula, vars: &dyn VariableLookup) -> Evaluation<f64> {
        let selected = self.select_expression(formula, vars);
        let mut result = self.evaluate_str(&selected.value, vars);
        result.warnings.splice(0..0, selected.warnings);
        result
    }

    pub fn roll(&self, formula: &Formula, vars: &dyn VariableLookup, rng: &mut dyn RngCore) -> Evaluation<f64> {
        let selected = self.select_expression(formula, vars);
        let mut result = self.roll_str(&selected.value, vars, rng);
        result.warnings.splice(0..0, selected.warnings);
        result
    }

    pub fn format(&self, formula: &Formula, vars: &dyn VariableLookup) -> Evaluation<String> {
        let selected = self.select_expression(formula, vars);
        let mut result = self.format_str(&selected.value, vars);
        result.warnings.splice(0..0, selected.warnings);
        result
    }
}

/// Evaluate a formula string. Dice count as their average.
pub fn evaluate_formula(formula: &str, vars: &dyn VariableLookup) -> Evaluation<f64> {
    FormulaCache::new().evaluate_str(formula, vars)
}

/// Render a formula for display, e.g. `"1d8 + @ability.strength.modifier"`
/// becomes `"1d8 + 3"`.
pub fn format_formula(formula: &str, vars: &dyn VariableLookup) -> Evaluation<String> {
    FormulaCache::new().format_str(formula, vars)
}

/// Evaluate a formula, rolling every die.
pub fn roll_formula(formula: &str, vars: &dyn VariableLookup, rng: &mut dyn RngCore) -> Evaluation<f64> {
    FormulaCache::new().roll_str(formula, vars, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DiceError;
    use crate::variables::SubstitutionIndex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn index(entries: &[(&str, f64)]) -> SubstitutionIndex {
        entries.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_arithmetic() {
        let result = evaluate_formula("2+3*4", &SubstitutionIndex::new());
        assert_eq!(result.value, 14.0);
        assert!(result.is_clean());
        assert_eq!(evaluate_formula("(2+3)*4", &SubstitutionIndex::new()).value, 20.0);
        assert_eq!(evaluate_formula("-3 + 10 / 4", &SubstitutionIndex::new()).value, -0.5);
    }

    #[test]
    fn test_variable_substitution() {
        let vars = index(&[("entity.level", 3.0)]);
        assert_eq!(evaluate_formula("@entity.level + 1", &vars).value, 4.0);
    }

    #[test]
    fn test_unknown_variable_is_zero_with_warning() {
        let result = evaluate_formula("@unknown.var", &SubstitutionIndex::new());
        assert_eq!(result.value, 0.0);
        assert_eq!(result.warnings, vec![FormulaWarning::UnknownVariable("unknown.var".into())]);
    }

    #[test]
    fn test_parse_error_is_zero_with_warning() {
        let result = evaluate_formula("2 +* 3", &SubstitutionIndex::new());
        assert_eq!(result.value, 0.0);
        assert!(matches!(result.warnings[0], FormulaWarning::Parse { .. }));
    }

    #[test]
    fn test_functions() {
        let vars = index(&[("level", 5.0)]);
        assert_eq!(evaluate_formula("floor(@level / 2)", &vars).value, 2.0);
        assert_eq!(evaluate_formula("ceil(@level / 2)", &vars).value, 3.0);
        assert_eq!(evaluate_formula("round(2.6)", &vars).value, 3.0);
        assert_eq!(evaluate_formula("abs(-4)", &vars).value, 4.0);
        assert_eq!(evaluate_formula("min(@level, 3)", &vars).value, 3.0);
        assert_eq!(evaluate_formula("max(1, @level, 2)", &vars).value, 5.0);
    }

    #[test]
    fn test_division_by_zero() {
        let result = evaluate_formula("4 / 0", &SubstitutionIndex::new());
        assert_eq!(result.value, 0.0);
        assert_eq!(result.warnings, vec![FormulaWarning::DivisionByZero]);
    }

    #[test]
    fn test_dice_average_is_deterministic() {
        assert_eq!(evaluate_formula("2d6 + 1", &SubstitutionIndex::new()).value, 8.0);
    }

    #[test]
    fn test_text_and_list_variables() {
        let mut vars = SubstitutionIndex::new();
        vars.set("school", VariableValue::Text("evocation".into()));
        vars.set("count", VariableValue::Text("4".into()));
        vars.set("tags", VariableValue::List(vec!["a".into(), "b".into()]));
        let result = evaluate_formula("@school", &vars);
        assert_eq!(result.value, 0.0);
        assert_eq!(result.warnings, vec![FormulaWarning::NonNumericVariable("school".into())]);
        assert_eq!(evaluate_formula("@count + 1", &vars).value, 5.0);
        assert_eq!(evaluate_formula("@tags", &vars).value, 2.0);
    }

    #[test]
    fn test_format_merges_dice() {
        let vars = index(&[("ability.strength.modifier", 3.0)]);
        let text = format_formula("1d8 + @ability.strength.modifier", &vars);
        assert_eq!(text.value, "1d8 + 3");
        assert_eq!(format_formula("1d6 + 1d6 + 2", &vars).value, "2d6 + 2");
        assert_eq!(format_formula("2d6 * 2", &vars).value, "4d6");
        assert_eq!(format_formula("1d6 + 1d8 + 3", &vars).value, "1d8 + 1d6 + 3");
    }

    #[test]
    fn test_format_computed_dice_count() {
        let vars = index(&[("customVariable.sneakAttackDice", 3.0)]);
        assert_eq!(format_formula("(@customVariable.sneakAttackDice)d6", &vars).value, "3d6");
    }

    #[test]
    fn test_format_non_linear_falls_back_to_substitution() {
        let vars = index(&[("x", 2.0)]);
        assert_eq!(format_formula("1d6 / @x", &vars).value, "(1d6 / 2)");
    }

    #[test]
    fn test_roll_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let vars = SubstitutionIndex::new();
        for _ in 0..100 {
            let value = roll_formula("2d6 + 1", &vars, &mut rng).value;
            assert!((3.0..=13.0).contains(&value));
        }
    }

    #[test]
    fn test_huge_dice_formulas_warn_instead_of_overflowing() {
        let vars = SubstitutionIndex::new();
        let scaled = format_formula("1d6*3037000500*3037000500", &vars);
        assert!(scaled
            .warnings
            .iter()
            .any(|w| matches!(w, FormulaWarning::InvalidDice(DiceError::ScaleOverflow(_)))));
        assert!(!scaled.value.is_empty());

        let mut rng = StdRng::seed_from_u64(5);
        let rolled = roll_formula("100000000d6", &vars, &mut rng);
        assert_eq!(rolled.value, 0.0);
        assert!(matches!(
            rolled.warnings[0],
            FormulaWarning::InvalidDice(DiceError::TooManyDice(100_000_000))
        ));
    }

    #[test]
    fn test_negative_dice_count_warns() {
        let result = evaluate_formula("(0 - 2)d6", &SubstitutionIndex::new());
        assert_eq!(result.value, 0.0);
        assert!(matches!(result.warnings[0], FormulaWarning::InvalidDice(_)));
    }

    #[test]
    fn test_switch_formula_numeric_cases() {
        let formula: Formula = serde_json::from_str(
            r#"{
                "type": "switch",
                "switchExpression": "@level",
                "cases": [
                    { "caseValue": 10, "operator": ">=", "resultExpression": "3" },
                    { "caseValue": 5, "operator": ">=", "resultExpression": "2" }
                ],
                "defaultValue": "1"
            }"#,
        )
        .unwrap();
        let cache = FormulaCache::new();
        assert_eq!(cache.evaluate(&formula, &index(&[("level", 12.0)])).value, 3.0);
        assert_eq!(cache.evaluate(&formula, &index(&[("level", 7.0)])).value, 2.0);
        assert_eq!(cache.evaluate(&formula, &index(&[("level", 1.0)])).value, 1.0);
    }

    #[test]
    fn test_switch_formula_text_cases() {
        let formula: Formula = serde_json::from_str(
            r#"{
                "type": "switch",
                "switchExpression": "@entity.size",
                "cases": [
                    { "caseValue": "large", "resultExpression": "2d6" },
                    { "caseValue": "large", "operator": ">", "resultExpression": "99" }
                ],
                "defaultValue": "1d8"
            }"#,
        )
        .unwrap();
        let cache = FormulaCache::new();
        let mut vars = SubstitutionIndex::new();
        vars.set("entity.size", VariableValue::Text("large".into()));
        assert_eq!(cache.format(&formula, &vars).value, "2d6");
        vars.set("entity.size", VariableValue::Text("medium".into()));
        assert_eq!(cache.format(&formula, &vars).value, "1d8");
    }

    #[test]
    fn test_formula_wire_forms() {
        let bare: Formula = serde_json::from_str(r#""1 + 2""#).unwrap();
        let object: Formula = serde_json::from_str(r#"{"expression": "1 + 2"}"#).unwrap();
        let cache = FormulaCache::new();
        let vars = SubstitutionIndex::new();
        assert_eq!(cache.evaluate(&bare, &vars).value, 3.0);
        assert_eq!(cache.evaluate(&object, &vars).value, 3.0);
    }

    #[test]
    fn test_cache_reuses_parse() {
        let cache = FormulaCache::new();
        let vars = SubstitutionIndex::new();
        cache.evaluate_str("1 + 1", &vars);
        cache.evaluate_str("1 + 1", &vars);
        cache.evaluate_str("bad +", &vars);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_variable_references() {
        let formula = Formula::expression("@customVariable.a + @level * 2");
        assert_eq!(formula.variable_references(), vec!["customVariable.a", "level"]);
    }
}
