//! Numeric and symbolic evaluation of parsed formulas.

use super::parser::{BinaryOp, Expr, Function, Keep};
use crate::dice::{DiceError, DicePool, DiceSum, KeepRule};
use crate::formula::FormulaError;
use crate::variables::{VariableLookup, VariableValue};
use rand::RngCore;
use thiserror::Error;

/// Non-fatal problem encountered while evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaWarning {
    #[error("Unknown variable '@{0}' evaluated as 0")]
    UnknownVariable(String),
    #[error("Variable '@{0}' is not numeric; evaluated as 0")]
    NonNumericVariable(String),
    #[error("Division by zero evaluated as 0")]
    DivisionByZero,
    #[error("Invalid dice: {0}")]
    InvalidDice(#[from] DiceError),
    #[error("Could not parse formula '{formula}': {error}")]
    Parse { formula: String, error: FormulaError },
}

/// How dice terms turn into numbers.
pub enum DiceMode<'r> {
    /// Deterministic expected value.
    Average,
    Roll(&'r mut dyn RngCore),
}

pub(crate) struct Evaluator<'a, 'r> {
    vars: &'a dyn VariableLookup,
    dice: DiceMode<'r>,
    pub(crate) warnings: Vec<FormulaWarning>,
}

impl<'a, 'r> Evaluator<'a, 'r> {
    pub(crate) fn new(vars: &'a dyn VariableLookup, dice: DiceMode<'r>) -> Self {
        Self {
            vars,
            dice,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn variable(&mut self, name: &str) -> f64 {
        match self.vars.lookup(name) {
            None => {
                self.warnings.push(FormulaWarning::UnknownVariable(name.to_string()));
                0.0
            }
            Some(VariableValue::List(items)) => items.len() as f64,
            Some(value) => match value.as_number() {
                Some(n) => n,
                None => {
                    self.warnings
                        .push(FormulaWarning::NonNumericVariable(name.to_string()));
                    0.0
                }
            },
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> f64 {
        match expr {
            Expr::Number(n) => *n,
            Expr::Variable(name) => self.variable(name),
            Expr::Dice { count, sides, keep } => match self.pool(count, sides, *keep) {
                Some(pool) => match &mut self.dice {
                    DiceMode::Average => pool.average(),
                    DiceMode::Roll(rng) => f64::from(pool.roll_with_rng(rng).total),
                },
                None => 0.0,
            },
            Expr::Negate(inner) => -self.eval(inner),
            Expr::Binary { op, left, right } => {
                let l = self.eval(left);
                let r = self.eval(right);
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            self.warnings.push(FormulaWarning::DivisionByZero);
                            0.0
                        } else {
                            l / r
                        }
                    }
                }
            }
            Expr::Call { function, args } => {
                let values: Vec<f64> = args.iter().map(|a| self.eval(a)).collect();
                let first = values.first().copied().unwrap_or(0.0);
                match function {
                    Function::Floor => first.floor(),
                    Function::Ceil => first.ceil(),
                    Function::Round => first.round(),
                    Function::Abs => first.abs(),
                    Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                    Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                }
            }
        }
    }

    fn pool(&mut self, count: &Expr, sides: &Expr, keep: Option<Keep>) -> Option<DicePool> {
        let count = self.eval(count).floor() as i64;
        let sides = self.eval(sides).floor() as i64;
        let keep = keep.map(|k| {
            if k.highest {
                KeepRule::Highest(k.count)
            } else {
                KeepRule::Lowest(k.count)
            }
        });
        match DicePool::new(count, sides, keep) {
            Ok(pool) => Some(pool),
            Err(error) => {
                self.warnings.push(error.into());
                None
            }
        }
    }

    /// Reduce to a sum of dice plus a constant, or `None` when the formula
    /// multiplies or divides dice by something other than a constant.
    pub(crate) fn symbolic(&mut self, expr: &Expr) -> Option<DiceSum> {
        if !expr.contains_dice() {
            return Some(DiceSum::constant(self.eval(expr).floor() as i64));
        }
        match expr {
            Expr::Dice { count, sides, keep } => {
                let mut sum = DiceSum::new();
                if let Some(pool) = self.pool(count, sides, *keep) {
                    sum.add_pool(pool, 1);
                }
                Some(sum)
            }
            Expr::Negate(inner) => {
                let mut sum = self.symbolic(inner)?;
                sum.negate();
                Some(sum)
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    let mut sum = self.symbolic(left)?;
                    let mut rhs = self.symbolic(right)?;
                    if *op == BinaryOp::Sub {
                        rhs.negate();
                    }
                    sum.add(&rhs);
                    Some(sum)
                }
                BinaryOp::Mul => {
                    let (dice_side, factor_side) = if left.contains_dice() {
                        (left, right)
                    } else {
                        (right, left)
                    };
                    if factor_side.contains_dice() {
                        return None;
                    }
                    let factor = self.eval(factor_side);
                    if factor.fract() != 0.0 {
                        return None;
                    }
                    let mut sum = self.symbolic(dice_side)?;
                    if let Err(error) = sum.scale(factor as i64) {
                        self.warnings.push(error.into());
                        return None;
                    }
                    Some(sum)
                }
                BinaryOp::Div => None,
            },
            _ => None,
        }
    }
}

/// Render with variables replaced by their values, for formulas that do
/// not reduce to a dice sum.
pub(crate) fn substituted(expr: &Expr, eval: &mut Evaluator<'_, '_>) -> String {
    match expr {
        Expr::Variable(name) => {
            let value = eval.variable(name);
            if value.fract() == 0.0 {
                format!("{}", value as i64)
            } else {
                value.to_string()
            }
        }
        Expr::Number(_) => expr.to_string(),
        Expr::Dice { count, sides, keep } => {
            let mut text = format!("{}d{}", substituted(count, eval), substituted(sides, eval));
            if let Some(keep) = keep {
                text.push_str(if keep.highest { "kh" } else { "kl" });
                text.push_str(&keep.count.to_string());
            }
            text
        }
        Expr::Negate(inner) => format!("-{}", substituted(inner, eval)),
        Expr::Binary { op, left, right } => {
            let symbol = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
            };
            format!("({} {symbol} {})", substituted(left, eval), substituted(right, eval))
        }
        Expr::Call { function, args } => {
            let args: Vec<String> = args.iter().map(|a| substituted(a, eval)).collect();
            format!("{}({})", function.name(), args.join(", "))
        }
    }
}
