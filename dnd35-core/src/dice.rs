//! Dice pools and symbolic dice sums.
//!
//! Rolling lives here so the sheet calculator never touches an RNG: callers
//! roll explicitly and persist the result.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest pool a single dice term may roll, and the most kept pools a
/// dice sum may hold.
pub const MAX_DICE: u32 = 10_000;

/// Error type for dice parsing and rolling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(i64),
    #[error("Invalid dice count: {0}")]
    InvalidCount(i64),
    #[error("Cannot keep {keep} dice when only rolling {count}")]
    InvalidKeepCount { keep: u32, count: u32 },
    #[error("Too many dice: {0} (at most {MAX_DICE})")]
    TooManyDice(i64),
    #[error("Multiplying dice by {0} overflows")]
    ScaleOverflow(i64),
}

/// Dice that appear in the 3.5 rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D2,
    D3,
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D2 => 2,
            DieType::D3 => 3,
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            2 => Some(DieType::D2),
            3 => Some(DieType::D3),
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Keep only part of a rolled pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeepRule {
    Highest(u32),
    Lowest(u32),
}

impl fmt::Display for KeepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepRule::Highest(n) => write!(f, "kh{n}"),
            KeepRule::Lowest(n) => write!(f, "kl{n}"),
        }
    }
}

/// `count` dice with `sides` faces, optionally keeping a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicePool {
    pub count: u32,
    pub sides: u32,
    pub keep: Option<KeepRule>,
}

impl DicePool {
    /// Validate raw (possibly computed) count and sides.
    pub fn new(count: i64, sides: i64, keep: Option<KeepRule>) -> Result<Self, DiceError> {
        if count < 0 {
            return Err(DiceError::InvalidCount(count));
        }
        if count > i64::from(MAX_DICE) {
            return Err(DiceError::TooManyDice(count));
        }
        if sides < 1 {
            return Err(DiceError::InvalidDieSize(sides));
        }
        let count = u32::try_from(count).map_err(|_| DiceError::InvalidCount(count))?;
        let sides = u32::try_from(sides).map_err(|_| DiceError::InvalidDieSize(sides))?;
        if let Some(KeepRule::Highest(keep) | KeepRule::Lowest(keep)) = keep {
            if keep > count {
                return Err(DiceError::InvalidKeepCount { keep, count });
            }
        }
        Ok(Self { count, sides, keep })
    }

    fn kept_count(&self) -> u32 {
        match self.keep {
            Some(KeepRule::Highest(n) | KeepRule::Lowest(n)) => n,
            None => self.count,
        }
    }

    /// Expected value of the pool, ignoring which dice a keep rule drops.
    pub fn average(&self) -> f64 {
        f64::from(self.kept_count()) * (f64::from(self.sides) + 1.0) / 2.0
    }

    pub fn minimum(&self) -> u32 {
        self.kept_count()
    }

    pub fn maximum(&self) -> u32 {
        self.kept_count().saturating_mul(self.sides)
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> PoolRoll {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();

        let mut kept = rolls.clone();
        match self.keep {
            Some(KeepRule::Highest(n)) => {
                kept.sort_by(|a, b| b.cmp(a));
                kept.truncate(n as usize);
            }
            Some(KeepRule::Lowest(n)) => {
                kept.sort();
                kept.truncate(n as usize);
            }
            None => {}
        }

        let total = kept.iter().fold(0u32, |acc, r| acc.saturating_add(*r));
        PoolRoll { rolls, kept, total }
    }

    pub fn roll(&self) -> PoolRoll {
        self.roll_with_rng(&mut rand::thread_rng())
    }
}

impl fmt::Display for DicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        if let Some(keep) = self.keep {
            write!(f, "{keep}")?;
        }
        Ok(())
    }
}

/// Result of rolling a [`DicePool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRoll {
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub total: u32,
}

/// A sum of dice and a flat modifier, such as `2d6 + 1d4 + 3`.
///
/// Like dice are merged. Pools with a keep rule are never merged since
/// `2d20kh1 + 2d20kh1` is not `4d20kh2`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiceSum {
    /// Signed dice count by number of sides.
    pub dice: BTreeMap<u32, i64>,
    pub kept_pools: Vec<DicePool>,
    pub constant: i64,
}

impl DiceSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: i64) -> Self {
        Self {
            constant: value,
            ..Self::default()
        }
    }

    pub fn add_pool(&mut self, pool: DicePool, sign: i64) {
        if pool.keep.is_some() && sign > 0 {
            self.kept_pools.push(pool);
        } else {
            let count = self.dice.entry(pool.sides).or_insert(0);
            *count = count.saturating_add(sign * i64::from(pool.count));
        }
    }

    pub fn add(&mut self, other: &DiceSum) {
        for (sides, count) in &other.dice {
            let total = self.dice.entry(*sides).or_insert(0);
            *total = total.saturating_add(*count);
        }
        self.kept_pools.extend(other.kept_pools.iter().copied());
        self.constant = self.constant.saturating_add(other.constant);
    }

    pub fn negate(&mut self) {
        for count in self.dice.values_mut() {
            *count = count.saturating_neg();
        }
        self.constant = self.constant.saturating_neg();
    }

    /// Multiply every die count and the constant (critical hits). Kept
    /// pools are repeated `factor` times. On error the sum is unchanged.
    pub fn scale(&mut self, factor: i64) -> Result<(), DiceError> {
        let overflow = || DiceError::ScaleOverflow(factor);
        let mut dice = self.dice.clone();
        for count in dice.values_mut() {
            *count = count.checked_mul(factor).ok_or_else(overflow)?;
        }
        let constant = self.constant.checked_mul(factor).ok_or_else(overflow)?;
        let repeats = usize::try_from(factor.max(0)).map_err(|_| overflow())?;
        if self.kept_pools.len().saturating_mul(repeats) > MAX_DICE as usize {
            return Err(overflow());
        }

        if !self.kept_pools.is_empty() {
            let pools = std::mem::take(&mut self.kept_pools);
            self.kept_pools = pools.iter().copied().cycle().take(pools.len() * repeats).collect();
        }
        self.dice = dice;
        self.constant = constant;
        Ok(())
    }

    pub fn has_dice(&self) -> bool {
        self.dice.values().any(|c| *c != 0) || !self.kept_pools.is_empty()
    }

    /// Parse plain `NdM + K` notation.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::InvalidNotation(notation));
        }

        let mut sum = DiceSum::new();
        let mut current = String::new();
        let mut sign: i64 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut sum)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, sign, &mut sum)?;
        }

        Ok(sum)
    }

    fn parse_term(s: &str, sign: i64, sum: &mut DiceSum) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(s.to_string());
        if let Some(d_pos) = s.find('d') {
            let count_str = &s[..d_pos];
            let count: i64 = if count_str.is_empty() {
                1
            } else {
                count_str.parse().map_err(|_| invalid())?
            };
            let sides: i64 = s[d_pos + 1..].parse().map_err(|_| invalid())?;
            sum.add_pool(DicePool::new(count, sides, None)?, sign);
        } else {
            let value: i64 = s.parse().map_err(|_| invalid())?;
            sum.constant += sign * value;
        }
        Ok(())
    }
}

impl FromStr for DiceSum {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceSum::parse(s)
    }
}

impl fmt::Display for DiceSum {
    /// Dice by descending sides, then kept pools, then the constant.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut terms: Vec<(bool, String)> = Vec::new();
        for (sides, count) in self.dice.iter().rev() {
            if *count != 0 {
                terms.push((*count < 0, format!("{}d{}", count.abs(), sides)));
            }
        }
        for pool in &self.kept_pools {
            terms.push((false, pool.to_string()));
        }
        if self.constant != 0 || terms.is_empty() {
            terms.push((self.constant < 0, self.constant.abs().to_string()));
        }

        for (i, (negative, text)) in terms.iter().enumerate() {
            match (i, negative) {
                (0, true) => write!(f, "-{text}")?,
                (0, false) => write!(f, "{text}")?,
                (_, true) => write!(f, " - {text}")?,
                (_, false) => write!(f, " + {text}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pool_validation() {
        assert!(DicePool::new(2, 6, None).is_ok());
        assert!(matches!(DicePool::new(-1, 6, None), Err(DiceError::InvalidCount(-1))));
        assert!(matches!(DicePool::new(1, 0, None), Err(DiceError::InvalidDieSize(0))));
        assert!(matches!(
            DicePool::new(2, 20, Some(KeepRule::Highest(3))),
            Err(DiceError::InvalidKeepCount { keep: 3, count: 2 })
        ));
    }

    #[test]
    fn test_roll_bounds() {
        let pool = DicePool::new(3, 6, None).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let roll = pool.roll_with_rng(&mut rng);
            assert_eq!(roll.rolls.len(), 3);
            assert!(roll.rolls.iter().all(|r| (1..=6).contains(r)));
            assert!((3..=18).contains(&roll.total));
        }
    }

    #[test]
    fn test_keep_highest() {
        let pool = DicePool::new(2, 20, Some(KeepRule::Highest(1))).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let roll = pool.roll_with_rng(&mut rng);
            assert_eq!(roll.kept.len(), 1);
            assert_eq!(roll.total, *roll.rolls.iter().max().unwrap());
        }
    }

    #[test]
    fn test_average() {
        assert_eq!(DicePool::new(2, 6, None).unwrap().average(), 7.0);
        assert_eq!(DicePool::new(1, 8, None).unwrap().average(), 4.5);
    }

    #[test]
    fn test_sum_merges_like_dice() {
        let sum = DiceSum::parse("1d6 + 1d6 + 2").unwrap();
        assert_eq!(sum.to_string(), "2d6 + 2");
    }

    #[test]
    fn test_sum_orders_by_sides() {
        let sum = DiceSum::parse("1d6 + 1d8 + 3").unwrap();
        assert_eq!(sum.to_string(), "1d8 + 1d6 + 3");
    }

    #[test]
    fn test_sum_negative_constant() {
        let sum = DiceSum::parse("1d4-1").unwrap();
        assert_eq!(sum.to_string(), "1d4 - 1");
        assert_eq!(DiceSum::constant(0).to_string(), "0");
    }

    #[test]
    fn test_scale_for_critical() {
        let mut sum = DiceSum::parse("1d8+4").unwrap();
        sum.scale(2).unwrap();
        assert_eq!(sum.to_string(), "2d8 + 8");

        let mut advantage = DiceSum::new();
        advantage.add_pool(DicePool::new(2, 20, Some(KeepRule::Highest(1))).unwrap(), 1);
        advantage.scale(2).unwrap();
        assert_eq!(advantage.to_string(), "2d20kh1 + 2d20kh1");
    }

    #[test]
    fn test_scale_overflow_leaves_sum_unchanged() {
        let mut sum = DiceSum::parse("1d6 + 1").unwrap();
        sum.scale(3_037_000_500).unwrap();
        assert_eq!(
            sum.scale(3_037_000_500),
            Err(DiceError::ScaleOverflow(3_037_000_500))
        );
        assert_eq!(sum.to_string(), "3037000500d6 + 3037000500");

        let mut kept = DiceSum::new();
        kept.add_pool(DicePool::new(2, 20, Some(KeepRule::Highest(1))).unwrap(), 1);
        assert!(kept.scale(i64::MAX).is_err());
        assert_eq!(kept.kept_pools.len(), 1);
    }

    #[test]
    fn test_pool_size_limits() {
        assert!(DicePool::new(i64::from(MAX_DICE), 6, None).is_ok());
        assert_eq!(
            DicePool::new(i64::from(MAX_DICE) + 1, 6, None),
            Err(DiceError::TooManyDice(10_001))
        );
        let huge = DicePool::new(2, i64::from(u32::MAX), None).unwrap();
        assert_eq!(huge.maximum(), u32::MAX);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(huge.roll_with_rng(&mut rng).total >= 2);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(DiceSum::parse("").is_err());
        assert!(DiceSum::parse("2dx").is_err());
    }
}
