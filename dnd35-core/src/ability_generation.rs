//! Ability score generation: 4d6 drop lowest, point buy, standard array.
//!
//! Rolling happens here, before a character is saved. The sheet
//! calculator only ever reads the resulting scores.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Method for determining ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbilityMethod {
    /// Standard array: 15, 14, 13, 12, 10, 8
    #[default]
    StandardArray,
    /// Point buy with a budget, scores 8-18
    PointBuy,
    /// Roll 4d6, drop lowest, six times
    Rolled,
    /// Scores entered directly
    Manual,
}

impl AbilityMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AbilityMethod::StandardArray => "Standard Array",
            AbilityMethod::PointBuy => "Point Buy",
            AbilityMethod::Rolled => "Rolled",
            AbilityMethod::Manual => "Manual",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AbilityMethod::StandardArray => "Assign 15, 14, 13, 12, 10, 8 to your abilities",
            AbilityMethod::PointBuy => "Spend 25 points to customize your scores (8-18 range)",
            AbilityMethod::Rolled => "Roll 4d6, drop the lowest die, six times",
            AbilityMethod::Manual => "Enter each score by hand",
        }
    }

    pub fn all() -> &'static [AbilityMethod] {
        &[
            AbilityMethod::StandardArray,
            AbilityMethod::PointBuy,
            AbilityMethod::Rolled,
            AbilityMethod::Manual,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbilityGenerationError {
    #[error("Score {0} is outside the point buy range (8-18)")]
    ScoreOutOfRange(u8),
    #[error("Total point cost {spent} exceeds the budget of {budget}")]
    BudgetExceeded { spent: u32, budget: u32 },
}

/// Standard array values.
pub const STANDARD_ARRAY: [u8; 6] = [15, 14, 13, 12, 10, 8];

pub const POINT_BUY_MIN: u8 = 8;
pub const POINT_BUY_MAX: u8 = 18;
pub const DEFAULT_POINT_BUY_BUDGET: u32 = 25;

/// Point buy cost of a score, or `None` outside 8-18.
pub fn point_buy_cost(score: u8) -> Option<u32> {
    match score {
        8 => Some(0),
        9 => Some(1),
        10 => Some(2),
        11 => Some(3),
        12 => Some(4),
        13 => Some(5),
        14 => Some(6),
        15 => Some(8),
        16 => Some(10),
        17 => Some(13),
        18 => Some(16),
        _ => None,
    }
}

/// Points needed to raise `score` by one. Zero at the cap.
pub fn point_buy_increment_cost(score: u8) -> u32 {
    match (point_buy_cost(score), point_buy_cost(score.saturating_add(1))) {
        (Some(current), Some(next)) if score < POINT_BUY_MAX => next - current,
        _ => 0,
    }
}

/// Points returned by lowering `score` by one. Zero at the floor.
pub fn point_buy_decrement_refund(score: u8) -> u32 {
    if score <= POINT_BUY_MIN {
        return 0;
    }
    match (point_buy_cost(score), point_buy_cost(score - 1)) {
        (Some(current), Some(previous)) => current - previous,
        _ => 0,
    }
}

/// Total cost of a set of scores.
pub fn calculate_point_buy_total(scores: &[u8]) -> Result<u32, AbilityGenerationError> {
    scores.iter().try_fold(0, |total, score| {
        point_buy_cost(*score)
            .map(|cost| total + cost)
            .ok_or(AbilityGenerationError::ScoreOutOfRange(*score))
    })
}

pub fn can_increment_point_buy(score: u8, spent: u32, budget: u32) -> bool {
    score < POINT_BUY_MAX && spent + point_buy_increment_cost(score) <= budget
}

pub fn can_decrement_point_buy(score: u8) -> bool {
    score > POINT_BUY_MIN
}

/// Check a full set of scores against a budget.
pub fn validate_point_buy(scores: &[u8], budget: u32) -> Result<u32, AbilityGenerationError> {
    let spent = calculate_point_buy_total(scores)?;
    if spent > budget {
        return Err(AbilityGenerationError::BudgetExceeded { spent, budget });
    }
    Ok(spent)
}

/// One 4d6-drop-lowest roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityRoll {
    pub all_rolls: [u8; 4],
    pub dropped: u8,
    pub kept: [u8; 3],
    pub total: u8,
}

/// Roll 4d6, drop lowest, for ability score generation.
pub fn roll_4d6_drop_lowest() -> AbilityRoll {
    roll_4d6_drop_lowest_with_rng(&mut rand::thread_rng())
}

pub fn roll_4d6_drop_lowest_with_rng<R: Rng>(rng: &mut R) -> AbilityRoll {
    let all_rolls: [u8; 4] = std::array::from_fn(|_| rng.gen_range(1..=6));
    let mut sorted = all_rolls;
    sorted.sort_unstable();
    let kept = [sorted[1], sorted[2], sorted[3]];
    AbilityRoll {
        all_rolls,
        dropped: sorted[0],
        kept,
        total: kept.iter().sum(),
    }
}

/// Roll a full set of six scores, in roll order.
pub fn generate_ability_score_set() -> [AbilityRoll; 6] {
    generate_ability_score_set_with_rng(&mut rand::thread_rng())
}

pub fn generate_ability_score_set_with_rng<R: Rng>(rng: &mut R) -> [AbilityRoll; 6] {
    std::array::from_fn(|_| roll_4d6_drop_lowest_with_rng(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_point_buy_totals() {
        assert_eq!(calculate_point_buy_total(&[8, 8, 8, 8, 8, 8]), Ok(0));
        assert_eq!(calculate_point_buy_total(&STANDARD_ARRAY), Ok(25));
        assert_eq!(calculate_point_buy_total(&[18; 6]), Ok(96));
        assert_eq!(
            calculate_point_buy_total(&[7, 10]),
            Err(AbilityGenerationError::ScoreOutOfRange(7))
        );
    }

    #[test]
    fn test_increment_and_decrement() {
        assert_eq!(point_buy_increment_cost(14), 2);
        assert_eq!(point_buy_increment_cost(17), 3);
        assert_eq!(point_buy_increment_cost(18), 0);
        assert_eq!(point_buy_decrement_refund(8), 0);
        assert_eq!(point_buy_decrement_refund(16), 2);

        assert!(!can_increment_point_buy(18, 0, 100));
        assert!(can_increment_point_buy(14, 23, 25));
        assert!(!can_increment_point_buy(15, 24, 25));
        assert!(!can_decrement_point_buy(8));
        assert!(can_decrement_point_buy(9));
    }

    #[test]
    fn test_validate_point_buy() {
        assert_eq!(validate_point_buy(&STANDARD_ARRAY, DEFAULT_POINT_BUY_BUDGET), Ok(25));
        assert!(matches!(
            validate_point_buy(&[18, 18, 8, 8, 8, 8], DEFAULT_POINT_BUY_BUDGET),
            Err(AbilityGenerationError::BudgetExceeded { spent: 32, budget: 25 })
        ));
    }

    #[test]
    fn test_roll_4d6_drop_lowest() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let roll = roll_4d6_drop_lowest_with_rng(&mut rng);
            assert!(roll.all_rolls.iter().all(|d| (1..=6).contains(d)));
            assert_eq!(roll.total, roll.kept.iter().sum::<u8>());
            assert!((3..=18).contains(&roll.total));
            assert!(roll.kept.iter().all(|k| roll.dropped <= *k));
        }
    }

    #[test]
    fn test_score_set_is_seed_deterministic() {
        let a = generate_ability_score_set_with_rng(&mut StdRng::seed_from_u64(42));
        let b = generate_ability_score_set_with_rng(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn test_methods() {
        assert_eq!(AbilityMethod::all().len(), 4);
        assert_eq!(AbilityMethod::default(), AbilityMethod::StandardArray);
        assert_eq!(AbilityMethod::PointBuy.name(), "Point Buy");
    }
}
