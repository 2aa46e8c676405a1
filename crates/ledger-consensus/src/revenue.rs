//! Epoch revenue
//!
//! Each epoch issues `ISSUANCE_RATE` new energy. Computors scoring at or
//! above the quorum-th highest score earn a full `ISSUANCE_RATE / N`; the
//! rest earn proportionally less, and whatever is left goes to the
//! arbitrator.

use crate::config::RevenueModel;
use crate::revenue_points::REVENUE_POINTS;
use ledger_core::params::ISSUANCE_RATE;

/// Divisor applied to scores too large to multiply by the per-computor issuance
const SCALING_FACTOR: u64 = 208_100;

/// Full-share value of one factor in the three-factor model
const FACTOR_SCALE: u128 = 1024;

/// Revenue points of a tick that executed `transactions` transactions
pub fn revenue_points(transactions: usize) -> u64 {
    REVENUE_POINTS[transactions.min(REVENUE_POINTS.len() - 1)]
}

/// The `quorum`-th highest score, at least 1
pub fn quorum_score(scores: &[u64], quorum: usize) -> u64 {
    let mut sorted = scores.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
        .get(quorum.saturating_sub(1))
        .copied()
        .unwrap_or(0)
        .max(1)
}

/// Inputs gathered over an epoch, indexed by computor
#[derive(Debug, Clone, Default)]
pub struct EpochScores {
    /// Revenue points of the ticks each computor led
    pub transaction_points: Vec<u64>,
    /// Ticks each computor voted on in agreement
    pub votes: Vec<u64>,
    /// Custom mining scores; all zero means the factor is not used
    pub custom: Vec<u64>,
}

/// Revenue owed for one epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueDistribution {
    /// Revenue of each computor
    pub computors: Vec<i64>,
    /// Remainder paid to the arbitrator
    pub arbitrator: i64,
}

/// Split one epoch's issuance under `model`
pub fn compute_revenue(model: RevenueModel, scores: &EpochScores, quorum: usize) -> RevenueDistribution {
    let computors = match model {
        RevenueModel::TickScore => tick_score_revenue(&scores.transaction_points, &scores.votes, quorum),
        RevenueModel::ThreeFactor => {
            three_factor_revenue(&scores.transaction_points, &scores.votes, &scores.custom, quorum)
        }
    };
    let paid: i64 = computors.iter().sum();
    RevenueDistribution {
        computors,
        arbitrator: ISSUANCE_RATE - paid,
    }
}

fn issuance_per_computor(computors: usize) -> u64 {
    (ISSUANCE_RATE as u64) / computors.max(1) as u64
}

/// Transaction points multiplied by agreeing votes, paid relative to the
/// quorum-th highest product
pub fn tick_score_revenue(transaction_points: &[u64], votes: &[u64], quorum: usize) -> Vec<i64> {
    let scores: Vec<u64> = transaction_points
        .iter()
        .zip(votes)
        .map(|(points, votes)| points.checked_mul(*votes).unwrap_or(u64::MAX))
        .collect();
    let threshold = quorum_score(&scores, quorum);
    let per_computor = issuance_per_computor(scores.len());
    let scaling_threshold = u64::MAX / per_computor.max(1);

    scores
        .iter()
        .map(|&score| {
            let revenue = if score >= threshold {
                per_computor
            } else if score > scaling_threshold {
                let scaled = u128::from(per_computor) * u128::from(score / SCALING_FACTOR) / u128::from(threshold);
                (scaled * u128::from(SCALING_FACTOR)) as u64
            } else {
                per_computor * score / threshold
            };
            revenue.min(per_computor) as i64
        })
        .collect()
}

fn factors(scores: &[u64], quorum: usize) -> Vec<u128> {
    if scores.iter().all(|s| *s == 0) {
        return vec![FACTOR_SCALE; scores.len()];
    }
    let threshold = quorum_score(scores, quorum);
    scores
        .iter()
        .map(|&score| {
            if score == 0 {
                0
            } else if score >= threshold {
                FACTOR_SCALE
            } else {
                FACTOR_SCALE * u128::from(score) / u128::from(threshold)
            }
        })
        .collect()
}

/// Transaction, vote and custom factors each scaled to `[0, 1024]`, then
/// multiplied. A factor whose scores are all zero counts as full.
pub fn three_factor_revenue(transaction_points: &[u64], votes: &[u64], custom: &[u64], quorum: usize) -> Vec<i64> {
    let count = transaction_points.len();
    let per_computor = u128::from(issuance_per_computor(count));
    let tx = factors(transaction_points, quorum);
    let vote = factors(votes, quorum);
    let custom = if custom.len() == count {
        factors(custom, quorum)
    } else {
        vec![FACTOR_SCALE; count]
    };

    (0..count)
        .map(|i| {
            let revenue =
                tx[i] * vote.get(i).copied().unwrap_or(0) * custom[i] * per_computor / (FACTOR_SCALE * FACTOR_SCALE * FACTOR_SCALE);
            revenue as i64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_saturate_at_table_end() {
        assert_eq!(revenue_points(0), REVENUE_POINTS[0]);
        assert_eq!(revenue_points(5000), REVENUE_POINTS[1024]);
    }

    #[test]
    fn test_quorum_score_has_floor_of_one() {
        assert_eq!(quorum_score(&[0, 0, 0], 2), 1);
        assert_eq!(quorum_score(&[5, 9, 1, 7], 3), 5);
    }

    #[test]
    fn test_top_scorers_earn_full_share() {
        let points = vec![10, 10, 10, 5];
        let votes = vec![1, 1, 1, 1];
        let revenue = tick_score_revenue(&points, &votes, 3);
        let share = ISSUANCE_RATE / 4;
        assert_eq!(revenue, vec![share, share, share, share / 2]);

        let distribution = compute_revenue(
            RevenueModel::TickScore,
            &EpochScores {
                transaction_points: points,
                votes,
                custom: Vec::new(),
            },
            3,
        );
        assert_eq!(distribution.arbitrator, ISSUANCE_RATE - 3 * share - share / 2);
    }

    #[test]
    fn test_zero_votes_earn_nothing() {
        let revenue = tick_score_revenue(&[10, 10, 10], &[1, 1, 0], 2);
        assert_eq!(revenue[2], 0);
    }

    #[test]
    fn test_huge_scores_do_not_overflow() {
        let revenue = tick_score_revenue(&[u64::MAX, u64::MAX / 2, 1], &[2, 1, 1], 1);
        let share = ISSUANCE_RATE / 3;
        assert_eq!(revenue[0], share);
        assert!(revenue[1] > 0 && revenue[1] <= share);
    }

    #[test]
    fn test_three_factor_multiplies_factors() {
        let revenue = three_factor_revenue(&[4, 4, 2], &[8, 4, 8], &[], 2);
        let share = ISSUANCE_RATE / 3;
        assert_eq!(revenue[0], share);
        assert_eq!(revenue[1], share / 2);
        assert_eq!(revenue[2], share / 2);

        let revenue = three_factor_revenue(&[4, 4], &[4, 4], &[0, 3], 1);
        assert_eq!(revenue[0], 0);
    }
}
