//! Aggregation strategies.
//!
//! Each strategy is a stateless implementation of [`AggregationStrategy`]:
//! the same [`ConsensusInput`] always produces the same [`ConsensusResult`].
//!
//! | Strategy | Rule |
//! |---|---|
//! | [`SimpleAverageStrategy`] | arithmetic mean |
//! | [`WeightedAverageStrategy`] | mean weighted by [`AgentReputation::weight`] |
//! | [`MedianStrategy`] | statistical median |
//! | [`TrimmedMeanStrategy`] | drop `floor(n * trim)` from each end, then mean |
//! | [`IterativeConvergenceStrategy`] | replay adjustments until variance settles |
//! | [`MajorityVotingStrategy`] | pass/fail vote around a threshold |
//! | [`DelphiMethodStrategy`] | weighted average of the last round |

use super::algorithm::{ConsensusAlgorithm, ConsensusParams};
use super::result::{ConsensusResult, ScoreMap, score_values};
use super::stats;
use crate::core::agent::AgentReputation;
use crate::core::error::ConsensusError;
use crate::core::ids::AgentId;
use crate::evaluation::message::{LoggedMessage, MessagePayload};
use std::collections::BTreeMap;

/// Reputation figures keyed by agent.
pub type ReputationMap = BTreeMap<AgentId, AgentReputation>;

static EMPTY_SCORES: ScoreMap = BTreeMap::new();
static EMPTY_REPUTATIONS: ReputationMap = BTreeMap::new();
static DEFAULT_PARAMS: ConsensusParams = ConsensusParams::DEFAULT;

/// Everything a strategy may look at.
///
/// Only `scores` is required; the other inputs default to empty and are read
/// by the strategies that need them (`weighted_average` and `delphi_method`
/// read reputations, `iterative_convergence` reads the adjustment history,
/// `delphi_method` reads per-round snapshots).
#[derive(Debug, Clone, Copy)]
pub struct ConsensusInput<'a> {
    /// Final per-agent scores.
    pub scores: &'a ScoreMap,
    pub reputations: &'a ReputationMap,
    /// Round 0 scores, the starting point for adjustment replay.
    pub initial_scores: &'a ScoreMap,
    /// Logged messages; non-adjustment entries are ignored.
    pub adjustments: &'a [LoggedMessage],
    /// Score snapshot after each round, oldest first.
    pub round_scores: &'a [ScoreMap],
    /// Highest round number replayed by `iterative_convergence`.
    pub max_rounds: u32,
    /// Discussion rounds actually run before aggregation.
    pub rounds_completed: u32,
    pub params: &'a ConsensusParams,
}

impl<'a> ConsensusInput<'a> {
    pub fn new(scores: &'a ScoreMap) -> Self {
        Self {
            scores,
            reputations: &EMPTY_REPUTATIONS,
            initial_scores: &EMPTY_SCORES,
            adjustments: &[],
            round_scores: &[],
            max_rounds: u32::MAX,
            rounds_completed: 0,
            params: &DEFAULT_PARAMS,
        }
    }

    pub fn with_reputations(mut self, reputations: &'a ReputationMap) -> Self {
        self.reputations = reputations;
        self
    }

    pub fn with_history(
        mut self,
        initial_scores: &'a ScoreMap,
        adjustments: &'a [LoggedMessage],
        max_rounds: u32,
    ) -> Self {
        self.initial_scores = initial_scores;
        self.adjustments = adjustments;
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_round_scores(mut self, round_scores: &'a [ScoreMap]) -> Self {
        self.round_scores = round_scores;
        self
    }

    pub fn with_rounds_completed(mut self, rounds: u32) -> Self {
        self.rounds_completed = rounds;
        self
    }

    pub fn with_params(mut self, params: &'a ConsensusParams) -> Self {
        self.params = params;
        self
    }

    /// Copy of this input aggregating `scores` instead (used for outlier re-runs).
    pub fn with_scores(mut self, scores: &'a ScoreMap) -> Self {
        self.scores = scores;
        self
    }
}

/// A named, pure aggregation function over per-agent scores.
pub trait AggregationStrategy: Send + Sync {
    /// The algorithm this strategy implements.
    fn algorithm(&self) -> ConsensusAlgorithm;

    /// Reduces the input to a single result.
    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError>;
}

fn require_scores(scores: &ScoreMap) -> Result<Vec<f64>, ConsensusError> {
    if scores.is_empty() {
        return Err(ConsensusError::EmptyScores);
    }
    Ok(score_values(scores))
}

/// Weighted mean of `scores` with reputation weights; agents with no
/// reputation on record use [`AgentReputation::neutral`]. Falls back to equal
/// weights when every weight is zero.
fn weighted_mean(scores: &ScoreMap, reputations: &ReputationMap) -> (f64, ScoreMap) {
    let mut weights: ScoreMap = scores
        .keys()
        .map(|id| {
            let reputation = reputations.get(id).copied().unwrap_or_default();
            (id.clone(), reputation.weight())
        })
        .collect();

    let mut total: f64 = weights.values().sum();
    if total <= 0.0 {
        weights.values_mut().for_each(|w| *w = 1.0);
        total = weights.len() as f64;
    }

    let weighted_sum: f64 = scores
        .iter()
        .map(|(id, score)| score * weights.get(id).copied().unwrap_or(0.0))
        .sum();

    (weighted_sum / total, weights)
}

/// Arithmetic mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAverageStrategy;

impl AggregationStrategy for SimpleAverageStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::SimpleAverage
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        let values = require_scores(input.scores)?;
        let mean = stats::mean(&values).ok_or(ConsensusError::EmptyScores)?;
        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            mean,
            input.scores.clone(),
            input.rounds_completed,
        ))
    }
}

/// Reputation-weighted mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedAverageStrategy;

impl AggregationStrategy for WeightedAverageStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::WeightedAverage
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        require_scores(input.scores)?;
        let (score, weights) = weighted_mean(input.scores, input.reputations);
        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            score,
            input.scores.clone(),
            input.rounds_completed,
        )
        .with_weights(weights))
    }
}

/// Statistical median.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianStrategy;

impl AggregationStrategy for MedianStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::Median
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        let values = require_scores(input.scores)?;
        let median = stats::median(&values).ok_or(ConsensusError::EmptyScores)?;
        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            median,
            input.scores.clone(),
            input.rounds_completed,
        ))
    }
}

/// Mean after dropping `floor(n * trim_fraction)` scores from each end.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimmedMeanStrategy;

impl AggregationStrategy for TrimmedMeanStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::TrimmedMean
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        let values = require_scores(input.scores)?;
        let trim = input.params.trim_fraction;
        if !(trim >= 0.0) {
            return Err(ConsensusError::InvalidParameter(format!(
                "trim_fraction must be non-negative, got {trim}"
            )));
        }

        let sorted = stats::sorted(&values);
        let n = sorted.len();
        let k = (n as f64 * trim).floor() as usize;
        if 2 * k >= n {
            return Err(ConsensusError::EverythingTrimmed {
                count: n,
                trim_fraction: trim,
            });
        }

        let kept = &sorted[k..n - k];
        let mean = stats::mean(kept).ok_or(ConsensusError::EmptyScores)?;
        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            mean,
            input.scores.clone(),
            input.rounds_completed,
        ))
    }
}

/// Replays adjustment messages round by round over the initial scores.
///
/// Adjustments are applied in `(round, sequence)` order. After each round the
/// variance across agents is checked, and replay stops as soon as it drops
/// below `iterative_variance_threshold`. `convergence_rounds` is the last
/// round replayed, not the cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterativeConvergenceStrategy;

impl AggregationStrategy for IterativeConvergenceStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::IterativeConvergence
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        let initial = if input.initial_scores.is_empty() {
            input.scores
        } else {
            input.initial_scores
        };
        require_scores(initial)?;

        let mut adjustments: Vec<(u32, u64, &AgentId, f64)> = input
            .adjustments
            .iter()
            .filter_map(|logged| match &logged.message.payload {
                MessagePayload::Adjustment { adjusted_score, .. }
                    if (1..=input.max_rounds).contains(&logged.message.round) =>
                {
                    Some((
                        logged.message.round,
                        logged.sequence.value(),
                        &logged.message.agent_id,
                        *adjusted_score,
                    ))
                }
                _ => None,
            })
            .collect();
        adjustments.sort_by_key(|(round, sequence, _, _)| (*round, *sequence));

        let last_round = adjustments.last().map(|(round, ..)| *round).unwrap_or(0);
        let mut current = initial.clone();
        let mut replayed = 0;

        for round in 1..=last_round {
            for (_, _, agent, score) in adjustments.iter().filter(|(r, ..)| *r == round) {
                if let Some(slot) = current.get_mut(*agent) {
                    *slot = *score;
                }
            }
            replayed = round;

            let variance = stats::population_variance(&score_values(&current));
            if variance < input.params.iterative_variance_threshold {
                break;
            }
        }

        let mean = stats::mean(&score_values(&current)).ok_or(ConsensusError::EmptyScores)?;
        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            mean,
            current,
            replayed,
        ))
    }
}

/// Pass/fail vote around `pass_threshold`.
///
/// A score at or above the threshold passes. The aggregate is
/// `threshold + 2` when passes strictly outnumber fails, else
/// `threshold - 2` (a tie fails), clamped to the score range. Confidence is
/// the size of the winning side over the total.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityVotingStrategy;

impl AggregationStrategy for MajorityVotingStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::MajorityVoting
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        let values = require_scores(input.scores)?;
        let threshold = input.params.pass_threshold;

        let passes = values.iter().filter(|s| **s >= threshold).count();
        let fails = values.len() - passes;

        let final_score = if passes > fails {
            threshold + 2.0
        } else {
            threshold - 2.0
        };
        let confidence = passes.max(fails) as f64 / values.len() as f64;

        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            final_score.clamp(0.0, 10.0),
            input.scores.clone(),
            input.rounds_completed,
        )
        .with_confidence(confidence))
    }
}

/// Weighted average over the last supplied round only; earlier rounds are
/// provenance. `convergence_rounds` is the number of rounds supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelphiMethodStrategy;

impl AggregationStrategy for DelphiMethodStrategy {
    fn algorithm(&self) -> ConsensusAlgorithm {
        ConsensusAlgorithm::DelphiMethod
    }

    fn aggregate(&self, input: &ConsensusInput<'_>) -> Result<ConsensusResult, ConsensusError> {
        let last = input
            .round_scores
            .last()
            .ok_or(ConsensusError::MissingRounds)?;
        require_scores(last)?;

        let (score, weights) = weighted_mean(last, input.reputations);
        Ok(ConsensusResult::from_scores(
            self.algorithm(),
            score,
            last.clone(),
            input.round_scores.len() as u32,
        )
        .with_weights(weights))
    }
}
