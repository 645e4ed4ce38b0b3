//! Strategy registry.
//!
//! [`ConsensusEngine`] maps each [`ConsensusAlgorithm`] to a registered
//! [`AggregationStrategy`]. Adding a strategy means registering a new
//! implementation; nothing branches on the algorithm name.

use super::algorithm::ConsensusAlgorithm;
use super::outlier::{OutlierReport, detect_outliers};
use super::result::ConsensusResult;
use super::strategy::{
    AggregationStrategy, ConsensusInput, DelphiMethodStrategy, IterativeConvergenceStrategy,
    MajorityVotingStrategy, MedianStrategy, SimpleAverageStrategy, TrimmedMeanStrategy,
    WeightedAverageStrategy,
};
use crate::core::error::ConsensusError;
use std::collections::HashMap;

/// Registry of aggregation strategies keyed by algorithm.
pub struct ConsensusEngine {
    strategies: HashMap<ConsensusAlgorithm, Box<dyn AggregationStrategy>>,
}

impl ConsensusEngine {
    /// An engine with no strategies registered.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// An engine with every built-in strategy registered.
    pub fn with_builtin_strategies() -> Self {
        let mut engine = Self::empty();
        engine.register(Box::new(SimpleAverageStrategy));
        engine.register(Box::new(WeightedAverageStrategy));
        engine.register(Box::new(MedianStrategy));
        engine.register(Box::new(TrimmedMeanStrategy));
        engine.register(Box::new(IterativeConvergenceStrategy));
        engine.register(Box::new(MajorityVotingStrategy));
        engine.register(Box::new(DelphiMethodStrategy));
        engine
    }

    /// Registers a strategy, replacing any previous one for the same algorithm.
    pub fn register(&mut self, strategy: Box<dyn AggregationStrategy>) {
        self.strategies.insert(strategy.algorithm(), strategy);
    }

    pub fn get(&self, algorithm: ConsensusAlgorithm) -> Option<&dyn AggregationStrategy> {
        self.strategies.get(&algorithm).map(|s| s.as_ref())
    }

    pub fn supports(&self, algorithm: ConsensusAlgorithm) -> bool {
        self.strategies.contains_key(&algorithm)
    }

    /// Registered algorithms, in declaration order.
    pub fn algorithms(&self) -> Vec<ConsensusAlgorithm> {
        let mut algorithms: Vec<_> = self.strategies.keys().copied().collect();
        algorithms.sort();
        algorithms
    }

    pub fn aggregate(
        &self,
        algorithm: ConsensusAlgorithm,
        input: &ConsensusInput<'_>,
    ) -> Result<ConsensusResult, ConsensusError> {
        self.get(algorithm)
            .ok_or(ConsensusError::UnknownStrategy(algorithm))?
            .aggregate(input)
    }

    /// Aggregates with outlier exclusion.
    ///
    /// Outliers are detected on `input.scores` using the input's
    /// `outlier_z_threshold`. When any are found and the clean set is
    /// non-empty, the strategy is re-run on the clean set and the excluded
    /// agents are recorded on the result. Strategies that read per-round
    /// snapshots see the clean set as the last round.
    pub fn aggregate_excluding_outliers(
        &self,
        algorithm: ConsensusAlgorithm,
        input: &ConsensusInput<'_>,
    ) -> Result<(ConsensusResult, OutlierReport), ConsensusError> {
        let report = detect_outliers(input.scores, input.params.outlier_z_threshold);
        if !report.has_outliers() || report.clean_scores.is_empty() {
            let result = self.aggregate(algorithm, input)?;
            return Ok((result, report));
        }

        let mut rounds: Vec<_> = input.round_scores.to_vec();
        if let Some(last) = rounds.last_mut() {
            *last = report.clean_scores.clone();
        }
        let clean_initial: super::result::ScoreMap = input
            .initial_scores
            .iter()
            .filter(|(id, _)| report.clean_scores.contains_key(*id))
            .map(|(id, s)| (id.clone(), *s))
            .collect();

        let clean_input = input
            .with_scores(&report.clean_scores)
            .with_history(&clean_initial, input.adjustments, input.max_rounds)
            .with_round_scores(&rounds);
        let result = self
            .aggregate(algorithm, &clean_input)?
            .with_excluded_agents(report.excluded.clone());
        Ok((result, report))
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::with_builtin_strategies()
    }
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("algorithms", &self.algorithms())
            .finish()
    }
}
