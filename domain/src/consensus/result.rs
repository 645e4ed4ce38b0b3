//! Consensus Engine output.

use super::algorithm::ConsensusAlgorithm;
use super::stats;
use crate::core::ids::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-agent scores. Ordered by agent id so iteration, and therefore every
/// floating-point reduction over it, is deterministic.
pub type ScoreMap = BTreeMap<AgentId, f64>;

/// Scores of a map, in agent-id order.
pub fn score_values(scores: &ScoreMap) -> Vec<f64> {
    scores.values().copied().collect()
}

/// Result of aggregating a set of scores under one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub final_score: f64,
    pub algorithm: ConsensusAlgorithm,
    /// The scores that fed the aggregate.
    pub individual_scores: ScoreMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<ScoreMap>,
    pub confidence: f64,
    pub variance: f64,
    /// Discussion rounds that contributed to this result.
    pub convergence_rounds: u32,
    /// Agents left out as outliers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_agents: Vec<AgentId>,
}

impl ConsensusResult {
    /// Builds a result whose variance and confidence are derived from the
    /// individual scores.
    pub fn from_scores(
        algorithm: ConsensusAlgorithm,
        final_score: f64,
        individual_scores: ScoreMap,
        convergence_rounds: u32,
    ) -> Self {
        let variance = stats::population_variance(&score_values(&individual_scores));
        Self {
            final_score,
            algorithm,
            individual_scores,
            weights: None,
            confidence: stats::confidence_from_variance(variance),
            variance,
            convergence_rounds,
            excluded_agents: Vec::new(),
        }
    }

    pub fn with_weights(mut self, weights: ScoreMap) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_excluded_agents(mut self, excluded: Vec<AgentId>) -> Self {
        self.excluded_agents = excluded;
        self
    }

    pub fn agent_count(&self) -> usize {
        self.individual_scores.len()
    }

    /// Signed distance of an agent's score from the aggregate.
    pub fn deviation_of(&self, agent: &AgentId) -> Option<f64> {
        self.individual_scores
            .get(agent)
            .map(|score| score - self.final_score)
    }
}
