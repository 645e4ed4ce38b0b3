//! Z-score outlier detection.
//!
//! Advisory only: the caller decides whether to aggregate the clean set.

use super::result::{ScoreMap, score_values};
use super::stats;
use crate::core::ids::AgentId;

/// Outcome of outlier detection over one score set.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    /// Scores whose |z| stayed below the threshold.
    pub clean_scores: ScoreMap,
    /// Agents whose |z| reached the threshold, in agent-id order.
    pub excluded: Vec<AgentId>,
}

impl OutlierReport {
    pub fn has_outliers(&self) -> bool {
        !self.excluded.is_empty()
    }

    pub fn is_outlier(&self, agent: &AgentId) -> bool {
        self.excluded.contains(agent)
    }
}

/// Flags every score whose population z-score magnitude is at least
/// `z_threshold`.
///
/// A set with zero spread has no outliers.
pub fn detect_outliers(scores: &ScoreMap, z_threshold: f64) -> OutlierReport {
    let values = score_values(scores);
    let std_dev = stats::std_dev(&values);
    let Some(mean) = stats::mean(&values).filter(|_| std_dev > 0.0) else {
        return OutlierReport {
            clean_scores: scores.clone(),
            excluded: Vec::new(),
        };
    };

    let (excluded, clean): (Vec<_>, Vec<_>) = scores
        .iter()
        .map(|(id, score)| (id.clone(), *score))
        .partition(|(_, score)| ((score - mean) / std_dev).abs() >= z_threshold);

    OutlierReport {
        clean_scores: clean.into_iter().collect(),
        excluded: excluded.into_iter().map(|(id, _)| id).collect(),
    }
}
