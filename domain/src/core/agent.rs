//! Participating judge agents and their reputation figures.

use super::error::ConfigurationError;
use super::ids::AgentId;
use serde::{Deserialize, Serialize};

/// Reputation figures for an agent, owned by the storage layer and read
/// here as weighting input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentReputation {
    /// Mean rating received for past judgments, in `[0, 10]`.
    pub average_rating: f64,
    /// Number of judgments completed so far.
    pub completed_judgments: u64,
    /// Fraction of judgments completed successfully, in `[0, 1]`.
    pub success_rate: f64,
}

impl AgentReputation {
    pub fn new(average_rating: f64, completed_judgments: u64, success_rate: f64) -> Self {
        Self {
            average_rating,
            completed_judgments,
            success_rate,
        }
    }

    /// Reputation assumed for agents with no history on record.
    pub fn neutral() -> Self {
        Self::new(5.0, 0, 1.0)
    }

    /// Rejects figures that are not finite or fall outside their ranges.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=10.0).contains(&self.average_rating) {
            return Err(ConfigurationError::out_of_range(
                "average_rating",
                self.average_rating,
                "0 <= x <= 10",
            ));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(ConfigurationError::out_of_range(
                "success_rate",
                self.success_rate,
                "0 <= x <= 1",
            ));
        }
        Ok(())
    }

    /// Aggregation weight:
    /// `(average_rating / 10) * (1 + ln(completed_judgments + 1) / 5) * success_rate`.
    ///
    /// Inputs are clamped to their documented ranges, so the weight is never
    /// negative. A NaN figure gives a weight of zero.
    pub fn weight(&self) -> f64 {
        if self.average_rating.is_nan() || self.success_rate.is_nan() {
            return 0.0;
        }
        let rating = self.average_rating.clamp(0.0, 10.0) / 10.0;
        let experience = 1.0 + ((self.completed_judgments as f64) + 1.0).ln() / 5.0;
        let success = self.success_rate.clamp(0.0, 1.0);
        rating * experience * success
    }
}

impl Default for AgentReputation {
    fn default() -> Self {
        Self::neutral()
    }
}

/// A judge participating in an evaluation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<AgentReputation>,
}

impl AgentProfile {
    pub fn new(id: impl Into<AgentId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            reputation: None,
        }
    }

    pub fn with_reputation(mut self, reputation: AgentReputation) -> Self {
        self.reputation = Some(reputation);
        self
    }

    pub fn reputation_or_neutral(&self) -> AgentReputation {
        self.reputation.unwrap_or_default()
    }
}
