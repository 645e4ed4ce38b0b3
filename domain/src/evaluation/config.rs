//! Orchestrator configuration.

use crate::consensus::{ConsensusAlgorithm, ConsensusParams};
use crate::core::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for `round_timeout` (one day).
pub const MAX_ROUND_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// How a discussion round schedules its evaluator calls.
///
/// Either way every agent sees the score snapshot taken at the start of the
/// round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionMode {
    /// One agent at a time, updates applied as each call resolves
    #[default]
    Sequential,
    /// All agents at once, updates applied after the fan-out joins
    Concurrent,
}

impl DiscussionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscussionMode::Sequential => "sequential",
            DiscussionMode::Concurrent => "concurrent",
        }
    }
}

impl std::fmt::Display for DiscussionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DiscussionMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(DiscussionMode::Sequential),
            "concurrent" => Ok(DiscussionMode::Concurrent),
            _ => Err(ConfigurationError::UnknownDiscussionMode(s.to_string())),
        }
    }
}

/// Immutable per-session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on discussion rounds (0 disables the loop)
    pub max_discussion_rounds: u32,
    /// Bound on each scoring or discussion round
    pub round_timeout: Duration,
    pub consensus_algorithm: ConsensusAlgorithm,
    pub enable_discussion: bool,
    /// Variance below which the discussion loop exits early
    pub convergence_threshold: f64,
    pub outlier_detection: bool,
    pub discussion_mode: DiscussionMode,
    /// Score changes up to this size are not adjustments (exclusive)
    pub dead_band: f64,
    pub consensus: ConsensusParams,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_discussion_rounds: 3,
            round_timeout: Duration::from_secs(60),
            consensus_algorithm: ConsensusAlgorithm::default(),
            enable_discussion: true,
            convergence_threshold: 0.5,
            outlier_detection: false,
            discussion_mode: DiscussionMode::default(),
            dead_band: 0.1,
            consensus: ConsensusParams::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_algorithm(mut self, algorithm: ConsensusAlgorithm) -> Self {
        self.consensus_algorithm = algorithm;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_discussion_rounds = rounds;
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = timeout;
        self
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    pub fn with_discussion_mode(mut self, mode: DiscussionMode) -> Self {
        self.discussion_mode = mode;
        self
    }

    pub fn with_outlier_detection(mut self, enabled: bool) -> Self {
        self.outlier_detection = enabled;
        self
    }

    pub fn with_consensus_params(mut self, params: ConsensusParams) -> Self {
        self.consensus = params;
        self
    }

    pub fn without_discussion(mut self) -> Self {
        self.enable_discussion = false;
        self
    }

    /// Discussion rounds the session may run, as reported by progress.
    pub fn planned_rounds(&self) -> u32 {
        if self.enable_discussion {
            self.max_discussion_rounds
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.round_timeout.is_zero() || self.round_timeout > MAX_ROUND_TIMEOUT {
            return Err(ConfigurationError::out_of_range(
                "round_timeout",
                format!("{:?}", self.round_timeout),
                "0s < x <= 86400s",
            ));
        }
        if !(self.convergence_threshold >= 0.0) || !self.convergence_threshold.is_finite() {
            return Err(ConfigurationError::out_of_range(
                "convergence_threshold",
                self.convergence_threshold,
                "finite x >= 0.0",
            ));
        }
        if !(self.dead_band >= 0.0) || !self.dead_band.is_finite() {
            return Err(ConfigurationError::out_of_range(
                "dead_band",
                self.dead_band,
                "finite x >= 0.0",
            ));
        }
        self.consensus.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dead_band, 0.1);
        assert_eq!(config.planned_rounds(), 3);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = OrchestratorConfig::default().with_round_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::OutOfRange {
                field: "round_timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_unbounded_timeout_rejected() {
        let config =
            OrchestratorConfig::default().with_round_timeout(Duration::from_secs(u64::MAX));
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::OutOfRange {
                field: "round_timeout",
                ..
            })
        ));

        let config = OrchestratorConfig::default().with_round_timeout(MAX_ROUND_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_convergence_threshold_rejected() {
        let config = OrchestratorConfig::default().with_convergence_threshold(-0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nested_params_are_validated() {
        let params = ConsensusParams::default().with_pass_threshold(11.0);
        let config = OrchestratorConfig::default().with_consensus_params(params);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::OutOfRange {
                field: "pass_threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_planned_rounds_without_discussion() {
        let config = OrchestratorConfig::default().without_discussion();
        assert_eq!(config.planned_rounds(), 0);
    }

    #[test]
    fn test_discussion_mode_parse() {
        assert_eq!(
            "Concurrent".parse::<DiscussionMode>().unwrap(),
            DiscussionMode::Concurrent
        );
        assert!("parallel".parse::<DiscussionMode>().is_err());
    }
}
