//! Consensus algorithm selector and tuning parameters.

use crate::core::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Named aggregation strategy, selected at session configuration time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAlgorithm {
    /// Arithmetic mean
    #[default]
    SimpleAverage,
    /// Mean weighted by agent reputation
    WeightedAverage,
    /// Middle value (mean of the two middle values for even counts)
    Median,
    /// Mean after dropping a fraction of scores from each end
    TrimmedMean,
    /// Replays adjustment messages round by round until variance settles
    IterativeConvergence,
    /// Coarse pass/fail vote around a threshold
    MajorityVoting,
    /// Weighted average over the last round only
    DelphiMethod,
}

impl ConsensusAlgorithm {
    pub const ALL: [ConsensusAlgorithm; 7] = [
        ConsensusAlgorithm::SimpleAverage,
        ConsensusAlgorithm::WeightedAverage,
        ConsensusAlgorithm::Median,
        ConsensusAlgorithm::TrimmedMean,
        ConsensusAlgorithm::IterativeConvergence,
        ConsensusAlgorithm::MajorityVoting,
        ConsensusAlgorithm::DelphiMethod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusAlgorithm::SimpleAverage => "simple_average",
            ConsensusAlgorithm::WeightedAverage => "weighted_average",
            ConsensusAlgorithm::Median => "median",
            ConsensusAlgorithm::TrimmedMean => "trimmed_mean",
            ConsensusAlgorithm::IterativeConvergence => "iterative_convergence",
            ConsensusAlgorithm::MajorityVoting => "majority_voting",
            ConsensusAlgorithm::DelphiMethod => "delphi_method",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ConsensusAlgorithm::SimpleAverage => "Simple Average",
            ConsensusAlgorithm::WeightedAverage => "Weighted Average",
            ConsensusAlgorithm::Median => "Median",
            ConsensusAlgorithm::TrimmedMean => "Trimmed Mean",
            ConsensusAlgorithm::IterativeConvergence => "Iterative Convergence",
            ConsensusAlgorithm::MajorityVoting => "Majority Voting",
            ConsensusAlgorithm::DelphiMethod => "Delphi Method",
        }
    }
}

impl std::fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConsensusAlgorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ConsensusAlgorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == normalized)
            .ok_or_else(|| ConfigurationError::UnknownAlgorithm(s.to_string()))
    }
}

/// Tuning knobs for the individual strategies and for outlier detection.
///
/// `iterative_variance_threshold` is independent of the
/// orchestrator's own `convergence_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Fraction dropped from each end by `trimmed_mean`, in `[0, 0.5)`.
    pub trim_fraction: f64,
    /// Pass/fail boundary for `majority_voting`, in `[0, 10]`.
    pub pass_threshold: f64,
    /// Variance below which `iterative_convergence` stops replaying.
    pub iterative_variance_threshold: f64,
    /// |z-score| above which a score is flagged as an outlier.
    pub outlier_z_threshold: f64,
}

impl ConsensusParams {
    pub const DEFAULT: ConsensusParams = ConsensusParams {
        trim_fraction: 0.2,
        pass_threshold: 5.0,
        iterative_variance_threshold: 0.5,
        outlier_z_threshold: 2.0,
    };

    pub fn with_trim_fraction(mut self, trim: f64) -> Self {
        self.trim_fraction = trim;
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn with_iterative_variance_threshold(mut self, threshold: f64) -> Self {
        self.iterative_variance_threshold = threshold;
        self
    }

    pub fn with_outlier_z_threshold(mut self, threshold: f64) -> Self {
        self.outlier_z_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..0.5).contains(&self.trim_fraction) {
            return Err(ConfigurationError::out_of_range(
                "trim_fraction",
                self.trim_fraction,
                "0.0 <= x < 0.5",
            ));
        }
        if !(0.0..=10.0).contains(&self.pass_threshold) {
            return Err(ConfigurationError::out_of_range(
                "pass_threshold",
                self.pass_threshold,
                "0.0 <= x <= 10.0",
            ));
        }
        if !(self.iterative_variance_threshold > 0.0) {
            return Err(ConfigurationError::out_of_range(
                "iterative_variance_threshold",
                self.iterative_variance_threshold,
                "x > 0.0",
            ));
        }
        if !(self.outlier_z_threshold > 0.0) {
            return Err(ConfigurationError::out_of_range(
                "outlier_z_threshold",
                self.outlier_z_threshold,
                "x > 0.0",
            ));
        }
        Ok(())
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}
