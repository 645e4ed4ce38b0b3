//! Orchestrator configuration from TOML (`[orchestrator]` section)
//!
//! Example configuration:
//!
//! ```toml
//! [orchestrator]
//! consensus_algorithm = "trimmed_mean"
//! max_discussion_rounds = 5
//! round_timeout_secs = 30
//! convergence_threshold = 0.5
//! discussion_mode = "concurrent"
//! outlier_detection = true
//!
//! [orchestrator.consensus]
//! trim_fraction = 0.1
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tribunal_domain::{
    ConfigurationError, ConsensusAlgorithm, ConsensusParams, DiscussionMode, OrchestratorConfig,
};

/// Raw orchestrator configuration from TOML
///
/// Enum-valued options stay strings here so that a typo is reported as a
/// [`ConfigurationError`] naming the valid values, not a TOML parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOrchestratorConfig {
    pub consensus_algorithm: String,
    pub max_discussion_rounds: u32,
    pub round_timeout_secs: u64,
    pub enable_discussion: bool,
    pub convergence_threshold: f64,
    pub outlier_detection: bool,
    /// "sequential" or "concurrent"
    pub discussion_mode: String,
    pub dead_band: f64,
    pub consensus: ConsensusParams,
}

impl Default for FileOrchestratorConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            consensus_algorithm: defaults.consensus_algorithm.as_str().to_string(),
            max_discussion_rounds: defaults.max_discussion_rounds,
            round_timeout_secs: defaults.round_timeout.as_secs(),
            enable_discussion: defaults.enable_discussion,
            convergence_threshold: defaults.convergence_threshold,
            outlier_detection: defaults.outlier_detection,
            discussion_mode: defaults.discussion_mode.as_str().to_string(),
            dead_band: defaults.dead_band,
            consensus: defaults.consensus,
        }
    }
}

impl FileOrchestratorConfig {
    /// Converts to a validated [`OrchestratorConfig`].
    pub fn to_orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigurationError> {
        let algorithm: ConsensusAlgorithm = self.consensus_algorithm.parse()?;
        let mode: DiscussionMode = self.discussion_mode.parse()?;

        let mut config = OrchestratorConfig::default()
            .with_algorithm(algorithm)
            .with_max_rounds(self.max_discussion_rounds)
            .with_round_timeout(Duration::from_secs(self.round_timeout_secs))
            .with_convergence_threshold(self.convergence_threshold)
            .with_discussion_mode(mode)
            .with_outlier_detection(self.outlier_detection)
            .with_consensus_params(self.consensus);
        config.dead_band = self.dead_band;
        if !self.enable_discussion {
            config = config.without_discussion();
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_convert_to_default_config() {
        let config = FileOrchestratorConfig::default()
            .to_orchestrator_config()
            .unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_deserialize_orchestrator_section() {
        let toml_str = r#"
[orchestrator]
consensus_algorithm = "trimmed-mean"
max_discussion_rounds = 5
round_timeout_secs = 30
discussion_mode = "concurrent"
outlier_detection = true

[orchestrator.consensus]
trim_fraction = 0.1
"#;
        let file: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        let config = file.orchestrator.to_orchestrator_config().unwrap();
        assert_eq!(config.consensus_algorithm, ConsensusAlgorithm::TrimmedMean);
        assert_eq!(config.max_discussion_rounds, 5);
        assert_eq!(config.round_timeout, Duration::from_secs(30));
        assert_eq!(config.discussion_mode, DiscussionMode::Concurrent);
        assert!(config.outlier_detection);
        assert_eq!(config.consensus.trim_fraction, 0.1);
        // Untouched parameters keep their defaults
        assert_eq!(config.consensus.pass_threshold, 5.0);
    }

    #[test]
    fn test_unknown_algorithm_is_configuration_error() {
        let file = FileOrchestratorConfig {
            consensus_algorithm: "mode".to_string(),
            ..Default::default()
        };
        assert_eq!(
            file.to_orchestrator_config(),
            Err(ConfigurationError::UnknownAlgorithm("mode".to_string()))
        );
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let file = FileOrchestratorConfig {
            round_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            file.to_orchestrator_config(),
            Err(ConfigurationError::OutOfRange { field: "round_timeout", .. })
        ));

        let mut file = FileOrchestratorConfig::default();
        file.consensus.trim_fraction = 0.5;
        assert!(file.to_orchestrator_config().is_err());
    }

    #[test]
    fn test_disabled_discussion() {
        let file = FileOrchestratorConfig {
            enable_discussion: false,
            ..Default::default()
        };
        let config = file.to_orchestrator_config().unwrap();
        assert!(!config.enable_discussion);
        assert_eq!(config.planned_rounds(), 0);
    }
}
