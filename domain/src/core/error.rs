//! Domain error types

use crate::consensus::ConsensusAlgorithm;
use crate::evaluation::session::SessionPhase;
use thiserror::Error;

/// Errors raised by the consensus engine when a strategy receives input it
/// cannot aggregate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("No scores to aggregate")]
    EmptyScores,

    #[error("Trimming {trim_fraction} of {count} scores from each end leaves nothing to average")]
    EverythingTrimmed { count: usize, trim_fraction: f64 },

    #[error("Strategy requires at least one round of scores")]
    MissingRounds,

    #[error("No strategy registered for algorithm '{0}'")]
    UnknownStrategy(ConsensusAlgorithm),

    #[error("Invalid consensus parameter: {0}")]
    InvalidParameter(String),
}

/// Errors detected while validating a session's configuration.
///
/// These are fatal at session start: no phase is ever executed for a
/// session whose configuration fails validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error(
        "Unknown consensus algorithm: {0}. Valid: simple_average, weighted_average, median, trimmed_mean, iterative_convergence, majority_voting, delphi_method"
    )]
    UnknownAlgorithm(String),

    #[error("Unknown discussion mode: {0}. Valid: sequential, concurrent")]
    UnknownDiscussionMode(String),

    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("At least one participating agent is required")]
    NoParticipants,

    #[error("Agent '{0}' is listed more than once")]
    DuplicateParticipant(String),

    #[error("Agent id '{0}' is reserved")]
    ReservedParticipant(String),

    #[error("Content to evaluate is empty")]
    EmptyContent,
}

/// A phase change the session state machine does not allow.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Session cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl ConfigurationError {
    pub(crate) fn out_of_range(
        field: &'static str,
        value: impl std::fmt::Display,
        expected: &'static str,
    ) -> Self {
        ConfigurationError::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_trimmed_display() {
        let error = ConsensusError::EverythingTrimmed {
            count: 2,
            trim_fraction: 0.5,
        };
        assert!(error.to_string().contains("2 scores"));
    }

    #[test]
    fn test_out_of_range_display() {
        let error = ConfigurationError::out_of_range("trim_fraction", 0.7, "0.0 <= x < 0.5");
        assert_eq!(
            error.to_string(),
            "trim_fraction = 0.7 is out of range (expected 0.0 <= x < 0.5)"
        );
    }

    #[test]
    fn test_unknown_algorithm_lists_valid_names() {
        let error = ConfigurationError::UnknownAlgorithm("mode".to_string());
        assert!(error.to_string().contains("delphi_method"));
    }
}
