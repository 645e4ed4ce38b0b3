//! Consensus Engine: pure aggregation of per-agent scores.

pub mod algorithm;
pub mod outlier;
pub mod registry;
pub mod result;
pub mod stats;
pub mod strategy;

pub use algorithm::{ConsensusAlgorithm, ConsensusParams};
pub use outlier::{OutlierReport, detect_outliers};
pub use registry::ConsensusEngine;
pub use result::{ConsensusResult, ScoreMap, score_values};
pub use stats::calculate_convergence;
pub use strategy::{
    AggregationStrategy, ConsensusInput, DelphiMethodStrategy, IterativeConvergenceStrategy,
    MajorityVotingStrategy, MedianStrategy, ReputationMap, SimpleAverageStrategy,
    TrimmedMeanStrategy, WeightedAverageStrategy,
};
