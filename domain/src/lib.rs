//! Domain layer for tribunal
//!
//! This crate contains the core evaluation types and the consensus
//! algorithms. It has no dependencies on infrastructure or presentation
//! concerns and performs no I/O.
//!
//! # Core Concepts
//!
//! ## Evaluation Session
//!
//! Several independent judge agents score a piece of content, optionally
//! revise their scores after seeing each other's, and the resulting scores
//! are reduced to one verdict:
//!
//! - **Independent scoring** (round 0): every agent scores alone
//! - **Discussion** (rounds 1..N): agents see peer scores and may adjust
//! - **Aggregation**: a [`ConsensusAlgorithm`] turns the scores into a [`ConsensusResult`]
//!
//! ## Message Log
//!
//! Every step is recorded as an immutable [`AgentMessage`]; the
//! [`Transcript`] is rebuilt from those messages for audit.

pub mod config;
pub mod consensus;
pub mod core;
pub mod evaluation;

pub use consensus::{
    AggregationStrategy, ConsensusAlgorithm, ConsensusEngine, ConsensusInput, ConsensusParams,
    ConsensusResult, OutlierReport, ReputationMap, ScoreMap, calculate_convergence,
    detect_outliers, score_values,
};
pub use config::OutputFormat;
pub use core::{
    agent::{AgentProfile, AgentReputation},
    error::{ConfigurationError, ConsensusError, InvalidTransition},
    ids::{AgentId, SessionId},
};
pub use evaluation::{
    AgentMessage, AgentResult, AgentScores, DiscussionMode, EvaluationProgress, EvaluationReport,
    EvaluationRequest, EvaluationRound, EvaluationSession, LogHandle, LogMetadata, LoggedMessage,
    MAX_ROUND_TIMEOUT, MessageKind, MessagePayload, OrchestratorConfig, SequenceNumber,
    SessionFailure, SessionPhase, Transcript, TranscriptRound, build_agent_results,
};
