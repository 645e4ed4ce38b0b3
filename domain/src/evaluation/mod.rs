//! Evaluation sessions: configuration, log messages, reports and transcripts.

pub mod config;
pub mod message;
pub mod report;
pub mod session;
pub mod transcript;

pub use config::{DiscussionMode, MAX_ROUND_TIMEOUT, OrchestratorConfig};
pub use message::{AgentMessage, LoggedMessage, MessageKind, MessagePayload, SequenceNumber};
pub use report::{AgentResult, AgentScores, EvaluationReport, build_agent_results};
pub use session::{
    EvaluationProgress, EvaluationRequest, EvaluationRound, EvaluationSession, LogHandle,
    LogMetadata, SessionFailure, SessionPhase,
};
pub use transcript::{Transcript, TranscriptRound};
