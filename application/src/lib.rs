//! Application layer for tribunal
//!
//! This crate contains the ports, the message log adapter and the use cases
//! that drive an evaluation session. It depends only on the domain layer.

pub mod message_log;
pub mod ports;
pub mod use_cases;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use message_log::{MessageFilter, MessageLog, Subscription, TimeRange};
pub use ports::{
    clock::{Clock, ManualClock, SystemClock},
    evaluator::{DiscussionReply, Evaluation, EvaluationError, Evaluator, PeerScore},
    log_backend::{LogBackend, LogError, LogRecord, RecordStream},
    memory_log::InMemoryLogBackend,
    progress::{NoProgress, ProgressNotifier},
    session_store::{InMemorySessionStore, SessionStore, StoreError},
};
pub use use_cases::coordinator::{CoordinatorError, EvaluationCoordinator};
pub use use_cases::discussion_round::{
    DiscussionRoundDriver, DiscussionRoundError, DiscussionRoundInput, DiscussionRoundOutput,
};
pub use use_cases::run_evaluation::{RunEvaluationError, RunEvaluationUseCase};
