//! Durable log backend port
//!
//! A topic-per-session, append-only byte log with sequence numbers. The
//! [`MessageLog`](crate::message_log::MessageLog) is a typed adapter over it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tribunal_domain::{LogHandle, SequenceNumber};

#[derive(Error, Debug)]
pub enum LogError {
    #[error("Append to '{topic}' rejected: {reason}")]
    AppendRejected { topic: String, reason: String },

    #[error("Log topic not found: {0}")]
    TopicNotFound(String),

    #[error("Log topic already exists: {0}")]
    TopicExists(String),

    #[error("Message encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Log backend error: {0}")]
    Backend(String),
}

/// One appended payload with the sequence number it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub sequence: SequenceNumber,
    pub payload: Vec<u8>,
}

/// Records of one topic in sequence order, never ending on its own.
pub type RecordStream = BoxStream<'static, Result<LogRecord, LogError>>;

/// Durable, ordered broadcast log.
///
/// Sequence numbers start at 1 and increase by one per append within a
/// topic. Appends from one caller are never reordered.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Allocates a new topic named `name`; `memo` is stored alongside it.
    async fn create_topic(&self, name: &str, memo: &str) -> Result<LogHandle, LogError>;

    async fn append(&self, topic: &LogHandle, payload: Vec<u8>)
    -> Result<SequenceNumber, LogError>;

    /// Streams records with sequence `>= since` followed by live appends, or
    /// only live appends when `since` is `None`. No record is delivered twice.
    async fn subscribe(
        &self,
        topic: &LogHandle,
        since: Option<SequenceNumber>,
    ) -> Result<RecordStream, LogError>;

    /// Every record currently in the topic.
    async fn read(&self, topic: &LogHandle) -> Result<Vec<LogRecord>, LogError>;

    /// The memo the topic was created with.
    async fn memo(&self, topic: &LogHandle) -> Result<String, LogError>;
}
