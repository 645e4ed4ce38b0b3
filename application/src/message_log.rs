//! Message Log
//!
//! Typed adapter over a [`LogBackend`]: messages are encoded as JSON on
//! append and decoded on every read path. Subscriptions are delivered on a
//! bounded channel fed by a dedicated task and stop when their
//! [`CancellationToken`] fires.

use crate::ports::log_backend::{LogBackend, LogError, LogRecord};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tribunal_domain::{
    AgentId, AgentMessage, LogHandle, LogMetadata, LoggedMessage, MessageKind, SequenceNumber,
    SessionId,
};

/// Default capacity of a subscription's delivery channel.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// Predicate over log messages; empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    round: Option<u32>,
    kinds: Vec<MessageKind>,
    agent: Option<AgentId>,
}

impl MessageFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    /// Adds `kind` to the accepted kinds.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn for_agent(mut self, agent: AgentId) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn matches(&self, message: &AgentMessage) -> bool {
        self.round.is_none_or(|round| message.round == round)
            && (self.kinds.is_empty() || self.kinds.contains(&message.kind()))
            && self
                .agent
                .as_ref()
                .is_none_or(|agent| &message.agent_id == agent)
    }
}

/// Half-open interval `[start, end)` over message timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at < end)
    }
}

/// Live feed of matching messages.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// stops the delivery task.
pub struct Subscription {
    receiver: mpsc::Receiver<LoggedMessage>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next message, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<LoggedMessage> {
        self.receiver.recv().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn unsubscribe(self) {
        self.cancel.cancel();
    }
}

impl Stream for Subscription {
    type Item = LoggedMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Serialize)]
struct LogMemo<'a> {
    session_id: &'a SessionId,
    #[serde(flatten)]
    metadata: &'a LogMetadata,
}

fn decode(record: &LogRecord) -> Result<AgentMessage, serde_json::Error> {
    serde_json::from_slice(&record.payload)
}

/// Per-session append-only message log.
#[derive(Clone)]
pub struct MessageLog {
    backend: Arc<dyn LogBackend>,
    buffer: usize,
}

impl MessageLog {
    pub fn new(backend: Arc<dyn LogBackend>) -> Self {
        Self {
            backend,
            buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }

    pub fn with_subscription_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Allocates the log for a session. The topic is named after the session.
    pub async fn create_log(
        &self,
        session_id: &SessionId,
        metadata: &LogMetadata,
    ) -> Result<LogHandle, LogError> {
        let memo = serde_json::to_string(&LogMemo {
            session_id,
            metadata,
        })?;
        let handle = self.backend.create_topic(session_id.as_str(), &memo).await?;
        debug!("Created message log {} for session {}", handle, session_id);
        Ok(handle)
    }

    pub async fn append(
        &self,
        handle: &LogHandle,
        message: &AgentMessage,
    ) -> Result<SequenceNumber, LogError> {
        let payload = serde_json::to_vec(message)?;
        let sequence = self.backend.append(handle, payload).await?;
        debug!(
            "Appended {} from {} (round {}) to {} as {}",
            message.kind(),
            message.agent_id,
            message.round,
            handle,
            sequence
        );
        Ok(sequence)
    }

    /// Appends and returns the message as it will be read back.
    pub async fn append_logged(
        &self,
        handle: &LogHandle,
        message: AgentMessage,
    ) -> Result<LoggedMessage, LogError> {
        let sequence = self.append(handle, &message).await?;
        Ok(LoggedMessage::new(sequence, message))
    }

    /// Delivers every message matching `filter`, starting from the first
    /// message in the log when `replay_from_start` is set, otherwise from the
    /// next append.
    ///
    /// Records that fail to decode are logged and skipped.
    pub async fn subscribe(
        &self,
        handle: &LogHandle,
        filter: MessageFilter,
        replay_from_start: bool,
    ) -> Result<Subscription, LogError> {
        let since = replay_from_start.then_some(SequenceNumber(1));
        let mut records = self.backend.subscribe(handle, since).await?;
        let (tx, receiver) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let topic = handle.clone();

        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = token.cancelled() => break,
                    item = records.next() => item,
                };
                let record = match item {
                    Some(Ok(record)) => record,
                    Some(Err(e)) => {
                        warn!("Subscription to {} stopped: {}", topic, e);
                        break;
                    }
                    None => break,
                };
                let message = match decode(&record) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(
                            "Skipping undecodable record {} in {}: {}",
                            record.sequence, topic, e
                        );
                        continue;
                    }
                };
                if !filter.matches(&message) {
                    continue;
                }
                let logged = LoggedMessage::new(record.sequence, message);
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(logged) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Subscription to {} closed", topic);
        });

        Ok(Subscription { receiver, cancel })
    }

    /// Every decodable message in sequence order.
    pub async fn read_all(&self, handle: &LogHandle) -> Result<Vec<LoggedMessage>, LogError> {
        let records = self.backend.read(handle).await?;
        let mut messages: Vec<_> = records
            .iter()
            .filter_map(|record| match decode(record) {
                Ok(message) => Some(LoggedMessage::new(record.sequence, message)),
                Err(e) => {
                    warn!(
                        "Skipping undecodable record {} in {}: {}",
                        record.sequence, handle, e
                    );
                    None
                }
            })
            .collect();
        messages.sort_by_key(|m| m.sequence);
        Ok(messages)
    }

    /// Messages whose timestamp falls in `range`, in sequence order.
    pub async fn query(
        &self,
        handle: &LogHandle,
        range: TimeRange,
    ) -> Result<Vec<LoggedMessage>, LogError> {
        Ok(self
            .read_all(handle)
            .await?
            .into_iter()
            .filter(|m| range.contains(m.message.timestamp))
            .collect())
    }
}
