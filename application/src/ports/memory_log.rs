//! In-memory [`LogBackend`] for tests and single-process use.
//!
//! Each topic keeps its records in a vector and publishes the latest
//! sequence number on a `watch` channel. Subscribers read from the vector and
//! wait on the channel once caught up, so a slow subscriber never blocks
//! appends and never misses or repeats a record.

use super::log_backend::{LogBackend, LogError, LogRecord, RecordStream};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tribunal_domain::{LogHandle, SequenceNumber};

struct Topic {
    memo: String,
    records: RwLock<Vec<LogRecord>>,
    latest: watch::Sender<u64>,
}

impl Topic {
    fn new(memo: &str) -> Self {
        let (latest, _) = watch::channel(0);
        Self {
            memo: memo.to_string(),
            records: RwLock::new(Vec::new()),
            latest,
        }
    }

    fn record_at(&self, sequence: u64) -> Result<Option<LogRecord>, LogError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(sequence
            .checked_sub(1)
            .and_then(|index| records.get(index as usize))
            .cloned())
    }

    fn len(&self) -> Result<u64, LogError> {
        Ok(self.records.read().map_err(|_| poisoned())?.len() as u64)
    }
}

fn poisoned() -> LogError {
    LogError::Backend("log lock poisoned".to_string())
}

#[derive(Default)]
pub struct InMemoryLogBackend {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl InMemoryLogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, handle: &LogHandle) -> Result<Arc<Topic>, LogError> {
        self.topics
            .read()
            .map_err(|_| poisoned())?
            .get(handle.topic())
            .cloned()
            .ok_or_else(|| LogError::TopicNotFound(handle.topic().to_string()))
    }

    /// Registers a topic synchronously.
    pub fn insert_topic(&self, name: &str, memo: &str) -> Result<LogHandle, LogError> {
        let mut topics = self.topics.write().map_err(|_| poisoned())?;
        if topics.contains_key(name) {
            return Err(LogError::TopicExists(name.to_string()));
        }
        topics.insert(name.to_string(), Arc::new(Topic::new(memo)));
        Ok(LogHandle::new(name))
    }

    /// Appends synchronously and wakes subscribers.
    pub fn push(&self, handle: &LogHandle, payload: Vec<u8>) -> Result<SequenceNumber, LogError> {
        let topic = self.topic(handle)?;
        let sequence = {
            let mut records = topic.records.write().map_err(|_| poisoned())?;
            let sequence = SequenceNumber(records.len() as u64 + 1);
            records.push(LogRecord { sequence, payload });
            sequence
        };
        topic.latest.send_replace(sequence.value());
        Ok(sequence)
    }

    /// Sequence number the next append to `handle` will receive.
    pub fn next_sequence(&self, handle: &LogHandle) -> Result<SequenceNumber, LogError> {
        Ok(SequenceNumber(self.topic(handle)?.len()? + 1))
    }

    pub fn topic_names(&self) -> Result<Vec<String>, LogError> {
        let mut names: Vec<_> = self
            .topics
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}

fn record_stream(topic: Arc<Topic>, from: u64) -> RecordStream {
    let latest = topic.latest.subscribe();
    futures::stream::unfold(
        (topic, latest, from),
        |(topic, mut latest, next)| async move {
            loop {
                match topic.record_at(next) {
                    Ok(Some(record)) => return Some((Ok(record), (topic, latest, next + 1))),
                    Ok(None) => {}
                    Err(e) => return Some((Err(e), (topic, latest, next))),
                }
                if latest.changed().await.is_err() {
                    return None;
                }
            }
        },
    )
    .boxed()
}

#[async_trait]
impl LogBackend for InMemoryLogBackend {
    async fn create_topic(&self, name: &str, memo: &str) -> Result<LogHandle, LogError> {
        self.insert_topic(name, memo)
    }

    async fn append(
        &self,
        topic: &LogHandle,
        payload: Vec<u8>,
    ) -> Result<SequenceNumber, LogError> {
        self.push(topic, payload)
    }

    async fn subscribe(
        &self,
        topic: &LogHandle,
        since: Option<SequenceNumber>,
    ) -> Result<RecordStream, LogError> {
        let topic = self.topic(topic)?;
        let from = match since {
            Some(sequence) => sequence.value().max(1),
            None => topic.len()? + 1,
        };
        Ok(record_stream(topic, from))
    }

    async fn read(&self, topic: &LogHandle) -> Result<Vec<LogRecord>, LogError> {
        let topic = self.topic(topic)?;
        let records = topic.records.read().map_err(|_| poisoned())?;
        Ok(records.clone())
    }

    async fn memo(&self, topic: &LogHandle) -> Result<String, LogError> {
        Ok(self.topic(topic)?.memo.clone())
    }
}
