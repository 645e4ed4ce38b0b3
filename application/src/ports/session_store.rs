//! Session store port
//!
//! The orchestrator keeps session state behind this interface and never
//! assumes a particular backing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tribunal_domain::{EvaluationSession, SessionId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<EvaluationSession>, StoreError>;

    /// Inserts or replaces the session.
    async fn put(&self, session: &EvaluationSession) -> Result<(), StoreError>;

    /// Returns whether a session was removed.
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<SessionId>, StoreError>;
}

/// Store backed by a process-local map.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, EvaluationSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("session map lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<EvaluationSession>, StoreError> {
        Ok(self.sessions.read().map_err(|_| poisoned())?.get(id).cloned())
    }

    async fn put(&self, session: &EvaluationSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self
            .sessions
            .write()
            .map_err(|_| poisoned())?
            .remove(id)
            .is_some())
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
