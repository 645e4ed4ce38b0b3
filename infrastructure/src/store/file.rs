//! Session store keeping one JSON document per session.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use tribunal_application::ports::session_store::{SessionStore, StoreError};
use tribunal_domain::{EvaluationSession, SessionId};

const EXTENSION: &str = "json";

/// [`SessionStore`] writing `<dir>/<session id>.json`.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// reader never sees a half-written document.
pub struct JsonFileSessionStore {
    dir: PathBuf,
}

impl JsonFileSessionStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        let name = id.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(StoreError::Backend(format!("invalid session id '{name}'")));
        }
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<EvaluationSession>, StoreError> {
        let path = self.path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, session: &EvaluationSession) -> Result<(), StoreError> {
        let path = self.path(session.id())?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!("Stored session {} ({})", session.id(), session.phase());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.path(id)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION)
                && let Some(stem) = path.file_stem()
            {
                ids.push(SessionId::new(stem.to_string_lossy()));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tribunal_domain::{AgentProfile, EvaluationRequest, SessionPhase};

    fn session(id: &str) -> EvaluationSession {
        EvaluationSession::new(
            SessionId::new(id),
            EvaluationRequest::new("content", vec![AgentProfile::new("a", "A")]),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSessionStore::open(dir.path()).await.unwrap();
        let mut stored = session("s1");
        stored
            .advance(SessionPhase::IndependentScoring, Utc::now())
            .unwrap();
        store.put(&stored).await.unwrap();

        let loaded = store.get(&SessionId::new("s1")).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
        assert!(dir.path().join("s1.json").exists());
    }

    #[tokio::test]
    async fn test_missing_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSessionStore::open(dir.path()).await.unwrap();
        assert!(store.get(&SessionId::new("nope")).await.unwrap().is_none());
        assert!(!store.delete(&SessionId::new("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSessionStore::open(dir.path()).await.unwrap();
        store.put(&session("b")).await.unwrap();
        store.put(&session("a")).await.unwrap();

        assert_eq!(
            store.list().await.unwrap(),
            vec![SessionId::new("a"), SessionId::new("b")]
        );
        assert!(store.delete(&SessionId::new("a")).await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec![SessionId::new("b")]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSessionStore::open(dir.path()).await.unwrap();
        assert!(store.get(&SessionId::new("../x")).await.is_err());
    }
}
