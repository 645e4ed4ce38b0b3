//! Evaluation coordinator
//!
//! The externally consumed API: start sessions in the background, poll
//! their progress, fetch results and transcripts, cancel them.

use crate::message_log::MessageLog;
use crate::ports::clock::Clock;
use crate::ports::evaluator::Evaluator;
use crate::ports::log_backend::LogError;
use crate::ports::progress::ProgressNotifier;
use crate::ports::session_store::{SessionStore, StoreError};
use crate::use_cases::run_evaluation::RunEvaluationUseCase;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tribunal_domain::{
    ConfigurationError, ConsensusEngine, EvaluationProgress, EvaluationReport, EvaluationRequest,
    EvaluationSession, SessionId, SessionPhase, Transcript,
};

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    #[error("Session is not complete yet (phase: {phase})")]
    NotReady { phase: SessionPhase },

    #[error("Session failed during {phase} (round {round}): {reason}")]
    Failed {
        phase: SessionPhase,
        round: u32,
        reason: String,
    },

    #[error("Session {0} was cancelled")]
    Cancelled(SessionId),

    #[error("Invalid evaluation request: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Message log error: {0}")]
    Log(#[from] LogError),
}

/// A session running in the background.
struct ActiveRun {
    cancel: CancellationToken,
    /// Cancelled when the background task exits, panics included
    finished: CancellationToken,
    handle: JoinHandle<()>,
}

/// Runs evaluation sessions in the background and answers queries about them.
pub struct EvaluationCoordinator {
    runner: RunEvaluationUseCase,
    active: Mutex<HashMap<SessionId, ActiveRun>>,
}

impl EvaluationCoordinator {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        log: MessageLog,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self::from_runner(RunEvaluationUseCase::new(evaluator, log, store))
    }

    pub fn from_runner(runner: RunEvaluationUseCase) -> Self {
        Self {
            runner,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.runner = self.runner.with_clock(clock);
        self
    }

    pub fn with_engine(mut self, engine: Arc<ConsensusEngine>) -> Self {
        self.runner = self.runner.with_engine(engine);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressNotifier>) -> Self {
        self.runner = self.runner.with_progress(progress);
        self
    }

    /// Validates the request, stores the new session and runs it in the
    /// background. Returns as soon as the session is stored.
    ///
    /// An invalid request is rejected before anything is stored.
    pub async fn start_evaluation(
        &self,
        request: EvaluationRequest,
    ) -> Result<SessionId, CoordinatorError> {
        request.validate()?;

        let session = EvaluationSession::new(
            SessionId::generate(),
            request,
            self.runner.clock().now(),
        );
        let session_id = session.id().clone();
        self.runner.store().put(&session).await?;

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let runner = self.runner.clone();
        let token = cancel.clone();
        let done = finished.clone().drop_guard();
        let id = session_id.clone();
        let handle = tokio::spawn(async move {
            let _done = done;
            let run = tokio::spawn({
                let runner = runner.clone();
                let id = id.clone();
                async move { runner.execute(&id, token).await }
            });
            match run.await {
                Ok(Ok(report)) => debug!(
                    "Background run {} finished with {:.2}",
                    id, report.consensus.final_score
                ),
                Ok(Err(e)) => debug!("Background run {} ended: {}", id, e),
                Err(join_error) => {
                    warn!("Background run {} died: {}", id, join_error);
                    let reason = format!("evaluation task aborted: {join_error}");
                    if let Err(e) = runner.mark_failed(&id, reason).await {
                        warn!("Could not record failure of {}: {}", id, e);
                    }
                }
            }
        });

        let mut active = self.active.lock().await;
        active.retain(|_, run| !run.handle.is_finished());
        active.insert(
            session_id.clone(),
            ActiveRun {
                cancel,
                finished,
                handle,
            },
        );

        info!("Started evaluation {}", session_id);
        Ok(session_id)
    }

    pub async fn get_progress(
        &self,
        session_id: &SessionId,
    ) -> Result<EvaluationProgress, CoordinatorError> {
        Ok(self.load(session_id).await?.progress())
    }

    /// The report of a completed session.
    pub async fn get_result(
        &self,
        session_id: &SessionId,
    ) -> Result<EvaluationReport, CoordinatorError> {
        let session = self.load(session_id).await?;
        if let Some(report) = session.report() {
            return Ok(report.clone());
        }
        match session.phase() {
            SessionPhase::Failed => {
                let failure = session.failure();
                Err(CoordinatorError::Failed {
                    phase: failure.map_or(SessionPhase::Failed, |f| f.phase),
                    round: failure.map_or(session.current_round(), |f| f.round),
                    reason: failure.map_or_else(String::new, |f| f.reason.clone()),
                })
            }
            SessionPhase::Cancelled => Err(CoordinatorError::Cancelled(session_id.clone())),
            phase => Err(CoordinatorError::NotReady { phase }),
        }
    }

    /// Rebuilds the transcript from the message log.
    pub async fn get_transcript(
        &self,
        session_id: &SessionId,
    ) -> Result<Transcript, CoordinatorError> {
        let session = self.load(session_id).await?;
        let messages = match session.log() {
            Some(handle) => self.runner.message_log().read_all(handle).await?,
            None => Vec::new(),
        };
        Ok(Transcript::build(
            session_id.clone(),
            &session.participant_ids(),
            session.discussion_rounds(),
            messages,
            session.is_terminal(),
        ))
    }

    /// Cancels a running session and waits for it to stop.
    ///
    /// Returns the phase the session ended in. Sessions already past
    /// `Aggregating` finish normally.
    pub async fn cancel(&self, session_id: &SessionId) -> Result<SessionPhase, CoordinatorError> {
        let run = self.active.lock().await.remove(session_id);
        if let Some(run) = run {
            info!("Cancelling evaluation {}", session_id);
            run.cancel.cancel();
            if let Err(e) = run.handle.await {
                warn!("Background run {} panicked: {}", session_id, e);
            }
        }
        Ok(self.load(session_id).await?.phase())
    }

    /// Waits for a background run to finish and returns its report.
    ///
    /// Dropping the returned future leaves the run untouched, so it can
    /// still be cancelled afterwards.
    pub async fn wait(&self, session_id: &SessionId) -> Result<EvaluationReport, CoordinatorError> {
        let finished = self
            .active
            .lock()
            .await
            .get(session_id)
            .map(|run| run.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
        self.get_result(session_id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionId>, CoordinatorError> {
        Ok(self.runner.store().list().await?)
    }

    async fn load(&self, session_id: &SessionId) -> Result<EvaluationSession, CoordinatorError> {
        self.runner
            .store()
            .get(session_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(session_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::memory_log::InMemoryLogBackend;
    use crate::ports::progress::ProgressNotifier;
    use crate::ports::session_store::InMemorySessionStore;
    use crate::test_support::{ScriptedAgent, TestEvaluator};
    use std::time::Duration;
    use tribunal_domain::{AgentId, AgentProfile, MessageKind, OrchestratorConfig};

    fn coordinator(evaluator: TestEvaluator) -> EvaluationCoordinator {
        EvaluationCoordinator::new(
            Arc::new(evaluator),
            MessageLog::new(Arc::new(InMemoryLogBackend::new())),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    fn request(ids: &[&str], config: OrchestratorConfig) -> EvaluationRequest {
        EvaluationRequest::new(
            "def handler(): return 42",
            ids.iter().map(|id| AgentProfile::new(*id, *id)).collect(),
        )
        .with_config(config)
    }

    #[tokio::test]
    async fn test_start_and_wait_for_result() {
        let coordinator = coordinator(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent("b", ScriptedAgent::scoring(9.0)),
        );
        let id = coordinator
            .start_evaluation(request(
                &["a", "b"],
                OrchestratorConfig::default().without_discussion(),
            ))
            .await
            .unwrap();

        let report = coordinator.wait(&id).await.unwrap();
        assert_eq!(report.consensus.final_score, 8.0);

        let progress = coordinator.get_progress(&id).await.unwrap();
        assert_eq!(progress.phase, SessionPhase::Completed);
        assert_eq!(progress.scores_received, 2);
        assert_eq!(progress.total_agents, 2);
        assert_eq!(coordinator.list_sessions().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_stored() {
        let coordinator = coordinator(TestEvaluator::new());
        let err = coordinator
            .start_evaluation(request(&["a", "a"], OrchestratorConfig::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Configuration(ConfigurationError::DuplicateParticipant(_))
        ));
        assert!(coordinator.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let coordinator = coordinator(TestEvaluator::new());
        let err = coordinator
            .get_progress(&SessionId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_not_ready_while_running() {
        let coordinator = coordinator(
            TestEvaluator::new()
                .with_agent(
                    "a",
                    ScriptedAgent::scoring(7.0).with_delay(Duration::from_secs(30)),
                )
                .with_agent("b", ScriptedAgent::scoring(8.0)),
        );
        let id = coordinator
            .start_evaluation(request(&["a", "b"], OrchestratorConfig::default()))
            .await
            .unwrap();

        let err = coordinator.get_result(&id).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotReady { .. }));
        coordinator.cancel(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_wait_still_allows_cancel() {
        let coordinator = coordinator(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent(
                    "b",
                    ScriptedAgent::scoring(8.0).with_delay(Duration::from_secs(30)),
                ),
        );
        let id = coordinator
            .start_evaluation(request(&["a", "b"], OrchestratorConfig::default()))
            .await
            .unwrap();

        let waited = tokio::time::timeout(Duration::from_secs(1), coordinator.wait(&id)).await;
        assert!(waited.is_err());

        assert_eq!(coordinator.cancel(&id).await.unwrap(), SessionPhase::Cancelled);
        assert!(matches!(
            coordinator.wait(&id).await,
            Err(CoordinatorError::Cancelled(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_leaves_abandoned_transcript() {
        let coordinator = coordinator(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent(
                    "b",
                    ScriptedAgent::scoring(8.0).with_delay(Duration::from_secs(30)),
                ),
        );
        let id = coordinator
            .start_evaluation(request(&["a", "b"], OrchestratorConfig::default()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let phase = coordinator.cancel(&id).await.unwrap();
        assert_eq!(phase, SessionPhase::Cancelled);

        let transcript = coordinator.get_transcript(&id).await.unwrap();
        assert!(transcript.abandoned);
        assert!(transcript.final_message.is_none());
        assert!(
            transcript
                .rounds
                .iter()
                .flat_map(|r| r.messages.iter())
                .all(|m| m.message.kind() != MessageKind::Final)
        );
        assert!(matches!(
            coordinator.get_result(&id).await.unwrap_err(),
            CoordinatorError::Cancelled(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_session_reports_phase_and_reason() {
        let coordinator = coordinator(
            TestEvaluator::new().with_agent("a", ScriptedAgent::scoring(7.0).failing_evaluation()),
        );
        let id = coordinator
            .start_evaluation(request(&["a"], OrchestratorConfig::default()))
            .await
            .unwrap();

        match coordinator.wait(&id).await.unwrap_err() {
            CoordinatorError::Failed { phase, round, reason } => {
                assert_eq!(phase, SessionPhase::IndependentScoring);
                assert_eq!(round, 0);
                assert!(reason.contains("No agent"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        let progress = coordinator.get_progress(&id).await.unwrap();
        assert_eq!(progress.phase, SessionPhase::Failed);
        assert!(progress.failure.is_some());
    }

    struct CrashingProgress;

    impl ProgressNotifier for CrashingProgress {
        fn on_phase_start(&self, _phase: SessionPhase, _total_tasks: usize) {
            panic!("progress display crashed");
        }
        fn on_agent_complete(&self, _phase: SessionPhase, _agent: &AgentProfile, _ok: bool) {}
        fn on_phase_complete(&self, _phase: SessionPhase) {}
    }

    #[tokio::test]
    async fn test_panicking_run_is_recorded_as_failed() {
        let coordinator = coordinator(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent("b", ScriptedAgent::scoring(8.0)),
        )
        .with_progress(Arc::new(CrashingProgress));
        let id = coordinator
            .start_evaluation(request(&["a", "b"], OrchestratorConfig::default()))
            .await
            .unwrap();

        match coordinator.wait(&id).await.unwrap_err() {
            CoordinatorError::Failed { phase, reason, .. } => {
                assert_ne!(phase, SessionPhase::Failed);
                assert!(reason.contains("aborted"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        let progress = coordinator.get_progress(&id).await.unwrap();
        assert_eq!(progress.phase, SessionPhase::Failed);
        assert_eq!(coordinator.cancel(&id).await.unwrap(), SessionPhase::Failed);
    }

    #[tokio::test]
    async fn test_unbounded_round_timeout_rejected_up_front() {
        let coordinator =
            coordinator(TestEvaluator::new().with_agent("a", ScriptedAgent::scoring(7.0)));
        let config =
            OrchestratorConfig::default().with_round_timeout(Duration::from_secs(u64::MAX));
        let err = coordinator
            .start_evaluation(request(&["a"], config))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Configuration(ConfigurationError::OutOfRange {
                field: "round_timeout",
                ..
            })
        ));
        assert!(coordinator.list_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcript_records_failed_agent_as_gap() {
        let coordinator = coordinator(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent("b", ScriptedAgent::scoring(7.0).failing_evaluation())
                .with_agent("c", ScriptedAgent::scoring(8.0)),
        );
        let id = coordinator
            .start_evaluation(request(
                &["a", "b", "c"],
                OrchestratorConfig::default().without_discussion(),
            ))
            .await
            .unwrap();
        coordinator.wait(&id).await.unwrap();

        let transcript = coordinator.get_transcript(&id).await.unwrap();
        assert!(!transcript.abandoned);
        assert!(transcript.final_message.is_some());
        let gaps: Vec<_> = transcript.gaps().collect();
        assert_eq!(gaps, vec![(0, &AgentId::new("b"))]);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_noop() {
        let coordinator =
            coordinator(TestEvaluator::new().with_agent("a", ScriptedAgent::scoring(6.0)));
        let id = coordinator
            .start_evaluation(request(&["a"], OrchestratorConfig::default()))
            .await
            .unwrap();
        coordinator.wait(&id).await.unwrap();
        assert_eq!(coordinator.cancel(&id).await.unwrap(), SessionPhase::Completed);
    }
}
