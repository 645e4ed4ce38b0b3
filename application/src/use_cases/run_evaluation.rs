//! Run Evaluation use case
//!
//! Drives one session through its phases:
//! independent scoring, optional discussion rounds, aggregation, publishing.
//! The session is persisted through the [`SessionStore`] after every
//! transition, so progress polling always sees the latest phase.

use crate::message_log::MessageLog;
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::evaluator::Evaluator;
use crate::ports::log_backend::LogError;
use crate::ports::progress::{NoProgress, ProgressNotifier};
use crate::ports::session_store::{SessionStore, StoreError};
use crate::use_cases::discussion_round::{
    DiscussionRoundDriver, DiscussionRoundError, DiscussionRoundInput, round_deadline,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tribunal_domain::consensus::stats;
use tribunal_domain::{
    AgentId, AgentMessage, AgentProfile, AgentScores, ConfigurationError, ConsensusEngine,
    ConsensusError, ConsensusInput, ConsensusResult, EvaluationReport, EvaluationRound,
    EvaluationSession, InvalidTransition, LogHandle, LoggedMessage, MessageKind,
    OrchestratorConfig, ReputationMap, ScoreMap, SessionId, SessionPhase, build_agent_results,
    calculate_convergence, score_values,
};

/// Errors that end a session
#[derive(Error, Debug)]
pub enum RunEvaluationError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("No agent produced an independent score")]
    NoParticipants,

    #[error("Consensus failed: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Log append failed: {0}")]
    LogAppend(#[from] LogError),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Evaluation cancelled")]
    Cancelled,
}

impl From<DiscussionRoundError> for RunEvaluationError {
    fn from(e: DiscussionRoundError) -> Self {
        match e {
            DiscussionRoundError::Log(e) => RunEvaluationError::LogAppend(e),
            DiscussionRoundError::Cancelled => RunEvaluationError::Cancelled,
        }
    }
}

/// Output of the independent scoring phase
#[derive(Debug, Default)]
struct ScoringOutcome {
    scores: ScoreMap,
    aspects: BTreeMap<AgentId, BTreeMap<String, f64>>,
}

/// Output of the discussion loop
#[derive(Debug)]
struct DiscussionOutcome {
    scores: ScoreMap,
    adjustments: Vec<LoggedMessage>,
    round_scores: Vec<ScoreMap>,
    rounds_completed: u32,
}

/// Use case for running one evaluation session to a terminal phase
#[derive(Clone)]
pub struct RunEvaluationUseCase {
    evaluator: Arc<dyn Evaluator>,
    log: MessageLog,
    store: Arc<dyn SessionStore>,
    engine: Arc<ConsensusEngine>,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressNotifier>,
}

impl RunEvaluationUseCase {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        log: MessageLog,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            evaluator,
            log,
            store,
            engine: Arc::new(ConsensusEngine::with_builtin_strategies()),
            clock: Arc::new(SystemClock),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_engine(mut self, engine: Arc<ConsensusEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressNotifier>) -> Self {
        self.progress = progress;
        self
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Runs the stored session to completion.
    ///
    /// On error the session is moved to `Failed` (or `Cancelled`) and
    /// persisted before the error is returned.
    pub async fn execute(
        &self,
        session_id: &SessionId,
        cancel: CancellationToken,
    ) -> Result<EvaluationReport, RunEvaluationError> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| RunEvaluationError::SessionNotFound(session_id.clone()))?;

        match self.run(&mut session, &cancel).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let now = self.clock.now();
                let transition = match e {
                    RunEvaluationError::Cancelled => {
                        info!("Session {} cancelled in {}", session_id, session.phase());
                        session.cancel(now)
                    }
                    _ => {
                        warn!(
                            "Session {} failed in {} (round {}): {}",
                            session_id,
                            session.phase(),
                            session.current_round(),
                            e
                        );
                        session.fail(e.to_string(), now)
                    }
                };
                if let Err(t) = transition {
                    warn!("Could not record terminal phase: {}", t);
                }
                if let Err(store_error) = self.store.put(&session).await {
                    warn!("Could not persist session {}: {}", session_id, store_error);
                }
                Err(e)
            }
        }
    }

    /// Moves a session whose run stopped without recording an outcome to
    /// `Failed`. Sessions already in a terminal phase are left as they are.
    pub async fn mark_failed(
        &self,
        session_id: &SessionId,
        reason: impl Into<String>,
    ) -> Result<(), RunEvaluationError> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| RunEvaluationError::SessionNotFound(session_id.clone()))?;
        if session.is_terminal() {
            return Ok(());
        }
        session.fail(reason, self.clock.now())?;
        self.store.put(&session).await?;
        Ok(())
    }

    async fn run(
        &self,
        session: &mut EvaluationSession,
        cancel: &CancellationToken,
    ) -> Result<EvaluationReport, RunEvaluationError> {
        let config = session.config().clone();
        config.validate()?;

        info!(
            "Starting evaluation {} with {} agents ({})",
            session.id(),
            session.participants().len(),
            config.consensus_algorithm
        );

        // Initializing: allocate the log
        let handle = self.log.create_log(session.id(), &session.metadata()).await?;
        session.attach_log(handle.clone(), self.clock.now());
        self.transition(session, SessionPhase::IndependentScoring)
            .await?;

        let scoring = self
            .phase_independent_scoring(session, &handle, &config, cancel)
            .await?;

        let discussion = self
            .phase_discussion(session, &handle, &config, &scoring, cancel)
            .await?;

        if cancel.is_cancelled() {
            return Err(RunEvaluationError::Cancelled);
        }
        self.transition(session, SessionPhase::Aggregating).await?;
        let consensus = self.phase_aggregation(session, &config, &scoring, &discussion)?;

        // Cancellation is honoured up to this point only
        if cancel.is_cancelled() {
            return Err(RunEvaluationError::Cancelled);
        }
        self.transition(session, SessionPhase::Publishing).await?;
        self.progress.on_phase_start(SessionPhase::Publishing, 1);
        let final_message = AgentMessage::final_verdict(
            self.clock.now(),
            discussion.rounds_completed,
            &consensus,
        );
        let sequence = self.log.append(&handle, &final_message).await?;
        debug!("Final message published as {}", sequence);
        self.progress.on_phase_complete(SessionPhase::Publishing);

        let agent_results = build_agent_results(
            session.participants(),
            AgentScores {
                initial: &scoring.scores,
                current: &discussion.scores,
                aspects: &scoring.aspects,
            },
            &consensus,
        );
        let report = EvaluationReport {
            session_id: session.id().clone(),
            convergence: calculate_convergence(
                &score_values(&scoring.scores),
                &score_values(&discussion.scores),
            ),
            rounds_completed: discussion.rounds_completed,
            failed_agents: session.failed_agents().to_vec(),
            agent_results,
            consensus,
        };

        session.complete(report.clone(), self.clock.now())?;
        self.store.put(session).await?;
        info!(
            "Evaluation {} completed: {:.2} (confidence {:.2})",
            session.id(),
            report.consensus.final_score,
            report.consensus.confidence
        );
        Ok(report)
    }

    async fn transition(
        &self,
        session: &mut EvaluationSession,
        phase: SessionPhase,
    ) -> Result<(), RunEvaluationError> {
        debug!("Session {}: {} -> {}", session.id(), session.phase(), phase);
        session.advance(phase, self.clock.now())?;
        self.store.put(session).await?;
        Ok(())
    }

    /// Phase 1: every participant scores independently, in parallel
    async fn phase_independent_scoring(
        &self,
        session: &mut EvaluationSession,
        handle: &LogHandle,
        config: &OrchestratorConfig,
        cancel: &CancellationToken,
    ) -> Result<ScoringOutcome, RunEvaluationError> {
        info!("Phase 1: Independent Scoring");
        let agents = session.participants().to_vec();
        self.progress
            .on_phase_start(SessionPhase::IndependentScoring, agents.len());

        let started_at = self.clock.now();
        session.begin_round(0, started_at);
        let deadline = round_deadline(config.round_timeout);

        let mut join_set = JoinSet::new();
        for agent in &agents {
            let evaluator = Arc::clone(&self.evaluator);
            let agent = agent.clone();
            let content = session.content().to_string();
            let criteria = session.criteria().to_vec();

            join_set.spawn(async move {
                let result = evaluator
                    .evaluate(&agent, &content, &criteria)
                    .await
                    .and_then(|evaluation| evaluation.validate().map(|_| evaluation));
                (agent, result)
            });
        }

        let mut outcome = ScoringOutcome::default();
        let mut messages = Vec::new();

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.detach_all();
                    return Err(RunEvaluationError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    join_set.detach_all();
                    break;
                }
                joined = join_set.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok((agent, Ok(evaluation)))) => {
                    debug!("Agent {} scored {:.2}", agent.id, evaluation.score);
                    let message = AgentMessage::score(
                        &agent,
                        self.clock.now(),
                        evaluation.score,
                        evaluation.confidence,
                        evaluation.aspects.clone(),
                        evaluation.reasoning,
                    );
                    messages.push(self.log.append_logged(handle, message).await?);
                    session.record_score(self.clock.now());
                    outcome.scores.insert(agent.id.clone(), evaluation.score);
                    outcome.aspects.insert(agent.id.clone(), evaluation.aspects);
                    self.progress
                        .on_agent_complete(SessionPhase::IndependentScoring, &agent, true);
                }
                Some(Ok((agent, Err(e)))) => {
                    warn!("Agent {} failed to score: {}", agent.id, e);
                    self.record_failure(session, &agent);
                }
                Some(Err(e)) => {
                    warn!("Task join error: {}", e);
                }
            }
        }

        for agent in &agents {
            let answered = outcome.scores.contains_key(&agent.id)
                || session.failed_agents().contains(&agent.id);
            if !answered {
                warn!("Agent {} timed out during independent scoring", agent.id);
                self.record_failure(session, agent);
            }
        }

        session.record_round(EvaluationRound {
            number: 0,
            started_at,
            ended_at: self.clock.now(),
            messages,
            variance: stats::population_variance(&score_values(&outcome.scores)),
        });
        self.store.put(session).await?;
        self.progress
            .on_phase_complete(SessionPhase::IndependentScoring);

        if outcome.scores.is_empty() {
            return Err(RunEvaluationError::NoParticipants);
        }
        info!("{} of {} agents scored", outcome.scores.len(), agents.len());
        Ok(outcome)
    }

    fn record_failure(&self, session: &mut EvaluationSession, agent: &AgentProfile) {
        session.record_agent_failure(agent.id.clone(), self.clock.now());
        self.progress
            .on_agent_complete(SessionPhase::IndependentScoring, agent, false);
    }

    /// Phase 2: discussion rounds until convergence or the round cap
    async fn phase_discussion(
        &self,
        session: &mut EvaluationSession,
        handle: &LogHandle,
        config: &OrchestratorConfig,
        scoring: &ScoringOutcome,
        cancel: &CancellationToken,
    ) -> Result<DiscussionOutcome, RunEvaluationError> {
        let mut outcome = DiscussionOutcome {
            scores: scoring.scores.clone(),
            adjustments: Vec::new(),
            round_scores: vec![scoring.scores.clone()],
            rounds_completed: 0,
        };

        if !config.enable_discussion
            || config.max_discussion_rounds == 0
            || scoring.scores.len() < 2
        {
            debug!("Skipping discussion phase");
            return Ok(outcome);
        }

        info!("Phase 2: Discussion");
        self.transition(session, SessionPhase::Discussing).await?;
        let agents: Vec<AgentProfile> = session
            .participants()
            .iter()
            .filter(|agent| scoring.scores.contains_key(&agent.id))
            .cloned()
            .collect();
        self.progress
            .on_phase_start(SessionPhase::Discussing, agents.len());

        let driver = DiscussionRoundDriver::new(
            Arc::clone(&self.evaluator),
            self.log.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.progress),
        );

        for round in 1..=config.max_discussion_rounds {
            if cancel.is_cancelled() {
                return Err(RunEvaluationError::Cancelled);
            }

            let started_at = self.clock.now();
            session.begin_round(round, started_at);
            self.store.put(session).await?;

            let output = driver
                .run(
                    DiscussionRoundInput {
                        round,
                        log: handle,
                        content: session.content(),
                        criteria: session.criteria(),
                        agents: &agents,
                        scores: &outcome.scores,
                        mode: config.discussion_mode,
                        dead_band: config.dead_band,
                        timeout: config.round_timeout,
                    },
                    cancel,
                )
                .await?;

            outcome.scores = output.scores;
            outcome.adjustments.extend(
                output
                    .messages
                    .iter()
                    .filter(|m| m.message.kind() == MessageKind::Adjustment)
                    .cloned(),
            );
            outcome.round_scores.push(outcome.scores.clone());
            outcome.rounds_completed = round;

            let variance = stats::population_variance(&score_values(&outcome.scores));
            session.record_round(EvaluationRound {
                number: round,
                started_at,
                ended_at: self.clock.now(),
                messages: output.messages,
                variance,
            });
            self.store.put(session).await?;
            self.progress.on_round_complete(round, variance);
            info!("Round {} complete, variance {:.3}", round, variance);

            if variance < config.convergence_threshold {
                info!("Scores converged after round {}", round);
                break;
            }
        }

        self.progress.on_phase_complete(SessionPhase::Discussing);
        Ok(outcome)
    }

    /// Phase 3: reduce the scores to one result
    fn phase_aggregation(
        &self,
        session: &EvaluationSession,
        config: &OrchestratorConfig,
        scoring: &ScoringOutcome,
        discussion: &DiscussionOutcome,
    ) -> Result<ConsensusResult, RunEvaluationError> {
        info!("Phase 3: Aggregation ({})", config.consensus_algorithm);
        self.progress.on_phase_start(SessionPhase::Aggregating, 1);

        let reputations: ReputationMap = session
            .participants()
            .iter()
            .filter_map(|p| p.reputation.map(|r| (p.id.clone(), r)))
            .collect();
        let input = ConsensusInput::new(&discussion.scores)
            .with_reputations(&reputations)
            .with_history(
                &scoring.scores,
                &discussion.adjustments,
                config.max_discussion_rounds,
            )
            .with_round_scores(&discussion.round_scores)
            .with_rounds_completed(discussion.rounds_completed)
            .with_params(&config.consensus);

        let result = if config.outlier_detection {
            let (result, report) = self
                .engine
                .aggregate_excluding_outliers(config.consensus_algorithm, &input)?;
            if report.has_outliers() {
                info!("Excluded outliers: {:?}", report.excluded);
            }
            result
        } else {
            self.engine.aggregate(config.consensus_algorithm, &input)?
        };

        self.progress.on_phase_complete(SessionPhase::Aggregating);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::clock::ManualClock;
    use crate::ports::memory_log::InMemoryLogBackend;
    use crate::ports::session_store::InMemorySessionStore;
    use crate::test_support::{ScriptedAgent, TestEvaluator};
    use chrono::TimeZone;
    use std::time::Duration;
    use tribunal_domain::{
        ConsensusAlgorithm, EvaluationRequest, MessagePayload, OrchestratorConfig,
    };

    struct Harness {
        use_case: RunEvaluationUseCase,
        store: Arc<InMemorySessionStore>,
    }

    fn harness(evaluator: TestEvaluator) -> Harness {
        let store = Arc::new(InMemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap(),
        ));
        let use_case = RunEvaluationUseCase::new(
            Arc::new(evaluator),
            MessageLog::new(Arc::new(InMemoryLogBackend::new())),
            store.clone(),
        )
        .with_clock(clock);
        Harness { use_case, store }
    }

    async fn start(h: &Harness, ids: &[&str], config: OrchestratorConfig) -> SessionId {
        let request = EvaluationRequest::new(
            "fn add(a: i32, b: i32) -> i32 { a + b }",
            ids.iter().map(|id| AgentProfile::new(*id, *id)).collect(),
        )
        .with_criteria(vec!["correctness".to_string()])
        .with_config(config);
        let session = EvaluationSession::new(
            SessionId::generate(),
            request,
            h.use_case.clock().now(),
        );
        h.store.put(&session).await.unwrap();
        session.id().clone()
    }

    async fn logged(h: &Harness, id: &SessionId) -> Vec<LoggedMessage> {
        let session = h.store.get(id).await.unwrap().unwrap();
        h.use_case
            .message_log()
            .read_all(session.log().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_simple_average_without_discussion() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent("b", ScriptedAgent::scoring(8.0))
                .with_agent("c", ScriptedAgent::scoring(9.0)),
        );
        let config = OrchestratorConfig::default().without_discussion();
        let id = start(&h, &["a", "b", "c"], config).await;

        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();

        assert!((report.consensus.final_score - 8.0).abs() < 1e-9);
        assert!((report.consensus.variance - 2.0 / 3.0).abs() < 1e-9);
        assert!((report.consensus.confidence - 0.9333333333).abs() < 1e-6);
        assert_eq!(report.rounds_completed, 0);

        let session = h.store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert!(session.report().is_some());

        let messages = logged(&h, &id).await;
        assert_eq!(messages.len(), 4);
        let finals: Vec<_> = messages
            .iter()
            .filter(|m| m.message.kind() == MessageKind::Final)
            .collect();
        assert_eq!(finals.len(), 1);
        assert!(finals[0].message.agent_id.is_coordinator());
    }

    #[tokio::test]
    async fn test_partial_failure_still_completes() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(6.0))
                .with_agent("b", ScriptedAgent::scoring(6.0).failing_evaluation())
                .with_agent("c", ScriptedAgent::scoring(8.0)),
        );
        let config = OrchestratorConfig::default().without_discussion();
        let id = start(&h, &["a", "b", "c"], config).await;

        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.consensus.agent_count(), 2);
        assert_eq!(report.consensus.final_score, 7.0);
        assert_eq!(report.failed_agents, vec![AgentId::new("b")]);
        assert_eq!(report.agent_results.len(), 2);
    }

    #[tokio::test]
    async fn test_all_agents_failing_fails_session() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(6.0).failing_evaluation())
                .with_agent("b", ScriptedAgent::scoring(6.0).failing_evaluation()),
        );
        let id = start(&h, &["a", "b"], OrchestratorConfig::default()).await;

        let err = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunEvaluationError::NoParticipants));

        let session = h.store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert_eq!(
            session.failure().unwrap().phase,
            SessionPhase::IndependentScoring
        );
        // No final message on a failed session
        assert!(
            logged(&h, &id)
                .await
                .iter()
                .all(|m| m.message.kind() != MessageKind::Final)
        );
    }

    #[tokio::test]
    async fn test_discussion_stops_at_convergence() {
        // Variance after round 1: {4, 8} -> 4.0; after round 2: {5.45, 6.55} -> 0.3025
        let h = harness(
            TestEvaluator::new()
                .with_agent(
                    "a",
                    ScriptedAgent::scoring(2.0).adjusting_through(vec![4.0, 5.45, 6.0]),
                )
                .with_agent(
                    "b",
                    ScriptedAgent::scoring(10.0).adjusting_through(vec![8.0, 6.55, 6.0]),
                ),
        );
        let config = OrchestratorConfig::default()
            .with_max_rounds(5)
            .with_convergence_threshold(0.5);
        let id = start(&h, &["a", "b"], config).await;

        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.rounds_completed, 2);
        assert_eq!(report.consensus.convergence_rounds, 2);
        assert!((report.consensus.final_score - 6.0).abs() < 1e-9);
        assert!(report.convergence > 0.9);

        let session = h.store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.rounds().len(), 3);
        assert_eq!(session.discussion_rounds(), 2);
    }

    #[tokio::test]
    async fn test_adjustments_chain_from_previous_scores() {
        let h = harness(
            TestEvaluator::new()
                .with_agent(
                    "a",
                    ScriptedAgent::scoring(2.0).adjusting_through(vec![4.0, 5.0]),
                )
                .with_agent("b", ScriptedAgent::scoring(9.0)),
        );
        let config = OrchestratorConfig::default()
            .with_max_rounds(2)
            .with_convergence_threshold(0.0);
        let id = start(&h, &["a", "b"], config).await;
        h.use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();

        let mut last_score = 2.0;
        for logged in logged(&h, &id).await {
            if logged.message.agent_id.as_str() != "a" {
                continue;
            }
            if let MessagePayload::Adjustment {
                original_score,
                adjusted_score,
                ..
            } = logged.message.payload
            {
                assert_eq!(original_score, last_score);
                last_score = adjusted_score;
            }
        }
        assert_eq!(last_score, 5.0);
    }

    #[tokio::test]
    async fn test_iterative_convergence_uses_logged_adjustments() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(2.0).adjusting_to(5.0))
                .with_agent("b", ScriptedAgent::scoring(8.0).adjusting_to(5.4)),
        );
        let config = OrchestratorConfig::default()
            .with_algorithm(ConsensusAlgorithm::IterativeConvergence)
            .with_max_rounds(3);
        let id = start(&h, &["a", "b"], config).await;
        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.consensus.algorithm, ConsensusAlgorithm::IterativeConvergence);
        assert_eq!(report.consensus.convergence_rounds, 1);
        assert!((report.consensus.final_score - 5.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_outlier_detection_reruns_on_clean_set() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(5.0))
                .with_agent("b", ScriptedAgent::scoring(5.0))
                .with_agent("c", ScriptedAgent::scoring(5.0))
                .with_agent("d", ScriptedAgent::scoring(5.0))
                .with_agent("e", ScriptedAgent::scoring(10.0)),
        );
        let config = OrchestratorConfig::default()
            .without_discussion()
            .with_outlier_detection(true);
        let id = start(&h, &["a", "b", "c", "d", "e"], config).await;
        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.consensus.final_score, 5.0);
        assert_eq!(report.consensus.excluded_agents, vec![AgentId::new("e")]);
        let outlier = report
            .agent_results
            .iter()
            .find(|r| r.agent_id.as_str() == "e")
            .unwrap();
        assert!(outlier.is_outlier);
        assert_eq!(outlier.final_score, 10.0);
    }

    #[tokio::test]
    async fn test_single_agent_skips_discussion() {
        let h = harness(TestEvaluator::new().with_agent("solo", ScriptedAgent::scoring(6.5)));
        let id = start(&h, &["solo"], OrchestratorConfig::default()).await;
        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.consensus.final_score, 6.5);
        assert_eq!(report.consensus.variance, 0.0);
        assert_eq!(report.consensus.confidence, 1.0);
        assert_eq!(report.rounds_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_agent_is_recorded_as_failed() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent(
                    "slow",
                    ScriptedAgent::scoring(1.0).with_delay(Duration::from_secs(120)),
                ),
        );
        let config = OrchestratorConfig::default()
            .without_discussion()
            .with_round_timeout(Duration::from_secs(10));
        let id = start(&h, &["a", "slow"], config).await;

        let report = h
            .use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.consensus.final_score, 7.0);
        assert_eq!(report.failed_agents, vec![AgentId::new("slow")]);
    }

    #[tokio::test]
    async fn test_cancelled_session_has_no_final_message() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent("b", ScriptedAgent::scoring(8.0)),
        );
        let id = start(&h, &["a", "b"], OrchestratorConfig::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h.use_case.execute(&id, cancel).await.unwrap_err();
        assert!(matches!(err, RunEvaluationError::Cancelled));

        let session = h.store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.phase(), SessionPhase::Cancelled);
        assert!(
            logged(&h, &id)
                .await
                .iter()
                .all(|m| m.message.kind() != MessageKind::Final)
        );
    }

    #[tokio::test]
    async fn test_invalid_strategy_input_fails_session() {
        let h = harness(
            TestEvaluator::new()
                .with_agent("a", ScriptedAgent::scoring(7.0))
                .with_agent("b", ScriptedAgent::scoring(8.0)),
        );
        let config = OrchestratorConfig::default().without_discussion();
        let id = start(&h, &["a", "b"], config).await;
        let use_case = h
            .use_case
            .clone()
            .with_engine(Arc::new(ConsensusEngine::empty()));

        let err = use_case
            .execute(&id, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunEvaluationError::Consensus(_)));
        let session = h.store.get(&id).await.unwrap().unwrap();
        assert_eq!(session.failure().unwrap().phase, SessionPhase::Aggregating);
    }
}
