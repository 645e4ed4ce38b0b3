//! Evaluation session entity and its phase state machine.

use super::config::OrchestratorConfig;
use super::message::LoggedMessage;
use super::report::EvaluationReport;
use crate::core::agent::AgentProfile;
use crate::core::error::{ConfigurationError, InvalidTransition};
use crate::core::ids::{AgentId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Phase of an evaluation session.
///
/// ```text
/// Initializing -> IndependentScoring -> [Discussing] -> Aggregating -> Publishing -> Completed
///        \________________\__________________\_______________\____________-> Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initializing,
    IndependentScoring,
    Discussing,
    Aggregating,
    Publishing,
    Completed,
    Failed,
    /// Aborted externally before publishing; the log has no `final` message
    Cancelled,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Initializing => "initializing",
            SessionPhase::IndependentScoring => "independent_scoring",
            SessionPhase::Discussing => "discussing",
            SessionPhase::Aggregating => "aggregating",
            SessionPhase::Publishing => "publishing",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
            SessionPhase::Cancelled => "cancelled",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionPhase::Initializing => "Initializing",
            SessionPhase::IndependentScoring => "Independent Scoring",
            SessionPhase::Discussing => "Discussion",
            SessionPhase::Aggregating => "Aggregation",
            SessionPhase::Publishing => "Publishing",
            SessionPhase::Completed => "Completed",
            SessionPhase::Failed => "Failed",
            SessionPhase::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Failed | SessionPhase::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            // Publishing is the durability point; cancelling after it would
            // leave a `final` message on an abandoned session.
            (from, Cancelled) => !from.is_terminal() && *from != Publishing,
            (Initializing, IndependentScoring) => true,
            (IndependentScoring, Discussing | Aggregating) => true,
            (Discussing, Aggregating) => true,
            (Aggregating, Publishing) => true,
            (Publishing, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle of a session's Message Log, as allocated by the log backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogHandle(String);

impl LogHandle {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn topic(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata recorded when a session's log is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMetadata {
    pub title: String,
    pub participant_count: usize,
    pub round_cap: u32,
}

/// Messages produced during one round, appended once the round completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRound {
    pub number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub messages: Vec<LoggedMessage>,
    /// Population variance of the running scores when the round ended
    pub variance: f64,
}

/// A request to evaluate content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    pub criteria: Vec<String>,
    pub participants: Vec<AgentProfile>,
    #[serde(default)]
    pub config: OrchestratorConfig,
}

impl EvaluationRequest {
    pub fn new(content: impl Into<String>, participants: Vec<AgentProfile>) -> Self {
        Self {
            title: None,
            content: content.into(),
            criteria: Vec::new(),
            participants,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_criteria(mut self, criteria: Vec<String>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Checks everything that must hold before any phase runs.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.content.trim().is_empty() {
            return Err(ConfigurationError::EmptyContent);
        }
        if self.participants.is_empty() {
            return Err(ConfigurationError::NoParticipants);
        }
        let mut seen = BTreeSet::new();
        for participant in &self.participants {
            if participant.id.is_coordinator() {
                return Err(ConfigurationError::ReservedParticipant(
                    participant.id.to_string(),
                ));
            }
            if !seen.insert(&participant.id) {
                return Err(ConfigurationError::DuplicateParticipant(
                    participant.id.to_string(),
                ));
            }
            if let Some(reputation) = &participant.reputation {
                reputation.validate()?;
            }
        }
        self.config.validate()
    }
}

/// Where and why a session failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub phase: SessionPhase,
    pub round: u32,
    pub reason: String,
}

/// Snapshot returned by progress polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationProgress {
    pub session_id: SessionId,
    pub phase: SessionPhase,
    pub current_round: u32,
    pub total_rounds: u32,
    pub scores_received: usize,
    pub total_agents: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SessionFailure>,
}

/// One evaluation run, owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSession {
    id: SessionId,
    title: String,
    content: String,
    criteria: Vec<String>,
    participants: Vec<AgentProfile>,
    config: OrchestratorConfig,
    phase: SessionPhase,
    current_round: u32,
    log: Option<LogHandle>,
    rounds: Vec<EvaluationRound>,
    scores_received: usize,
    failed_agents: Vec<AgentId>,
    failure: Option<SessionFailure>,
    report: Option<EvaluationReport>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EvaluationSession {
    pub fn new(id: SessionId, request: EvaluationRequest, now: DateTime<Utc>) -> Self {
        let title = request
            .title
            .unwrap_or_else(|| format!("Evaluation {id}"));
        Self {
            id,
            title,
            content: request.content,
            criteria: request.criteria,
            participants: request.participants,
            config: request.config,
            phase: SessionPhase::Initializing,
            current_round: 0,
            log: None,
            rounds: Vec::new(),
            scores_received: 0,
            failed_agents: Vec::new(),
            failure: None,
            report: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    pub fn participants(&self) -> &[AgentProfile] {
        &self.participants
    }

    pub fn participant_ids(&self) -> Vec<AgentId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    pub fn participant(&self, id: &AgentId) -> Option<&AgentProfile> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn log(&self) -> Option<&LogHandle> {
        self.log.as_ref()
    }

    pub fn rounds(&self) -> &[EvaluationRound] {
        &self.rounds
    }

    /// Discussion rounds completed so far.
    pub fn discussion_rounds(&self) -> u32 {
        self.rounds.iter().filter(|r| r.number > 0).count() as u32
    }

    pub fn failed_agents(&self) -> &[AgentId] {
        &self.failed_agents
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    pub fn report(&self) -> Option<&EvaluationReport> {
        self.report.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn metadata(&self) -> LogMetadata {
        LogMetadata {
            title: self.title.clone(),
            participant_count: self.participants.len(),
            round_cap: self.config.planned_rounds(),
        }
    }

    pub fn advance(
        &mut self,
        next: SessionPhase,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn attach_log(&mut self, handle: LogHandle, now: DateTime<Utc>) {
        self.log = Some(handle);
        self.updated_at = now;
    }

    pub fn begin_round(&mut self, number: u32, now: DateTime<Utc>) {
        self.current_round = number;
        self.updated_at = now;
    }

    pub fn record_score(&mut self, now: DateTime<Utc>) {
        self.scores_received += 1;
        self.updated_at = now;
    }

    pub fn record_agent_failure(&mut self, agent: AgentId, now: DateTime<Utc>) {
        if !self.failed_agents.contains(&agent) {
            self.failed_agents.push(agent);
        }
        self.updated_at = now;
    }

    pub fn record_round(&mut self, round: EvaluationRound) {
        self.updated_at = round.ended_at;
        self.rounds.push(round);
    }

    /// Moves to `Failed`, keeping the phase and round where it happened.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        let failure = SessionFailure {
            phase: self.phase,
            round: self.current_round,
            reason: reason.into(),
        };
        self.advance(SessionPhase::Failed, now)?;
        self.failure = Some(failure);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.advance(SessionPhase::Cancelled, now)
    }

    pub fn complete(
        &mut self,
        report: EvaluationReport,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.advance(SessionPhase::Completed, now)?;
        self.report = Some(report);
        Ok(())
    }

    pub fn progress(&self) -> EvaluationProgress {
        EvaluationProgress {
            session_id: self.id.clone(),
            phase: self.phase,
            current_round: self.current_round,
            total_rounds: self.config.planned_rounds(),
            scores_received: self.scores_received,
            total_agents: self.participants.len(),
            failure: self.failure.clone(),
        }
    }
}
