//! Scripted evaluator and log helpers shared by the unit tests.

use crate::message_log::MessageLog;
use crate::ports::evaluator::{DiscussionReply, Evaluation, EvaluationError, Evaluator, PeerScore};
use crate::ports::memory_log::InMemoryLogBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tribunal_domain::{AgentId, AgentProfile, LogHandle, LogMetadata, SessionId};

/// Peers seen by each `discuss` call, in call order.
pub type PeerLog = Arc<Mutex<Vec<(AgentId, Vec<(AgentId, f64)>)>>>;

/// Canned behaviour for one agent.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    score: f64,
    aspects: Vec<(String, f64)>,
    /// Adjusted score returned by the n-th discuss call; the last entry repeats
    adjustments: Vec<f64>,
    fail_evaluation: bool,
    fail_discussion: bool,
    delay: Option<Duration>,
}

impl ScriptedAgent {
    pub fn scoring(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    pub fn adjusting_to(self, score: f64) -> Self {
        self.adjusting_through(vec![score])
    }

    pub fn adjusting_through(mut self, scores: Vec<f64>) -> Self {
        self.adjustments = scores;
        self
    }

    pub fn with_aspect(mut self, criterion: &str, score: f64) -> Self {
        self.aspects.push((criterion.to_string(), score));
        self
    }

    pub fn failing_evaluation(mut self) -> Self {
        self.fail_evaluation = true;
        self
    }

    pub fn failing_discussion(mut self) -> Self {
        self.fail_discussion = true;
        self
    }

    /// Delays every call by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// [`Evaluator`] that answers from [`ScriptedAgent`] scripts.
#[derive(Default)]
pub struct TestEvaluator {
    agents: HashMap<String, ScriptedAgent>,
    discuss_calls: Mutex<HashMap<String, usize>>,
    peers: PeerLog,
}

impl TestEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, id: &str, agent: ScriptedAgent) -> Self {
        self.agents.insert(id.to_string(), agent);
        self
    }

    pub fn peer_log(&self) -> PeerLog {
        Arc::clone(&self.peers)
    }

    fn script(&self, agent: &AgentProfile) -> Result<ScriptedAgent, EvaluationError> {
        self.agents
            .get(agent.id.as_str())
            .cloned()
            .ok_or_else(|| EvaluationError::Provider(format!("no script for {}", agent.id)))
    }
}

#[async_trait]
impl Evaluator for TestEvaluator {
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        _content: &str,
        _criteria: &[String],
    ) -> Result<Evaluation, EvaluationError> {
        let script = self.script(agent)?;
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        if script.fail_evaluation {
            return Err(EvaluationError::Provider("scripted failure".to_string()));
        }
        let mut evaluation = Evaluation::new(script.score, 0.8, format!("{} looked", agent.id));
        for (criterion, score) in script.aspects {
            evaluation = evaluation.with_aspect(criterion, score);
        }
        Ok(evaluation)
    }

    async fn discuss(
        &self,
        agent: &AgentProfile,
        _own_score: f64,
        peers: &[PeerScore],
        _content: &str,
        _criteria: &[String],
    ) -> Result<DiscussionReply, EvaluationError> {
        let script = self.script(agent)?;
        self.peers.lock().unwrap().push((
            agent.id.clone(),
            peers.iter().map(|p| (p.agent_id.clone(), p.score)).collect(),
        ));
        let call = {
            let mut calls = self.discuss_calls.lock().unwrap();
            let count = calls.entry(agent.id.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        if script.fail_discussion {
            return Err(EvaluationError::Provider("scripted failure".to_string()));
        }
        let adjusted = script
            .adjustments
            .get(call)
            .or(script.adjustments.last())
            .copied();
        Ok(match adjusted {
            Some(score) => DiscussionReply::adjusted("moving", score),
            None => DiscussionReply::unchanged("standing firm"),
        })
    }
}

/// A fresh in-memory log with one topic already created.
pub async fn memory_log() -> (MessageLog, LogHandle) {
    let log = MessageLog::new(Arc::new(InMemoryLogBackend::new()));
    let handle = log
        .create_log(
            &SessionId::generate(),
            &LogMetadata {
                title: "test".to_string(),
                participant_count: 2,
                round_cap: 3,
            },
        )
        .await
        .unwrap();
    (log, handle)
}
