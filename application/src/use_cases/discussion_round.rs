//! Discussion Round Driver
//!
//! Runs exactly one discussion round: every active agent sees the peer
//! scores from the start of the round, may revise its own, and the outcome is
//! published to the Message Log as a `discussion` or `adjustment` message.

use crate::message_log::MessageLog;
use crate::ports::clock::Clock;
use crate::ports::evaluator::{DiscussionReply, EvaluationError, Evaluator, PeerScore};
use crate::ports::log_backend::LogError;
use crate::ports::progress::ProgressNotifier;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tribunal_domain::{
    AgentId, AgentMessage, AgentProfile, DiscussionMode, LogHandle, LoggedMessage,
    MAX_ROUND_TIMEOUT, ScoreMap, SessionPhase,
};

/// Slack added to the dead-band so that a change of exactly the dead-band
/// survives floating-point noise (`0.4 - 0.3 > 0.1` in binary).
const DEAD_BAND_TOLERANCE: f64 = 1e-9;

/// Deadline `timeout` from now. Timeouts past what `Instant` can represent
/// are capped at [`MAX_ROUND_TIMEOUT`].
pub(crate) fn round_deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_ROUND_TIMEOUT))
        .unwrap_or(now)
}

#[derive(Error, Debug)]
pub enum DiscussionRoundError {
    #[error("Log append failed: {0}")]
    Log(#[from] LogError),

    #[error("Discussion round cancelled")]
    Cancelled,
}

/// Everything one round needs.
#[derive(Debug, Clone)]
pub struct DiscussionRoundInput<'a> {
    pub round: u32,
    pub log: &'a LogHandle,
    pub content: &'a str,
    pub criteria: &'a [String],
    /// Agents taking part; only those with a score in `scores` are asked.
    pub agents: &'a [AgentProfile],
    /// Scores at the start of the round
    pub scores: &'a ScoreMap,
    pub mode: DiscussionMode,
    pub dead_band: f64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscussionRoundOutput {
    /// Scores at the end of the round
    pub scores: ScoreMap,
    /// Messages published this round, in append order
    pub messages: Vec<LoggedMessage>,
    /// Agents whose call failed or timed out ("no change")
    pub failed: Vec<AgentId>,
}

/// Whether moving from `current` to `adjusted` is an adjustment.
pub fn exceeds_dead_band(current: f64, adjusted: f64, dead_band: f64) -> bool {
    (adjusted - current).abs() > dead_band + DEAD_BAND_TOLERANCE
}

type CallOutcome = (AgentProfile, f64, Result<DiscussionReply, EvaluationError>);

pub struct DiscussionRoundDriver {
    evaluator: Arc<dyn Evaluator>,
    log: MessageLog,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressNotifier>,
}

impl DiscussionRoundDriver {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        log: MessageLog,
        clock: Arc<dyn Clock>,
        progress: Arc<dyn ProgressNotifier>,
    ) -> Self {
        Self {
            evaluator,
            log,
            clock,
            progress,
        }
    }

    pub async fn run(
        &self,
        input: DiscussionRoundInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<DiscussionRoundOutput, DiscussionRoundError> {
        let participants: Vec<(AgentProfile, f64)> = input
            .agents
            .iter()
            .filter_map(|agent| {
                input
                    .scores
                    .get(&agent.id)
                    .map(|score| (agent.clone(), *score))
            })
            .collect();

        info!(
            "Discussion round {} with {} agents ({})",
            input.round,
            participants.len(),
            input.mode
        );

        let deadline = round_deadline(input.timeout);
        let mut output = DiscussionRoundOutput {
            scores: input.scores.clone(),
            messages: Vec::new(),
            failed: Vec::new(),
        };

        match input.mode {
            DiscussionMode::Sequential => {
                for (agent, own_score) in participants {
                    if Instant::now() >= deadline {
                        self.record_timeout(&mut output, &agent);
                        continue;
                    }
                    let mut calls = JoinSet::new();
                    self.spawn_call(&mut calls, &input, agent.clone(), own_score);
                    let outcomes = Self::collect(&mut calls, deadline, cancel).await?;
                    if outcomes.is_empty() {
                        self.record_timeout(&mut output, &agent);
                    }
                    for outcome in outcomes {
                        self.apply(&mut output, &input, outcome, cancel).await?;
                    }
                }
            }
            DiscussionMode::Concurrent => {
                let mut calls = JoinSet::new();
                for (agent, own_score) in &participants {
                    self.spawn_call(&mut calls, &input, agent.clone(), *own_score);
                }
                let outcomes = Self::collect(&mut calls, deadline, cancel).await?;
                for (agent, _) in &participants {
                    if !outcomes.iter().any(|(a, ..)| a.id == agent.id) {
                        self.record_timeout(&mut output, agent);
                    }
                }
                for outcome in outcomes {
                    self.apply(&mut output, &input, outcome, cancel).await?;
                }
            }
        }

        Ok(output)
    }

    fn spawn_call(
        &self,
        calls: &mut JoinSet<CallOutcome>,
        input: &DiscussionRoundInput<'_>,
        agent: AgentProfile,
        own_score: f64,
    ) {
        let peers: Vec<PeerScore> = input
            .agents
            .iter()
            .filter(|peer| peer.id != agent.id)
            .filter_map(|peer| {
                input.scores.get(&peer.id).map(|score| PeerScore {
                    agent_id: peer.id.clone(),
                    agent_name: peer.display_name.clone(),
                    score: *score,
                })
            })
            .collect();

        let evaluator = Arc::clone(&self.evaluator);
        let content = input.content.to_string();
        let criteria = input.criteria.to_vec();

        calls.spawn(async move {
            let reply = evaluator
                .discuss(&agent, own_score, &peers, &content, &criteria)
                .await
                .and_then(|reply| reply.validate().map(|_| reply));
            (agent, own_score, reply)
        });
    }

    /// Joins calls until all are done or the deadline passes. Stragglers are
    /// detached so they finish on their own and their results are dropped.
    async fn collect(
        calls: &mut JoinSet<CallOutcome>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Vec<CallOutcome>, DiscussionRoundError> {
        let mut outcomes = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    calls.detach_all();
                    return Err(DiscussionRoundError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    calls.detach_all();
                    break;
                }
                joined = calls.join_next() => match joined {
                    Some(Ok(outcome)) => outcomes.push(outcome),
                    Some(Err(e)) => warn!("Discussion task join error: {}", e),
                    None => break,
                }
            }
        }
        Ok(outcomes)
    }

    fn record_timeout(&self, output: &mut DiscussionRoundOutput, agent: &AgentProfile) {
        warn!("Agent {} did not answer before the round timeout", agent.id);
        self.progress
            .on_agent_complete(SessionPhase::Discussing, agent, false);
        output.failed.push(agent.id.clone());
    }

    async fn apply(
        &self,
        output: &mut DiscussionRoundOutput,
        input: &DiscussionRoundInput<'_>,
        (agent, own_score, reply): CallOutcome,
        cancel: &CancellationToken,
    ) -> Result<(), DiscussionRoundError> {
        if cancel.is_cancelled() {
            return Err(DiscussionRoundError::Cancelled);
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Agent {} discussion failed: {}", agent.id, e);
                self.progress
                    .on_agent_complete(SessionPhase::Discussing, &agent, false);
                output.failed.push(agent.id.clone());
                return Ok(());
            }
        };

        let now = self.clock.now();
        let message = match reply.adjusted_score {
            Some(adjusted) if exceeds_dead_band(own_score, adjusted, input.dead_band) => {
                debug!(
                    "Agent {} adjusts {:.2} -> {:.2}",
                    agent.id, own_score, adjusted
                );
                output.scores.insert(agent.id.clone(), adjusted);
                AgentMessage::adjustment(
                    &agent,
                    now,
                    input.round,
                    own_score,
                    adjusted,
                    reply.discussion,
                )
            }
            _ => AgentMessage::discussion(&agent, now, input.round, own_score, reply.discussion),
        };

        let logged = self.log.append_logged(input.log, message).await?;
        output.messages.push(logged);
        self.progress
            .on_agent_complete(SessionPhase::Discussing, &agent, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::clock::SystemClock;
    use crate::ports::progress::NoProgress;
    use crate::test_support::{ScriptedAgent, TestEvaluator, memory_log};
    use tribunal_domain::{MessageKind, MessagePayload};

    fn agents(ids: &[&str]) -> Vec<AgentProfile> {
        ids.iter().map(|id| AgentProfile::new(*id, *id)).collect()
    }

    fn scores(values: &[(&str, f64)]) -> ScoreMap {
        values
            .iter()
            .map(|(id, s)| (AgentId::new(*id), *s))
            .collect()
    }

    async fn run_round(
        evaluator: TestEvaluator,
        agents: &[AgentProfile],
        start: &ScoreMap,
        mode: DiscussionMode,
    ) -> DiscussionRoundOutput {
        let (log, handle) = memory_log().await;
        let driver = DiscussionRoundDriver::new(
            Arc::new(evaluator),
            log,
            Arc::new(SystemClock),
            Arc::new(NoProgress),
        );
        driver
            .run(
                DiscussionRoundInput {
                    round: 1,
                    log: &handle,
                    content: "content",
                    criteria: &[],
                    agents,
                    scores: start,
                    mode,
                    dead_band: 0.1,
                    timeout: Duration::from_secs(5),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_dead_band_boundary_is_exclusive() {
        assert!(!exceeds_dead_band(7.0, 7.1, 0.1));
        assert!(!exceeds_dead_band(0.3, 0.4, 0.1));
        assert!(exceeds_dead_band(7.0, 7.11, 0.1));
        assert!(exceeds_dead_band(7.0, 6.89, 0.1));
    }

    #[tokio::test]
    async fn test_exact_dead_band_produces_discussion_only() {
        let evaluator = TestEvaluator::new()
            .with_agent("a", ScriptedAgent::scoring(7.0).adjusting_to(7.1))
            .with_agent("b", ScriptedAgent::scoring(8.0).adjusting_to(8.11));
        let output = run_round(
            evaluator,
            &agents(&["a", "b"]),
            &scores(&[("a", 7.0), ("b", 8.0)]),
            DiscussionMode::Sequential,
        )
        .await;

        let kinds: Vec<_> = output.messages.iter().map(|m| m.message.kind()).collect();
        assert_eq!(kinds, vec![MessageKind::Discussion, MessageKind::Adjustment]);
        assert_eq!(output.scores[&AgentId::new("a")], 7.0);
        assert_eq!(output.scores[&AgentId::new("b")], 8.11);
    }

    #[tokio::test]
    async fn test_adjustment_references_current_score() {
        let evaluator = TestEvaluator::new()
            .with_agent("a", ScriptedAgent::scoring(4.0).adjusting_to(6.0))
            .with_agent("b", ScriptedAgent::scoring(8.0));
        let output = run_round(
            evaluator,
            &agents(&["a", "b"]),
            &scores(&[("a", 4.5), ("b", 8.0)]),
            DiscussionMode::Concurrent,
        )
        .await;

        let adjustment = output
            .messages
            .iter()
            .find(|m| m.message.kind() == MessageKind::Adjustment)
            .unwrap();
        match &adjustment.message.payload {
            MessagePayload::Adjustment {
                original_score,
                adjusted_score,
                ..
            } => {
                assert_eq!(*original_score, 4.5);
                assert_eq!(*adjusted_score, 6.0);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_is_no_change_for_that_agent() {
        let evaluator = TestEvaluator::new()
            .with_agent("a", ScriptedAgent::scoring(5.0).failing_discussion())
            .with_agent("b", ScriptedAgent::scoring(9.0).adjusting_to(7.0));
        let output = run_round(
            evaluator,
            &agents(&["a", "b"]),
            &scores(&[("a", 5.0), ("b", 9.0)]),
            DiscussionMode::Sequential,
        )
        .await;

        assert_eq!(output.failed, vec![AgentId::new("a")]);
        assert_eq!(output.messages.len(), 1);
        assert_eq!(output.scores[&AgentId::new("a")], 5.0);
        assert_eq!(output.scores[&AgentId::new("b")], 7.0);
    }

    #[tokio::test]
    async fn test_agents_see_round_start_snapshot() {
        let evaluator = TestEvaluator::new()
            .with_agent("a", ScriptedAgent::scoring(2.0).adjusting_to(6.0))
            .with_agent("b", ScriptedAgent::scoring(8.0));
        let recorder = evaluator.peer_log();
        run_round(
            evaluator,
            &agents(&["a", "b"]),
            &scores(&[("a", 2.0), ("b", 8.0)]),
            DiscussionMode::Sequential,
        )
        .await;

        // b is asked after a has adjusted, but still sees a's starting score
        let seen = recorder.lock().unwrap();
        let (_, peers) = seen.iter().find(|(agent, _)| agent.as_str() == "b").unwrap();
        assert_eq!(peers, &vec![(AgentId::new("a"), 2.0)]);
    }

    #[tokio::test]
    async fn test_agents_without_score_are_skipped() {
        let evaluator = TestEvaluator::new()
            .with_agent("a", ScriptedAgent::scoring(5.0))
            .with_agent("b", ScriptedAgent::scoring(6.0));
        let output = run_round(
            evaluator,
            &agents(&["a", "b", "c"]),
            &scores(&[("a", 5.0), ("b", 6.0)]),
            DiscussionMode::Concurrent,
        )
        .await;
        assert_eq!(output.messages.len(), 2);
        assert!(output.failed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_agent_times_out_without_blocking_round() {
        let evaluator = TestEvaluator::new()
            .with_agent(
                "slow",
                ScriptedAgent::scoring(5.0)
                    .adjusting_to(9.0)
                    .with_delay(Duration::from_secs(60)),
            )
            .with_agent("fast", ScriptedAgent::scoring(6.0).adjusting_to(7.0));
        let output = run_round(
            evaluator,
            &agents(&["slow", "fast"]),
            &scores(&[("slow", 5.0), ("fast", 6.0)]),
            DiscussionMode::Concurrent,
        )
        .await;

        assert_eq!(output.failed, vec![AgentId::new("slow")]);
        assert_eq!(output.scores[&AgentId::new("slow")], 5.0);
        assert_eq!(output.scores[&AgentId::new("fast")], 7.0);
    }

    #[tokio::test]
    async fn test_cancelled_round_returns_error() {
        let (log, handle) = memory_log().await;
        let driver = DiscussionRoundDriver::new(
            Arc::new(
                TestEvaluator::new()
                    .with_agent("a", ScriptedAgent::scoring(5.0))
                    .with_agent("b", ScriptedAgent::scoring(6.0)),
            ),
            log,
            Arc::new(SystemClock),
            Arc::new(NoProgress),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let agents = agents(&["a", "b"]);
        let start = scores(&[("a", 5.0), ("b", 6.0)]);
        let result = driver
            .run(
                DiscussionRoundInput {
                    round: 1,
                    log: &handle,
                    content: "content",
                    criteria: &[],
                    agents: &agents,
                    scores: &start,
                    mode: DiscussionMode::Concurrent,
                    dead_band: 0.1,
                    timeout: Duration::from_secs(5),
                },
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(DiscussionRoundError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_still_runs_round() {
        let deadline = round_deadline(Duration::from_secs(u64::MAX));
        assert!(deadline > Instant::now());

        let (log, handle) = memory_log().await;
        let driver = DiscussionRoundDriver::new(
            Arc::new(
                TestEvaluator::new()
                    .with_agent("a", ScriptedAgent::scoring(5.0))
                    .with_agent("b", ScriptedAgent::scoring(6.0)),
            ),
            log,
            Arc::new(SystemClock),
            Arc::new(NoProgress),
        );
        let agents = agents(&["a", "b"]);
        let start = scores(&[("a", 5.0), ("b", 6.0)]);
        let output = driver
            .run(
                DiscussionRoundInput {
                    round: 1,
                    log: &handle,
                    content: "content",
                    criteria: &[],
                    agents: &agents,
                    scores: &start,
                    mode: DiscussionMode::Concurrent,
                    dead_band: 0.1,
                    timeout: Duration::MAX,
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(output.failed.is_empty());
        assert_eq!(output.scores.len(), 2);
    }
}
