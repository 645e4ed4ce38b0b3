//! Message Log entries.
//!
//! Every step of an evaluation is published as an immutable [`AgentMessage`].
//! The log assigns each appended message a [`SequenceNumber`]; readers see
//! them as [`LoggedMessage`]s.

use crate::consensus::{ConsensusAlgorithm, ConsensusResult, ScoreMap};
use crate::core::agent::AgentProfile;
use crate::core::ids::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Independent score from round 0
    Score,
    /// Discussion contribution that left the score unchanged
    Discussion,
    /// Discussion contribution that revised the score
    Adjustment,
    /// Consensus verdict, at most once per session
    Final,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Score => "score",
            MessageKind::Discussion => "discussion",
            MessageKind::Adjustment => "adjustment",
            MessageKind::Final => "final",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific payload of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    Score {
        score: f64,
        confidence: f64,
        #[serde(default)]
        aspects: BTreeMap<String, f64>,
        reasoning: String,
    },
    Discussion {
        score: f64,
        text: String,
    },
    Adjustment {
        original_score: f64,
        adjusted_score: f64,
        text: String,
    },
    Final {
        final_score: f64,
        algorithm: ConsensusAlgorithm,
        individual_scores: ScoreMap,
        convergence_rounds: u32,
        confidence: f64,
        variance: f64,
    },
}

/// An immutable entry in a session's Message Log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    pub round: u32,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

impl AgentMessage {
    /// Independent score produced in round 0.
    pub fn score(
        agent: &AgentProfile,
        timestamp: DateTime<Utc>,
        score: f64,
        confidence: f64,
        aspects: BTreeMap<String, f64>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.display_name.clone(),
            timestamp,
            round: 0,
            payload: MessagePayload::Score {
                score,
                confidence,
                aspects,
                reasoning: reasoning.into(),
            },
        }
    }

    pub fn discussion(
        agent: &AgentProfile,
        timestamp: DateTime<Utc>,
        round: u32,
        score: f64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.display_name.clone(),
            timestamp,
            round,
            payload: MessagePayload::Discussion {
                score,
                text: text.into(),
            },
        }
    }

    pub fn adjustment(
        agent: &AgentProfile,
        timestamp: DateTime<Utc>,
        round: u32,
        original_score: f64,
        adjusted_score: f64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.display_name.clone(),
            timestamp,
            round,
            payload: MessagePayload::Adjustment {
                original_score,
                adjusted_score,
                text: text.into(),
            },
        }
    }

    /// Consensus verdict, attributed to the coordinator.
    pub fn final_verdict(timestamp: DateTime<Utc>, round: u32, result: &ConsensusResult) -> Self {
        Self {
            agent_id: AgentId::coordinator(),
            agent_name: "Coordinator".to_string(),
            timestamp,
            round,
            payload: MessagePayload::Final {
                final_score: result.final_score,
                algorithm: result.algorithm,
                individual_scores: result.individual_scores.clone(),
                convergence_rounds: result.convergence_rounds,
                confidence: result.confidence,
                variance: result.variance,
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.payload {
            MessagePayload::Score { .. } => MessageKind::Score,
            MessagePayload::Discussion { .. } => MessageKind::Discussion,
            MessagePayload::Adjustment { .. } => MessageKind::Adjustment,
            MessagePayload::Final { .. } => MessageKind::Final,
        }
    }

    /// The agent's score as of this message, if it carries one.
    pub fn current_score(&self) -> Option<f64> {
        match &self.payload {
            MessagePayload::Score { score, .. } => Some(*score),
            MessagePayload::Discussion { score, .. } => Some(*score),
            MessagePayload::Adjustment { adjusted_score, .. } => Some(*adjusted_score),
            MessagePayload::Final { .. } => None,
        }
    }

    /// Per-criterion aspect scores (only present on `score` messages).
    pub fn aspects(&self) -> Option<&BTreeMap<String, f64>> {
        match &self.payload {
            MessagePayload::Score { aspects, .. } => Some(aspects),
            _ => None,
        }
    }
}

/// Monotonically increasing marker assigned by the log on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message as read back from the log, with its sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub sequence: SequenceNumber,
    pub message: AgentMessage,
}

impl LoggedMessage {
    pub fn new(sequence: SequenceNumber, message: AgentMessage) -> Self {
        Self { sequence, message }
    }
}
