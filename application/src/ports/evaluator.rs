//! Evaluator port
//!
//! Defines the interface to the external capability that actually judges
//! content. Implementations (adapters) live in the infrastructure layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tribunal_domain::{AgentId, AgentProfile};

/// Errors from a single agent's evaluator call.
///
/// Recoverable: the orchestrator drops the agent from the current phase and
/// carries on with the others.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Independent evaluation of content by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score in `[0, 10]`
    pub score: f64,
    pub reasoning: String,
    /// Self-reported confidence in `[0, 1]`
    pub confidence: f64,
    /// Per-criterion scores
    #[serde(default)]
    pub aspects: BTreeMap<String, f64>,
}

impl Evaluation {
    pub fn new(score: f64, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
            confidence,
            aspects: BTreeMap::new(),
        }
    }

    pub fn with_aspect(mut self, criterion: impl Into<String>, score: f64) -> Self {
        self.aspects.insert(criterion.into(), score);
        self
    }

    /// Rejects scores outside `[0, 10]` and confidence outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        validate_score(self.score)?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EvaluationError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Another agent's current score, as shown during discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerScore {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub score: f64,
}

/// An agent's contribution to a discussion round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionReply {
    pub discussion: String,
    /// `None` means "no change"
    #[serde(default)]
    pub adjusted_score: Option<f64>,
}

impl DiscussionReply {
    pub fn unchanged(discussion: impl Into<String>) -> Self {
        Self {
            discussion: discussion.into(),
            adjusted_score: None,
        }
    }

    pub fn adjusted(discussion: impl Into<String>, score: f64) -> Self {
        Self {
            discussion: discussion.into(),
            adjusted_score: Some(score),
        }
    }

    pub fn validate(&self) -> Result<(), EvaluationError> {
        match self.adjusted_score {
            Some(score) => validate_score(score),
            None => Ok(()),
        }
    }
}

fn validate_score(score: f64) -> Result<(), EvaluationError> {
    if (0.0..=10.0).contains(&score) {
        Ok(())
    } else {
        Err(EvaluationError::InvalidResponse(format!(
            "score {score} outside [0, 10]"
        )))
    }
}

/// External judge capability.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Scores `content` against `criteria` on behalf of `agent`.
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        content: &str,
        criteria: &[String],
    ) -> Result<Evaluation, EvaluationError>;

    /// Lets `agent` reconsider `own_score` after seeing `peers`.
    async fn discuss(
        &self,
        agent: &AgentProfile,
        own_score: f64,
        peers: &[PeerScore],
        content: &str,
        criteria: &[String],
    ) -> Result<DiscussionReply, EvaluationError>;
}
