//! Deterministic evaluator for demos, dry runs and end-to-end tests.
//!
//! Agents with a configured [`AgentScript`] answer from it. Agents without
//! one get a score derived from a hash of their id and the content, so the
//! same input always produces the same evaluation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;
use tracing::debug;
use tribunal_application::ports::evaluator::{
    DiscussionReply, Evaluation, EvaluationError, Evaluator, PeerScore,
};
use tribunal_domain::{AgentId, AgentProfile};

/// Lowest score produced for unscripted agents.
const HASHED_SCORE_FLOOR: f64 = 4.0;
/// Width of the range unscripted scores fall into.
const HASHED_SCORE_SPAN: u64 = 600;

/// Canned behaviour for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentScript {
    /// Independent score; hashed from the content when absent
    pub score: Option<f64>,
    pub confidence: f64,
    pub aspects: BTreeMap<String, f64>,
    /// Fraction of the distance to the peer mean moved per discussion round
    pub pull: f64,
    pub fail_evaluation: bool,
    pub fail_discussion: bool,
    /// Delay before every answer, in milliseconds
    pub delay_ms: u64,
}

impl Default for AgentScript {
    fn default() -> Self {
        Self {
            score: None,
            confidence: 0.8,
            aspects: BTreeMap::new(),
            pull: 0.5,
            fail_evaluation: false,
            fail_discussion: false,
            delay_ms: 0,
        }
    }
}

impl AgentScript {
    pub fn scoring(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Default::default()
        }
    }

    pub fn with_pull(mut self, pull: f64) -> Self {
        self.pull = pull;
        self
    }

    pub fn with_aspect(mut self, criterion: impl Into<String>, score: f64) -> Self {
        self.aspects.insert(criterion.into(), score);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
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
}

/// [`Evaluator`] answering from scripts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEvaluator {
    scripts: HashMap<AgentId, AgentScript>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, agent: impl Into<AgentId>, script: AgentScript) -> Self {
        self.scripts.insert(agent.into(), script);
        self
    }

    fn script(&self, agent: &AgentId) -> AgentScript {
        self.scripts.get(agent).cloned().unwrap_or_default()
    }
}

fn hashed_score(parts: &[&str]) -> f64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    let offset = (hasher.finish() % HASHED_SCORE_SPAN) as f64 / 100.0;
    round2(HASHED_SCORE_FLOOR + offset)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn pause(script: &AgentScript) {
    if script.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(script.delay_ms)).await;
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        agent: &AgentProfile,
        content: &str,
        criteria: &[String],
    ) -> Result<Evaluation, EvaluationError> {
        let script = self.script(&agent.id);
        pause(&script).await;
        if script.fail_evaluation {
            return Err(EvaluationError::Provider(format!(
                "scripted failure for {}",
                agent.id
            )));
        }

        let score = script
            .score
            .unwrap_or_else(|| hashed_score(&[agent.id.as_str(), content]));
        let mut evaluation = Evaluation::new(
            score,
            script.confidence,
            format!("{} scored the content {:.2}/10", agent.display_name, score),
        );
        for criterion in criteria {
            let aspect = script
                .aspects
                .get(criterion)
                .copied()
                .unwrap_or_else(|| hashed_score(&[agent.id.as_str(), content, criterion]));
            evaluation = evaluation.with_aspect(criterion.clone(), aspect);
        }
        for (criterion, aspect) in &script.aspects {
            evaluation.aspects.entry(criterion.clone()).or_insert(*aspect);
        }
        debug!("Scripted evaluation for {}: {:.2}", agent.id, score);
        Ok(evaluation)
    }

    async fn discuss(
        &self,
        agent: &AgentProfile,
        own_score: f64,
        peers: &[PeerScore],
        _content: &str,
        _criteria: &[String],
    ) -> Result<DiscussionReply, EvaluationError> {
        let script = self.script(&agent.id);
        pause(&script).await;
        if script.fail_discussion {
            return Err(EvaluationError::Provider(format!(
                "scripted discussion failure for {}",
                agent.id
            )));
        }
        if peers.is_empty() {
            return Ok(DiscussionReply::unchanged("No peers to discuss with."));
        }

        let peer_mean = peers.iter().map(|p| p.score).sum::<f64>() / peers.len() as f64;
        let adjusted = round2(own_score + script.pull.clamp(0.0, 1.0) * (peer_mean - own_score))
            .clamp(0.0, 10.0);
        let text = format!(
            "{} sees a peer mean of {:.2} against its own {:.2}.",
            agent.display_name, peer_mean, own_score
        );
        Ok(if adjusted == own_score {
            DiscussionReply::unchanged(text)
        } else {
            DiscussionReply::adjusted(text, adjusted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, score: f64) -> PeerScore {
        PeerScore {
            agent_id: AgentId::new(id),
            agent_name: id.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn test_scripted_score_and_aspects() {
        let evaluator = ScriptedEvaluator::new()
            .with_script("a", AgentScript::scoring(7.5).with_aspect("style", 4.0));
        let evaluation = evaluator
            .evaluate(
                &AgentProfile::new("a", "A"),
                "content",
                &["style".to_string(), "tests".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(evaluation.score, 7.5);
        assert_eq!(evaluation.aspects["style"], 4.0);
        assert!(evaluation.aspects.contains_key("tests"));
        assert!(evaluation.validate().is_ok());
    }

    #[tokio::test]
    async fn test_unscripted_score_is_deterministic_and_in_range() {
        let evaluator = ScriptedEvaluator::new();
        let agent = AgentProfile::new("judge", "Judge");
        let first = evaluator.evaluate(&agent, "abc", &[]).await.unwrap();
        let second = evaluator.evaluate(&agent, "abc", &[]).await.unwrap();
        assert_eq!(first.score, second.score);
        assert!((4.0..10.0).contains(&first.score));
    }

    #[tokio::test]
    async fn test_discussion_moves_toward_peer_mean() {
        let evaluator = ScriptedEvaluator::new();
        let reply = evaluator
            .discuss(
                &AgentProfile::new("a", "A"),
                4.0,
                &[peer("b", 8.0), peer("c", 6.0)],
                "content",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(reply.adjusted_score, Some(5.5));
    }

    #[tokio::test]
    async fn test_zero_pull_keeps_score() {
        let evaluator =
            ScriptedEvaluator::new().with_script("a", AgentScript::scoring(4.0).with_pull(0.0));
        let reply = evaluator
            .discuss(&AgentProfile::new("a", "A"), 4.0, &[peer("b", 9.0)], "", &[])
            .await
            .unwrap();
        assert_eq!(reply.adjusted_score, None);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let evaluator = ScriptedEvaluator::new().with_script(
            "a",
            AgentScript::scoring(5.0)
                .failing_evaluation()
                .failing_discussion(),
        );
        let agent = AgentProfile::new("a", "A");
        assert!(evaluator.evaluate(&agent, "", &[]).await.is_err());
        assert!(
            evaluator
                .discuss(&agent, 5.0, &[peer("b", 1.0)], "", &[])
                .await
                .is_err()
        );
    }
}
