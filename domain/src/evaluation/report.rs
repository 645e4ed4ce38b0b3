//! Per-agent results and the final evaluation report.

use crate::consensus::{ConsensusResult, ScoreMap};
use crate::core::agent::AgentProfile;
use crate::core::ids::{AgentId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aspect scores at or above this are reported as strengths.
pub const STRENGTH_THRESHOLD: f64 = 7.0;
/// Aspect scores below this are reported as improvements.
pub const IMPROVEMENT_THRESHOLD: f64 = 5.0;
/// Consensus variance below this earns a "strong agreement" note.
pub const AGREEMENT_VARIANCE: f64 = 1.0;
/// Consensus variance above this earns a "significant disagreement" note.
pub const DISAGREEMENT_VARIANCE: f64 = 4.0;

/// Outcome for one participating agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: AgentId,
    pub agent_name: String,
    /// Independent score from round 0
    pub initial_score: f64,
    /// Score after discussion
    pub final_score: f64,
    /// `final_score - consensus score`
    pub deviation: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub is_outlier: bool,
}

impl AgentResult {
    pub fn derive(
        agent: &AgentProfile,
        initial_score: f64,
        final_score: f64,
        aspects: &BTreeMap<String, f64>,
        consensus: &ConsensusResult,
    ) -> Self {
        let deviation = final_score - consensus.final_score;

        let mut strengths: Vec<String> = aspects
            .iter()
            .filter(|(_, score)| **score >= STRENGTH_THRESHOLD)
            .map(|(criterion, score)| format!("Strong {criterion} ({score:.1}/10)"))
            .collect();
        if consensus.variance < AGREEMENT_VARIANCE {
            strengths.push("Strong agreement among judges".to_string());
        }

        let mut improvements: Vec<String> = aspects
            .iter()
            .filter(|(_, score)| **score < IMPROVEMENT_THRESHOLD)
            .map(|(criterion, score)| format!("Improve {criterion} ({score:.1}/10)"))
            .collect();
        if consensus.variance > DISAGREEMENT_VARIANCE {
            improvements.push(
                "Significant disagreement among judges; consider a closer review".to_string(),
            );
        }

        let feedback = format!(
            "Consensus score {:.2} via {}. {} scored {:.2} ({:+.2} from consensus).",
            consensus.final_score,
            consensus.algorithm.display_name(),
            agent.display_name,
            final_score,
            deviation
        );

        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.display_name.clone(),
            initial_score,
            final_score,
            deviation,
            feedback,
            strengths,
            improvements,
            is_outlier: consensus.excluded_agents.contains(&agent.id),
        }
    }
}

/// Result of a completed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub session_id: SessionId,
    pub consensus: ConsensusResult,
    pub agent_results: Vec<AgentResult>,
    /// Agents that never produced an independent score
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_agents: Vec<AgentId>,
    /// Discussion rounds actually run
    pub rounds_completed: u32,
    /// Fraction of the initial disagreement removed by discussion
    pub convergence: f64,
}

/// Per-agent inputs gathered by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct AgentScores<'a> {
    pub initial: &'a ScoreMap,
    pub current: &'a ScoreMap,
    pub aspects: &'a BTreeMap<AgentId, BTreeMap<String, f64>>,
}

/// Builds one [`AgentResult`] per agent that scored, in participant order.
pub fn build_agent_results(
    participants: &[AgentProfile],
    scores: AgentScores<'_>,
    consensus: &ConsensusResult,
) -> Vec<AgentResult> {
    let no_aspects = BTreeMap::new();
    participants
        .iter()
        .filter_map(|agent| {
            let initial = *scores.initial.get(&agent.id)?;
            let current = scores.current.get(&agent.id).copied().unwrap_or(initial);
            let aspects = scores.aspects.get(&agent.id).unwrap_or(&no_aspects);
            Some(AgentResult::derive(
                agent, initial, current, aspects, consensus,
            ))
        })
        .collect()
}
