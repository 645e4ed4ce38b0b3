//! Audit transcript rebuilt from a session's Message Log.

use super::message::{LoggedMessage, MessageKind};
use crate::core::ids::{AgentId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Messages of one round, plus the participants that left no trace in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRound {
    pub round: u32,
    pub messages: Vec<LoggedMessage>,
    /// Participants with no message this round (failed or timed out)
    pub missing_agents: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: SessionId,
    pub rounds: Vec<TranscriptRound>,
    pub final_message: Option<LoggedMessage>,
    /// Terminal session whose log carries no `final` message
    pub abandoned: bool,
}

impl Transcript {
    /// Groups logged messages by round.
    ///
    /// Rounds `0..=rounds_run` are always present, even when empty, along
    /// with any higher round that appears in the log. Messages within a round
    /// are ordered by sequence number.
    pub fn build(
        session_id: SessionId,
        participants: &[AgentId],
        rounds_run: u32,
        messages: impl IntoIterator<Item = LoggedMessage>,
        terminal: bool,
    ) -> Self {
        let mut by_round: BTreeMap<u32, Vec<LoggedMessage>> =
            (0..=rounds_run).map(|r| (r, Vec::new())).collect();
        let mut final_message = None;

        for logged in messages {
            if logged.message.kind() == MessageKind::Final {
                final_message = Some(logged);
                continue;
            }
            by_round
                .entry(logged.message.round)
                .or_default()
                .push(logged);
        }

        let rounds = by_round
            .into_iter()
            .map(|(round, mut messages)| {
                messages.sort_by_key(|m| m.sequence);
                let present: BTreeSet<&AgentId> =
                    messages.iter().map(|m| &m.message.agent_id).collect();
                let missing_agents = participants
                    .iter()
                    .filter(|id| !present.contains(id))
                    .cloned()
                    .collect();
                TranscriptRound {
                    round,
                    messages,
                    missing_agents,
                }
            })
            .collect();

        let abandoned = terminal && final_message.is_none();
        Self {
            session_id,
            rounds,
            final_message,
            abandoned,
        }
    }

    pub fn message_count(&self) -> usize {
        self.rounds.iter().map(|r| r.messages.len()).sum::<usize>()
            + usize::from(self.final_message.is_some())
    }

    /// `(round, agent)` pairs for every gap in the record.
    pub fn gaps(&self) -> impl Iterator<Item = (u32, &AgentId)> {
        self.rounds
            .iter()
            .flat_map(|r| r.missing_agents.iter().map(move |agent| (r.round, agent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{ConsensusAlgorithm, ConsensusResult};
    use crate::core::agent::AgentProfile;
    use crate::evaluation::message::{AgentMessage, SequenceNumber};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap as Map;

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 0, 0, 0).unwrap()
    }

    fn score(seq: u64, agent: &str, value: f64) -> LoggedMessage {
        LoggedMessage::new(
            SequenceNumber(seq),
            AgentMessage::score(
                &AgentProfile::new(agent, agent),
                ts(),
                value,
                0.9,
                Map::new(),
                "ok",
            ),
        )
    }

    fn discussion(seq: u64, agent: &str, round: u32) -> LoggedMessage {
        LoggedMessage::new(
            SequenceNumber(seq),
            AgentMessage::discussion(&AgentProfile::new(agent, agent), ts(), round, 7.0, "same"),
        )
    }

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::new(*n)).collect()
    }

    #[test]
    fn test_messages_grouped_and_ordered() {
        let transcript = Transcript::build(
            SessionId::new("s"),
            &ids(&["a", "b"]),
            1,
            vec![
                discussion(4, "b", 1),
                score(2, "b", 8.0),
                score(1, "a", 7.0),
                discussion(3, "a", 1),
            ],
            false,
        );
        assert_eq!(transcript.rounds.len(), 2);
        let sequences: Vec<u64> = transcript.rounds[0]
            .messages
            .iter()
            .map(|m| m.sequence.value())
            .collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(transcript.message_count(), 4);
        assert!(!transcript.abandoned);
    }

    #[test]
    fn test_failed_agent_recorded_as_gap() {
        let transcript = Transcript::build(
            SessionId::new("s"),
            &ids(&["a", "b", "c"]),
            0,
            vec![score(1, "a", 7.0), score(2, "c", 9.0)],
            true,
        );
        assert_eq!(transcript.rounds[0].missing_agents, ids(&["b"]));
        let gaps: Vec<_> = transcript.gaps().collect();
        assert_eq!(gaps, vec![(0, &AgentId::new("b"))]);
    }

    #[test]
    fn test_empty_rounds_are_kept() {
        let transcript = Transcript::build(
            SessionId::new("s"),
            &ids(&["a"]),
            2,
            vec![score(1, "a", 5.0)],
            false,
        );
        assert_eq!(transcript.rounds.len(), 3);
        assert!(transcript.rounds[2].messages.is_empty());
        assert_eq!(transcript.rounds[2].missing_agents, ids(&["a"]));
    }

    #[test]
    fn test_final_message_separated_and_abandoned_flag() {
        let result = ConsensusResult::from_scores(
            ConsensusAlgorithm::Median,
            7.0,
            [(AgentId::new("a"), 7.0)].into_iter().collect(),
            0,
        );
        let final_message =
            LoggedMessage::new(SequenceNumber(2), AgentMessage::final_verdict(ts(), 0, &result));

        let completed = Transcript::build(
            SessionId::new("s"),
            &ids(&["a"]),
            0,
            vec![score(1, "a", 7.0), final_message],
            true,
        );
        assert!(completed.final_message.is_some());
        assert_eq!(completed.rounds[0].messages.len(), 1);
        assert!(!completed.abandoned);

        let cancelled = Transcript::build(
            SessionId::new("s"),
            &ids(&["a"]),
            0,
            vec![score(1, "a", 7.0)],
            true,
        );
        assert!(cancelled.abandoned);
    }
}
