//! Agent roster from TOML (`[[agents]]` array)
//!
//! ```toml
//! [[agents]]
//! id = "strict"
//! name = "Strict Reviewer"
//! reputation = { average_rating = 8.5, completed_judgments = 120, success_rate = 0.95 }
//! script = { score = 6.0, pull = 0.3 }
//! ```

use crate::evaluator::AgentScript;
use serde::{Deserialize, Serialize};
use tribunal_domain::{AgentProfile, AgentReputation};

/// One configured judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAgentConfig {
    pub id: String,
    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reputation: Option<AgentReputation>,
    /// Behaviour under the scripted evaluator
    #[serde(default)]
    pub script: AgentScript,
}

impl FileAgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            reputation: None,
            script: AgentScript::default(),
        }
    }

    pub fn to_profile(&self) -> AgentProfile {
        let profile = AgentProfile::new(
            self.id.as_str(),
            self.name.clone().unwrap_or_else(|| self.id.clone()),
        );
        match self.reputation {
            Some(reputation) => profile.with_reputation(reputation),
            None => profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_agents() {
        let toml_str = r#"
[[agents]]
id = "strict"
name = "Strict Reviewer"
reputation = { average_rating = 8.5, completed_judgments = 120, success_rate = 0.95 }
script = { score = 6.0, pull = 0.3 }

[[agents]]
id = "lenient"
"#;
        let config: super::super::FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agents.len(), 2);

        let strict = config.agents[0].to_profile();
        assert_eq!(strict.display_name, "Strict Reviewer");
        assert_eq!(strict.reputation.unwrap().completed_judgments, 120);
        assert_eq!(config.agents[0].script.score, Some(6.0));
        assert_eq!(config.agents[0].script.pull, 0.3);

        let lenient = config.agents[1].to_profile();
        assert_eq!(lenient.display_name, "lenient");
        assert!(lenient.reputation.is_none());
        assert_eq!(config.agents[1].script, AgentScript::default());
    }
}
