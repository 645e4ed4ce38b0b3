//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where appropriate.

mod agents;
mod backends;
mod orchestrator;
mod output;

pub use agents::FileAgentConfig;
pub use backends::{
    EvaluatorKind, FileEvaluatorConfig, FileLogConfig, FileStoreConfig, LogBackendKind,
    StoreBackendKind,
};
pub use orchestrator::FileOrchestratorConfig;
pub use output::{FileOutputConfig, FileOutputFormat};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tribunal_domain::ConfigurationError;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("[orchestrator] {0}")]
    Orchestrator(#[from] ConfigurationError),

    #[error("agent id cannot be empty")]
    EmptyAgentId,

    #[error("agent '{0}' is configured more than once")]
    DuplicateAgent(String),

    #[error("[evaluator] kind = \"http\" requires an endpoint")]
    MissingEndpoint,

    #[error("[evaluator] timeout_secs cannot be 0")]
    InvalidTimeout,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Session defaults
    pub orchestrator: FileOrchestratorConfig,
    /// Configured judges
    pub agents: Vec<FileAgentConfig>,
    /// Message log backend
    pub log: FileLogConfig,
    /// Session store backend
    pub store: FileStoreConfig,
    /// Evaluator adapter
    pub evaluator: FileEvaluatorConfig,
    /// Output settings
    pub output: FileOutputConfig,
}

impl FileConfig {
    /// Validate the entire configuration, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.orchestrator.to_orchestrator_config()?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigValidationError::EmptyAgentId);
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigValidationError::DuplicateAgent(agent.id.clone()));
            }
        }

        if self.evaluator.kind == EvaluatorKind::Http && self.evaluator.endpoint.is_none() {
            return Err(ConfigValidationError::MissingEndpoint);
        }
        if self.evaluator.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }
        Ok(())
    }
}
