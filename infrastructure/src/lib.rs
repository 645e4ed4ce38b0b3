//! Infrastructure layer for tribunal
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod config;
pub mod evaluator;
pub mod log;
pub mod store;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, EvaluatorKind, FileAgentConfig, FileConfig,
    FileOrchestratorConfig, FileOutputConfig, FileOutputFormat, LogBackendKind, StoreBackendKind,
};
#[cfg(feature = "http")]
pub use evaluator::HttpEvaluator;
pub use evaluator::{AgentScript, ScriptedEvaluator};
pub use log::{InMemoryLogBackend, JsonlLogBackend};
pub use store::{InMemorySessionStore, JsonFileSessionStore};
