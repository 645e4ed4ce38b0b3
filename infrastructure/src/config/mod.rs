//! Configuration file loading for tribunal
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `TRIBUNAL_*` environment variables
//! 2. `--config <path>` specified file
//! 3. Project root: `./tribunal.toml` or `./.tribunal.toml`
//! 4. Global: `$XDG_CONFIG_HOME/tribunal/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, EvaluatorKind, FileAgentConfig, FileConfig, FileEvaluatorConfig,
    FileLogConfig, FileOrchestratorConfig, FileOutputConfig, FileOutputFormat, FileStoreConfig,
    LogBackendKind, StoreBackendKind,
};
pub use loader::ConfigLoader;
