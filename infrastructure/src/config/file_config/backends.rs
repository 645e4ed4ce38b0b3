//! Backend selection from TOML (`[log]`, `[store]`, `[evaluator]` sections)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_DIR: &str = "tribunal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackendKind {
    #[default]
    Memory,
    Jsonl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    #[default]
    Scripted,
    Http,
}

/// Message log backend (`[log]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    pub backend: LogBackendKind,
    /// Directory for JSONL topics (defaults to the platform data dir)
    pub dir: Option<PathBuf>,
}

impl FileLogConfig {
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR).join("logs")))
    }
}

/// Session store backend (`[store]`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStoreConfig {
    pub backend: StoreBackendKind,
    /// Directory for session documents (defaults to the platform data dir)
    pub dir: Option<PathBuf>,
}

impl FileStoreConfig {
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR).join("sessions")))
    }
}

/// Evaluator adapter (`[evaluator]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileEvaluatorConfig {
    pub kind: EvaluatorKind,
    /// Base URL of the judging service (http only)
    pub endpoint: Option<String>,
    /// Per-request timeout in seconds (http only)
    pub timeout_secs: u64,
}

impl Default for FileEvaluatorConfig {
    fn default() -> Self {
        Self {
            kind: EvaluatorKind::default(),
            endpoint: None,
            timeout_secs: 30,
        }
    }
}
