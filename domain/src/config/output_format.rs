//! Output format value object

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How an evaluation result is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Consensus, per-agent results and round history
    Full,
    /// Consensus score and per-agent scores only (default)
    #[default]
    Summary,
    /// The report as JSON
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Full => "full",
            OutputFormat::Summary => "summary",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(OutputFormat::Full),
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}
