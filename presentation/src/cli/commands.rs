//! CLI command definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tribunal_domain::OutputFormat;

/// Output format for evaluation results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    /// Full report with every judge
    Full,
    /// Only the verdict
    Summary,
    /// JSON output
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Full => OutputFormat::Full,
            OutputArg::Summary => OutputFormat::Summary,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

/// CLI arguments for tribunal
#[derive(Parser, Debug)]
#[command(name = "tribunal")]
#[command(author, version, about = "Multi-judge evaluation - independent scores, discussion, consensus")]
#[command(long_about = r#"
Tribunal asks several judge agents to score a piece of content and reduces
their scores to a single verdict.

The process has three phases:
1. Independent Scoring: every judge scores the content alone
2. Discussion: judges see each other's scores and may revise theirs
3. Aggregation: a consensus algorithm turns the scores into one verdict

Configuration files are loaded from (in priority order):
1. --config <path>     Explicit config file
2. ./tribunal.toml     Project-level config
3. ~/.config/tribunal/config.toml   Global config

Example:
  tribunal "fn main() { println!(\"hi\") }" -c correctness -c style
  tribunal --file src/lib.rs -a strict -a lenient --algorithm median
  tribunal --file essay.md --rounds 5 --output json --transcript
"#)]
pub struct Cli {
    /// The content to evaluate
    pub content: Option<String>,

    /// Read the content from a file instead
    #[arg(short, long, value_name = "PATH", conflicts_with = "content")]
    pub file: Option<PathBuf>,

    /// Title recorded in the session log
    #[arg(short, long)]
    pub title: Option<String>,

    /// Evaluation criteria (can be specified multiple times)
    #[arg(short, long = "criterion", value_name = "CRITERION")]
    pub criteria: Vec<String>,

    /// Judges to include, by configured id (can be specified multiple times)
    #[arg(short, long = "agent", value_name = "AGENT")]
    pub agents: Vec<String>,

    /// Consensus algorithm (e.g. simple_average, median, delphi_method)
    #[arg(long, value_name = "NAME")]
    pub algorithm: Option<String>,

    /// Maximum number of discussion rounds
    #[arg(long, value_name = "N")]
    pub rounds: Option<u32>,

    /// Skip the discussion phase
    #[arg(long)]
    pub no_discussion: bool,

    /// Exclude outliers before aggregating
    #[arg(long)]
    pub outliers: bool,

    /// Output format (defaults to the configured one, then summary)
    #[arg(short, long, value_enum)]
    pub output: Option<OutputArg>,

    /// Also print the session transcript
    #[arg(long)]
    pub transcript: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    /// Tracing filter directive for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
