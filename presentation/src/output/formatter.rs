//! Output formatter trait

use tribunal_domain::{EvaluationReport, Transcript};

/// Trait for formatting evaluation results
pub trait OutputFormatter {
    /// Format the complete report, one section per judge
    fn format(&self, report: &EvaluationReport) -> String;

    /// Format as JSON
    fn format_json(&self, report: &EvaluationReport) -> String;

    /// Format the verdict only (concise output)
    fn format_summary(&self, report: &EvaluationReport) -> String;

    /// Format the audit transcript of a session
    fn format_transcript(&self, transcript: &Transcript) -> String;
}
