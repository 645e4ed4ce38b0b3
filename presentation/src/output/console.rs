//! Console output formatter for evaluation results

use crate::output::formatter::OutputFormatter;
use colored::Colorize;
use tribunal_domain::{EvaluationReport, LoggedMessage, MessagePayload, Transcript};

/// Formats evaluation results for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Format the complete report
    pub fn format(report: &EvaluationReport) -> String {
        let mut output = String::new();

        output.push_str(&Self::header("Evaluation Results"));
        output.push('\n');

        output.push_str(&format!(
            "{} {}\n",
            "Session:".cyan().bold(),
            report.session_id
        ));
        output.push_str(&format!(
            "{} {}\n\n",
            "Algorithm:".cyan().bold(),
            report.consensus.algorithm.display_name()
        ));

        output.push_str(&Self::section_header("Judges"));
        for result in &report.agent_results {
            let title = format!(
                "── {} ({:.2} -> {:.2}) ──",
                result.agent_name, result.initial_score, result.final_score
            );
            let title = if result.is_outlier {
                format!("{} {}", title.red().bold(), "[outlier]".red())
            } else {
                title.yellow().bold().to_string()
            };
            output.push_str(&format!("\n{}\n", title));
            output.push_str(&format!(
                "{} {:+.2}\n",
                "Deviation from consensus:".dimmed(),
                result.deviation
            ));
            if !result.feedback.is_empty() {
                output.push_str(&Self::indent(&result.feedback, "  "));
                output.push('\n');
            }
            if !result.strengths.is_empty() {
                output.push_str(&format!("{}\n", "Strengths:".green()));
                for item in &result.strengths {
                    output.push_str(&format!("  * {}\n", item));
                }
            }
            if !result.improvements.is_empty() {
                output.push_str(&format!("{}\n", "Improvements:".yellow()));
                for item in &result.improvements {
                    output.push_str(&format!("  * {}\n", item));
                }
            }
        }

        if !report.failed_agents.is_empty() {
            output.push_str(&format!(
                "\n{} {}\n",
                "No score from:".red().bold(),
                report
                    .failed_agents
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        output.push_str(&Self::section_header("Consensus"));
        output.push_str(&Self::verdict_lines(report));

        if !report.consensus.excluded_agents.is_empty() {
            output.push_str(&format!(
                "{} {}\n",
                "Excluded as outliers:".yellow().bold(),
                report
                    .consensus
                    .excluded_agents
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(report: &EvaluationReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    /// Format the verdict only (concise output)
    pub fn format_summary(report: &EvaluationReport) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n\n", "=== Tribunal Verdict ===".cyan().bold()));
        output.push_str(&Self::verdict_lines(report));
        output.push_str(&format!(
            "{} {}\n",
            "Judges:".dimmed(),
            report
                .agent_results
                .iter()
                .map(|r| format!("{} {:.2}", r.agent_name, r.final_score))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        output
    }

    /// Format a transcript round by round
    pub fn format_transcript(transcript: &Transcript) -> String {
        let mut output = String::new();
        output.push_str(&Self::header("Transcript"));
        output.push('\n');
        output.push_str(&format!(
            "{} {}\n",
            "Session:".cyan().bold(),
            transcript.session_id
        ));

        for round in &transcript.rounds {
            let title = if round.round == 0 {
                "Round 0: Independent Scores".to_string()
            } else {
                format!("Round {}: Discussion", round.round)
            };
            output.push_str(&Self::section_header(&title));
            for logged in &round.messages {
                output.push_str(&Self::message_line(logged));
            }
            for missing in &round.missing_agents {
                output.push_str(&format!("  {} {} (no message)\n", "x".red(), missing));
            }
        }

        match &transcript.final_message {
            Some(logged) => {
                output.push_str(&Self::section_header("Verdict"));
                output.push_str(&Self::message_line(logged));
            }
            None if transcript.abandoned => {
                output.push_str(&format!(
                    "\n{}\n",
                    "Session ended without a verdict.".red().bold()
                ));
            }
            None => {
                output.push_str(&format!("\n{}\n", "Session still running.".dimmed()));
            }
        }

        output.push_str(&Self::footer());
        output
    }

    /// Format a transcript as JSON
    pub fn format_transcript_json(transcript: &Transcript) -> String {
        serde_json::to_string_pretty(transcript).unwrap_or_else(|_| "{}".to_string())
    }

    fn verdict_lines(report: &EvaluationReport) -> String {
        let consensus = &report.consensus;
        let mut output = format!(
            "{} {}\n",
            "Final score:".green().bold(),
            format!("{:.2} / 10", consensus.final_score).bold()
        );
        output.push_str(&format!(
            "{} {:.0}%  {} {:.3}\n",
            "Confidence:".cyan(),
            consensus.confidence * 100.0,
            "Variance:".cyan(),
            consensus.variance
        ));
        output.push_str(&format!(
            "{} {}  {} {:.0}%\n",
            "Discussion rounds:".cyan(),
            report.rounds_completed,
            "Convergence:".cyan(),
            report.convergence * 100.0
        ));
        output
    }

    fn message_line(logged: &LoggedMessage) -> String {
        let message = &logged.message;
        let body = match &message.payload {
            MessagePayload::Score {
                score,
                confidence,
                reasoning,
                ..
            } => format!(
                "scored {:.2} (confidence {:.2}): {}",
                score, confidence, reasoning
            ),
            MessagePayload::Discussion { score, text } => {
                format!("kept {:.2}: {}", score, text)
            }
            MessagePayload::Adjustment {
                original_score,
                adjusted_score,
                text,
            } => format!(
                "adjusted {:.2} -> {:.2}: {}",
                original_score, adjusted_score, text
            ),
            MessagePayload::Final {
                final_score,
                algorithm,
                convergence_rounds,
                ..
            } => format!(
                "{:.2} by {} after {} round(s)",
                final_score,
                algorithm.display_name(),
                convergence_rounds
            ),
        };
        format!(
            "  {} {} {}\n",
            logged.sequence.to_string().dimmed(),
            message.agent_name.yellow(),
            body
        )
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("\n{}\n", "=".repeat(60).cyan())
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format(&self, report: &EvaluationReport) -> String {
        Self::format(report)
    }

    fn format_json(&self, report: &EvaluationReport) -> String {
        Self::format_json(report)
    }

    fn format_summary(&self, report: &EvaluationReport) -> String {
        Self::format_summary(report)
    }

    fn format_transcript(&self, transcript: &Transcript) -> String {
        Self::format_transcript(transcript)
    }
}
