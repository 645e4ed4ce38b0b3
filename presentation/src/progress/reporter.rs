//! Progress reporting while an evaluation runs

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;
use tribunal_application::ports::progress::ProgressNotifier;
use tribunal_domain::{AgentProfile, SessionPhase};

/// Reports progress with one progress bar per phase
pub struct ProgressReporter {
    multi: MultiProgress,
    phase_bar: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            phase_bar: Mutex::new(None),
        }
    }

    fn phase_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn set_bar(&self, bar: Option<ProgressBar>) -> Option<ProgressBar> {
        match self.phase_bar.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, bar),
            Err(_) => None,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.phase_bar.lock()
            && let Some(pb) = guard.as_ref()
        {
            f(pb);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier for ProgressReporter {
    fn on_phase_start(&self, phase: SessionPhase, total_tasks: usize) {
        let pb = self.multi.add(ProgressBar::new(total_tasks as u64));
        pb.set_style(Self::phase_style());
        pb.set_prefix(phase.display_name().to_string());
        pb.set_message("Starting...");

        if let Some(previous) = self.set_bar(Some(pb)) {
            previous.finish_and_clear();
        }
    }

    fn on_agent_complete(&self, _phase: SessionPhase, agent: &AgentProfile, success: bool) {
        self.with_bar(|pb| {
            let status = if success {
                format!("{} {}", "v".green(), agent.display_name)
            } else {
                format!("{} {}", "x".red(), agent.display_name)
            };
            pb.set_message(status);
            pb.inc(1);
        });
    }

    fn on_round_complete(&self, round: u32, variance: f64) {
        self.with_bar(|pb| {
            pb.set_message(format!("round {} variance {:.3}", round, variance));
        });
    }

    fn on_phase_complete(&self, phase: SessionPhase) {
        if let Some(pb) = self.set_bar(None) {
            pb.finish_with_message(format!("{} complete!", phase.display_name().green()));
        }
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl ProgressNotifier for SimpleProgress {
    fn on_phase_start(&self, phase: SessionPhase, total_tasks: usize) {
        println!(
            "{} {} ({} tasks)",
            "->".cyan(),
            phase.display_name().bold(),
            total_tasks
        );
    }

    fn on_agent_complete(&self, _phase: SessionPhase, agent: &AgentProfile, success: bool) {
        if success {
            println!("  {} {}", "v".green(), agent.display_name);
        } else {
            println!("  {} {} (failed)", "x".red(), agent.display_name);
        }
    }

    fn on_round_complete(&self, round: u32, variance: f64) {
        println!("  {} round {} variance {:.3}", "~".cyan(), round, variance);
    }

    fn on_phase_complete(&self, _phase: SessionPhase) {
        println!();
    }
}
