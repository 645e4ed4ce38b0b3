//! Progress notification port
//!
//! Defines the interface for reporting progress while a session runs.

use tribunal_domain::{AgentProfile, SessionPhase};

/// Callback for progress updates during an evaluation
///
/// Implementations live in the presentation layer and can display
/// progress in various ways (console, web UI, etc.)
pub trait ProgressNotifier: Send + Sync {
    /// Called when a phase starts
    fn on_phase_start(&self, phase: SessionPhase, total_tasks: usize);

    /// Called when one agent's call completes within a phase
    fn on_agent_complete(&self, phase: SessionPhase, agent: &AgentProfile, success: bool);

    /// Called after each discussion round with the resulting variance
    fn on_round_complete(&self, _round: u32, _variance: f64) {}

    /// Called when a phase completes
    fn on_phase_complete(&self, phase: SessionPhase);
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoProgress;

impl ProgressNotifier for NoProgress {
    fn on_phase_start(&self, _phase: SessionPhase, _total_tasks: usize) {}
    fn on_agent_complete(&self, _phase: SessionPhase, _agent: &AgentProfile, _success: bool) {}
    fn on_phase_complete(&self, _phase: SessionPhase) {}
}
