//! Use cases
//!
//! Application-level operations that orchestrate domain logic.

pub mod coordinator;
pub mod discussion_round;
pub mod run_evaluation;
