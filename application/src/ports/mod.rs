//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.
//! In-memory implementations used by tests and single-process runs live
//! next to their ports.

pub mod clock;
pub mod evaluator;
pub mod log_backend;
pub mod memory_log;
pub mod progress;
pub mod session_store;
