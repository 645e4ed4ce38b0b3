//! Durable log backends
//!
//! The in-memory backend lives in the application crate next to its port;
//! the JSONL backend here persists the same records to disk.

mod jsonl;

pub use jsonl::JsonlLogBackend;
pub use tribunal_application::ports::memory_log::InMemoryLogBackend;
