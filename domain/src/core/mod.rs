//! Core domain concepts shared across all subdomains.
//!
//! - [`ids`]: agent and session identifiers
//! - [`agent`]: participating agents and their reputation figures
//! - [`error`]: consensus and configuration errors

pub mod agent;
pub mod error;
pub mod ids;
