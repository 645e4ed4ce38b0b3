//! Evaluator adapters
//!
//! | Adapter | Feature | Use |
//! |---------|---------|-----|
//! | [`ScriptedEvaluator`] | always | demos, dry runs, end-to-end tests |
//! | `HttpEvaluator` | `http` | a remote judging service |

#[cfg(feature = "http")]
mod http;
mod scripted;

#[cfg(feature = "http")]
pub use http::HttpEvaluator;
pub use scripted::{AgentScript, ScriptedEvaluator};
