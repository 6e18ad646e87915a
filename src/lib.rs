// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod api;
pub mod changes;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod replay;
pub mod storage;
pub mod strategy;
pub mod submission;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::changes::Change;
pub use crate::decision::{Decision, Rejection, ScoreReason};
pub use crate::engine::FilterSystem;
pub use crate::error::{Result, SpamError};
pub use crate::strategy::{FilterStrategy, StrategyInput, StrategySet, Verdict};
pub use crate::submission::{RequestContext, Submission};
