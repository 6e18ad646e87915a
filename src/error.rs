//! # SpamError
//!
//! Error type for the public surface of the filter system.
//! Strategy faults never show up here: they are absorbed by the engine and
//! turned into abstentions. What remains is the deliberate rejection signal,
//! persistence failures and invalid admin input.

use thiserror::Error;

use crate::decision::Rejection;

#[derive(Error, Debug)]
pub enum SpamError {
    /// The submission scored below the karma threshold. Expected outcome, not a fault.
    #[error("{0}")]
    Rejected(Rejection),

    /// Audit log or classifier store could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Invalid threshold/weight input; the previous value is kept.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("log entry {0} not found")]
    LogEntryNotFound(i64),

    #[error("unknown filter strategy: {0}")]
    UnknownStrategy(String),

    /// Insert of an existing entry or update of a missing one.
    #[error("log entry state: {0}")]
    EntryState(&'static str),
}

impl SpamError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, SpamError::Rejected(_))
    }
}

pub type Result<T> = std::result::Result<T, SpamError>;
