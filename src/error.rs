//! Error taxonomy for the history store.
//!
//! None of these are expected in normal operation. They indicate a caller
//! ordering bug or corrupted persisted state and must abort the current scan
//! instead of being partially committed.

use alloc::string::{String, ToString};

use thiserror::Error;

use crate::time::Timestamp;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    /// Out-of-order insert or mutation of an already closed chain
    #[error("snapshot chain order violated for {entity}: {reason}")]
    ChainOrder { entity: String, reason: &'static str },
    /// Measurement older than the aggregate's last recorded timestamp
    #[error("measurement for {entity} at {observed_at} is older than {last_date}")]
    NonMonotonicDate {
        entity: String,
        observed_at: Timestamp,
        last_date: Timestamp,
    },
    /// Measurement handed to a book of another entity kind
    #[error("{found} measurement for {entity} given to the {expected} aggregates")]
    KindMismatch {
        entity: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("snapshot chain for {0} is empty")]
    NoSnapshots(String),
    /// A persisted aggregate row violates the buffer invariants
    #[error("invalid aggregate for {entity}: {reason}")]
    InvalidAggregate { entity: String, reason: &'static str },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("repository error: {0}")]
    Repository(String),
}

/// Result type used throughout the crate.
pub type HistoryResult<T> = Result<T, HistoryError>;

impl HistoryError {
    /// Creates a [`HistoryError::ChainOrder`] for `entity`.
    pub fn chain_order(entity: &str, reason: &'static str) -> Self {
        Self::ChainOrder {
            entity: entity.to_string(),
            reason,
        }
    }

    /// Creates a [`HistoryError::InvalidAggregate`] for `entity`.
    pub fn invalid_aggregate(entity: &str, reason: &'static str) -> Self {
        Self::InvalidAggregate {
            entity: entity.to_string(),
            reason,
        }
    }

    /// Wraps a storage failure reported by a repository.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }
}

impl From<postcard::Error> for HistoryError {
    fn from(value: postcard::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value.to_string())
    }
}
