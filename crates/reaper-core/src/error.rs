//! Error taxonomy for reconciliation and configuration.

use std::time::Duration;

use reaper_state::{ObjectKey, StoreError};

/// Errors produced by a single reconciliation attempt.
///
/// None of these are retried internally; the worker hands the key back to
/// the queue with a delay.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("reconcile of {key} exceeded {budget:?}")]
    Timeout { key: ObjectKey, budget: Duration },
}

/// Coarse classification reported to the scheduling collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Resource vanished between notification and load or delete.
    NotFoundTransient,
    Store,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFoundTransient => "not_found",
            ErrorKind::Store => "store",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// `NotFoundTransient` is absorbed as success; everything else is redelivered.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::NotFoundTransient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::Store(e) if e.is_not_found() => ErrorKind::NotFoundTransient,
            ReconcileError::Store(_) => ErrorKind::Store,
            ReconcileError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Errors produced while reading controller configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration in {var}: {source}")]
    InvalidDuration {
        var: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid integer in {var}: {source}")]
    InvalidInteger {
        var: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("invalid boolean in {var}: {value}")]
    InvalidBool { var: String, value: String },
}

/// Result type for reconciliation.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
