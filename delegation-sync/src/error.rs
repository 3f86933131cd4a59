//! Error types for delegation sync

use crate::context::CancelReason;
use crate::types::CycleStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Sync errors
#[derive(Error, Debug)]
pub enum Error {
    /// Empty or malformed input, rejected locally
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request never produced a response (connect, timeout, body read)
    #[error("Transport error for {account}: {source}")]
    Transport {
        /// Account being fetched
        account: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-200 status
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code
        status: u16,
        /// Response body, uninterpreted
        body: String,
    },

    /// Retries exhausted; wraps the last concrete failure
    #[error("Transient failure after {attempts} attempts: {cause}")]
    Transient {
        /// Attempts made, including the first
        attempts: u32,
        /// Last failure observed
        #[source]
        cause: Box<Error>,
    },

    /// Upstream 404 or missing registry entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// 200 response whose body could not be decoded
    #[error("Decode error for {account}: {source}")]
    Decode {
        /// Account being fetched
        account: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Account registry failure
    #[error("Registry error: {0}")]
    Registry(String),

    /// Persistence adapter failure
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Context cancelled or deadline exceeded
    #[error("{0}")]
    Cancelled(CancelReason),

    /// Cycle finished but at least one account failed
    #[error(
        "completed with {} errors ({} successes, {} skipped)",
        .0.failed,
        .0.succeeded,
        .0.skipped
    )]
    CycleIncomplete(Box<CycleStats>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse classification carried by per-account outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Local validation failure
    InvalidInput,
    /// Network, timeout or 5xx
    Transient,
    /// Upstream rejected the request (4xx other than 404)
    Rejected,
    /// Upstream 404
    NotFound,
    /// Account vanished from the registry mid-cycle
    AccountNotFound,
    /// Undecodable upstream payload
    Decode,
    /// Registry failure
    Registry,
    /// Write failure
    PersistenceFailure,
    /// Context cancelled or expired
    Cancelled,
    /// Anything else
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transient => "transient",
            ErrorKind::Rejected => "rejected",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccountNotFound => "account_not_found",
            ErrorKind::Decode => "decode",
            ErrorKind::Registry => "registry",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Transport { .. } | Error::Transient { .. } => ErrorKind::Transient,
            Error::UpstreamStatus { status, .. } if *status >= 500 => ErrorKind::Transient,
            Error::UpstreamStatus { .. } => ErrorKind::Rejected,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Registry(_) => ErrorKind::Registry,
            Error::Persistence(_) => ErrorKind::PersistenceFailure,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::CycleIncomplete(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Stats of an incomplete cycle, if this is one
    pub fn cycle_stats(&self) -> Option<&CycleStats> {
        match self {
            Error::CycleIncomplete(stats) => Some(stats),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
