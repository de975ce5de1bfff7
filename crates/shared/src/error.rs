//! Error taxonomy for the ID cache.
//!
//! Fetch errors are recoverable (the next tick retries). Corrupt stores and
//! configuration errors are fatal and surfaced to the operator.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to retrieve one listing page
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, rate limiting or a server error that outlasted retries
    #[error("transient fetch failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// The requested resource does not exist
    #[error("not found: {url}")]
    NotFound { url: String },

    /// The request can never succeed as issued (bad request, unparseable body)
    #[error("permanent fetch failure for {url}: {message}")]
    Permanent { url: String, message: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// A persisted ID cache that cannot be trusted
#[derive(Debug, Error)]
#[error("corrupt cache file {path}: {reason}")]
pub struct CorruptStoreError {
    pub path: PathBuf,
    pub reason: String,
}

impl CorruptStoreError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Invalid configuration detected at startup
#[derive(Debug, Error)]
#[error("invalid configuration: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
