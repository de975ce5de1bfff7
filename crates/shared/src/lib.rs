//! Shared library for the MyAnimeList ID cache.
//!
//! This crate provides common functionality used by the cache crate:
//! - Configuration management
//! - Entry kind and category models
//! - File path utilities
//! - Logging infrastructure
//! - Shared error types

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod paths;

// Re-export commonly used types
pub use config::{CategoryChangePolicy, CheckRange, Config, PageDepth};
pub use error::{ConfigError, CorruptStoreError, FetchError};
pub use logging::LogConfig;
pub use models::*;
pub use paths::DataPaths;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
