//! Error types for the web search workspace.
//!
//! Library crates use [`WebSearchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only setup-time failures (config, prompt files, cache directory creation,
//! HTTP client construction) are surfaced to callers of the pipeline. Errors
//! raised while a run is in progress are absorbed at the stage that saw them.

use std::path::PathBuf;

/// Top-level error type for all web search operations.
#[derive(Debug, thiserror::Error)]
pub enum WebSearchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search, fetch, or robots.txt lookup.
    #[error("network error: {0}")]
    Network(String),

    /// Response or content parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Content cache error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Search or language-model provider error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad template, invalid value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WebSearchError>;

impl WebSearchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
