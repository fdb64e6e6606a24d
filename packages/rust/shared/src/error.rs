//! Error types for chorekit.
//!
//! Library crates use [`ChoreError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all chorekit operations.
#[derive(Debug, thiserror::Error)]
pub enum ChoreError {
    /// Configuration loading or validation error. Always fatal to a run.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection-level failure (DNS, connect, TLS, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    /// XML, HTML, JSON or CSV parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input value, missing field, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Workbook read/write error.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Building or sending an e-mail failed.
    #[error("mail error: {0}")]
    Mail(String),

    /// An external command could not be run.
    #[error("command error: {0}")]
    Command(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ChoreError>;

impl ChoreError {
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

    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures, `429 Too Many Requests` and 5xx answers are
    /// transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
