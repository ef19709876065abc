//! Error types for digest operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a directory walk stopped before visiting the whole tree.
#[derive(Debug, Error)]
pub enum AbortCause {
    /// The walk observed a fired cancellation signal.
    #[error("walking cancelled")]
    Cancelled,

    /// Listing or stat-ing an entry failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that end a digest operation.
#[derive(Debug, Error)]
pub enum DigestError {
    /// A specific file could not be read.
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory walk failed or was cut short by cancellation.
    #[error("Walk aborted at {path}: {cause}")]
    TraversalAborted {
        path: PathBuf,
        #[source]
        cause: AbortCause,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl DigestError {
    /// Create a file read error with path context.
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a traversal error from a failed I/O call.
    pub fn traversal_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TraversalAborted {
            path: path.into(),
            cause: AbortCause::Io(source),
        }
    }

    /// Create the error reported when a walk is cancelled.
    pub fn cancelled(path: impl Into<PathBuf>) -> Self {
        Self::TraversalAborted {
            path: path.into(),
            cause: AbortCause::Cancelled,
        }
    }

    /// Whether this error came from the walk rather than a single file.
    pub fn is_traversal(&self) -> bool {
        matches!(self, Self::TraversalAborted { .. })
    }

    /// Whether this error reports a cancelled walk.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::TraversalAborted {
                cause: AbortCause::Cancelled,
                ..
            }
        )
    }
}

/// A per-file failure kept by the collect-all error policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Path that could not be digested.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
}

impl FileFailure {
    /// Create a new failure record.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}
