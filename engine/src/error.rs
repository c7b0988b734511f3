//! Error types for the migration engine.
//!
//! The primary error type is `EngineError`. Configuration-class errors
//! (invalid settings, unreachable source root) abort a run before any work
//! starts. Transport-class errors (a failed fetch, put or probe) are isolated
//! to the item that observed them and never abort the run; checkpoint write
//! failures are reported and retried on the next batch boundary.

use std::error::Error;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

/// Errors surfaced by the engine and its storage adapters.
///
/// Per-item errors (fetch/put/probe) are carried inside a `TransferOutcome`
/// and folded into the run counters; they are never returned from the
/// scheduler's run loop. Only configuration-class errors propagate out of
/// engine entry points before any work has started.
#[derive(Debug)]
pub enum EngineError {
    /// Engine configuration is missing or out of range
    InvalidConfig { reason: String },

    /// Source root does not exist or cannot be opened
    SourceUnavailable { path: PathBuf, reason: String },

    /// Destination root cannot be prepared
    DestinationUnavailable { path: PathBuf, source: io::Error },

    /// A page listing against the source store failed
    ListFailed {
        cursor: Option<String>,
        source: io::Error,
    },

    /// Payload fetch from the source store failed
    FetchFailed { key: String, source: io::Error },

    /// Write to the destination store failed
    PutFailed { key: String, source: io::Error },

    /// Existence probe against the destination failed.
    /// Not-found is a valid `false` result, never this error.
    ProbeFailed { key: String, source: io::Error },

    /// Checkpoint file could not be written
    CheckpointSaveFailed { path: PathBuf, source: io::Error },

    /// Catch-all for unexpected errors
    Unknown { message: String },
}

impl Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => {
                write!(f, "Invalid engine configuration: {}", reason)
            }
            Self::SourceUnavailable { path, reason } => {
                write!(f, "Source unavailable: {} ({})", path.display(), reason)
            }
            Self::DestinationUnavailable { path, .. } => {
                write!(f, "Destination unavailable: {}", path.display())
            }
            Self::ListFailed { cursor, .. } => match cursor {
                Some(cursor) => write!(f, "Failed to list source page at cursor {}", cursor),
                None => write!(f, "Failed to list first source page"),
            },
            Self::FetchFailed { key, .. } => {
                write!(f, "Failed to fetch object: {}", key)
            }
            Self::PutFailed { key, .. } => {
                write!(f, "Failed to write object: {}", key)
            }
            Self::ProbeFailed { key, .. } => {
                write!(f, "Failed to probe destination for object: {}", key)
            }
            Self::CheckpointSaveFailed { path, .. } => {
                write!(f, "Failed to write checkpoint: {}", path.display())
            }
            Self::Unknown { message } => {
                write!(f, "Engine error: {}", message)
            }
        }
    }
}

impl Error for EngineError {}

impl EngineError {
    /// True for configuration-class errors that abort before any work starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::SourceUnavailable { .. }
                | Self::DestinationUnavailable { .. }
        )
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Unknown {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        let err = EngineError::InvalidConfig {
            reason: "concurrency must be at least 1".to_string(),
        };
        assert!(err.is_fatal());

        let err = EngineError::SourceUnavailable {
            path: PathBuf::from("/missing"),
            reason: "not found".to_string(),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_transport_errors_are_not_fatal() {
        let err = EngineError::FetchFailed {
            key: "a.epub".to_string(),
            source: io::Error::new(io::ErrorKind::TimedOut, "timeout"),
        };
        assert!(!err.is_fatal());

        let err = EngineError::CheckpointSaveFailed {
            path: PathBuf::from("state.json"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display_includes_key() {
        let err = EngineError::PutFailed {
            key: "books/a.epub".to_string(),
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert!(err.to_string().contains("books/a.epub"));
    }
}
