//! # FlowForge Error Module
//!
//! Unified error handling with fix suggestions for the FlowForge CLI and
//! library surface, in the spirit of the engine's layered design:
//!
//! - `storage` errors: I/O and access-control failures from the storage tier
//! - `engine` errors: scheduler-visible fatal conditions (`Termination`)
//! - top-level `FlowError`: wraps the above for CLI/library consumers
//!
//! ## Example
//!
//! ```rust,ignore
//! use flowforge::error::{FlowError, FixSuggestion};
//!
//! fn handle_error(err: FlowError) {
//!     eprintln!("Error: {}", err);
//!     if let Some(suggestion) = err.fix_suggestion() {
//!         eprintln!("  Fix: {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Trait for errors that can provide fix suggestions.
pub trait FixSuggestion {
    /// Get a fix suggestion for this error, if available.
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Storage-tier error (spec §7: NotFound, ReadOnlyAccess).
#[derive(Error, Debug)]
pub enum StorageError {
    /// Requested artifact does not exist where one was required.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// A mutation was attempted against the read-only tier of a composite storage.
    #[error("read-only tier rejected write to: {0}")]
    ReadOnlyAccess(PathBuf),

    /// Underlying filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Codec (de)serialization failure for a stored output.
    #[error("codec error: {0}")]
    Codec(String),
}

impl FixSuggestion for StorageError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            StorageError::NotFound(_) => {
                Some("Check the task that produces this output actually ran, or rerun the workflow")
            }
            StorageError::ReadOnlyAccess(_) => {
                Some("Write to the read-write tier instead, or namespace a fresh read-write storage for this key")
            }
            StorageError::Io { .. } => Some("Check file permissions and available disk space"),
            StorageError::Codec(_) => Some("Check the output's codec matches the data it was stored with"),
        }
    }
}

/// A fatal, scheduler-visible condition (spec §7: `Termination`).
#[derive(Error, Debug)]
#[error("termination: task {task_id} failed: {cause}")]
pub struct Termination {
    pub task_id: String,
    pub cause: String,
}

/// Top-level error type for the FlowForge CLI and library entry points.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Storage-tier failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A worker died, exited non-zero, or user code raised.
    #[error(transparent)]
    Termination(#[from] Termination),

    /// Codec (de)serialization failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Invalid configuration (e.g. resource tags declared under `n_jobs == 1`).
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON parse error surfaced from the CLI.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error (file not found, permission denied, etc.) at the CLI boundary.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl FlowError {
    pub fn other(msg: impl Into<String>) -> Self {
        FlowError::Other(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        FlowError::Codec(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FlowError::Config(msg.into())
    }
}

impl FixSuggestion for FlowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            FlowError::Storage(e) => e.fix_suggestion(),
            FlowError::Termination(_) => {
                Some("Inspect the task's stack trace above; fix the task and rerun — completed outputs are preserved")
            }
            FlowError::Codec(_) => Some("Check the output's codec matches the data it was stored with"),
            FlowError::Config(_) => {
                Some("Resource tags only apply in parallel mode; either set n_jobs > 1 or drop the tags")
            }
            FlowError::JsonParse(_) => Some("Check JSON syntax: ensure proper quoting and braces"),
            FlowError::Io(_) => Some("Check file path exists and has correct permissions"),
            FlowError::Other(_) => None,
        }
    }
}

/// Print an error with its fix suggestion to stderr.
pub fn print_error<E: std::error::Error + FixSuggestion>(error: &E) {
    eprintln!("Error: {}", error);
    if let Some(suggestion) = error.fix_suggestion() {
        eprintln!("  Fix: {}", suggestion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_has_suggestion() {
        let err = StorageError::NotFound(PathBuf::from("a/b"));
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn flow_error_wraps_storage() {
        let err: FlowError = StorageError::ReadOnlyAccess(PathBuf::from("k")).into();
        assert!(err.to_string().contains("read-only"));
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn flow_error_wraps_termination() {
        let term = Termination { task_id: "t1".into(), cause: "boom".into() };
        let err: FlowError = term.into();
        assert!(err.to_string().contains("t1"));
        assert!(err.fix_suggestion().is_some());
    }
}
