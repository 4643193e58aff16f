//! Error types for the Quiver library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`QuiverError`] enum. Absent data (a term that is not in a dictionary, a
//! key that is not in an FST) is never an error; lookups report it through
//! `Option` or [`crate::index::SeekStatus`].
//!
//! # Examples
//!
//! ```
//! use quiver::error::{QuiverError, Result};
//!
//! fn check_order(prev: &[u8], next: &[u8]) -> Result<()> {
//!     if next <= prev {
//!         return Err(QuiverError::invalid_operation("keys out of order"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_order(b"b", b"a").is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Quiver operations.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// I/O errors raised by the storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors (missing files, closed storage, ...).
    #[error("Storage error: {0}")]
    Storage(String),

    /// A file failed its integrity checks. Never recovered from.
    #[error("Corrupt index (resource={resource}): {reason}")]
    Corruption { resource: String, reason: String },

    /// A codec header carried a version this build cannot read.
    #[error("Unsupported version {version} for codec {codec} (supported {min}..={max})")]
    UnsupportedVersion {
        codec: String,
        version: u32,
        min: u32,
        max: u32,
    },

    /// Determinization would have produced more states than allowed.
    ///
    /// Callers such as query compilers are expected to catch this and reject
    /// the pattern.
    #[error(
        "Determinizing {} would result in more than {max_states} states",
        pattern.clone().unwrap_or_else(|| format!(
            "automaton ({input_states} states, {input_transitions} transitions)"
        ))
    )]
    TooComplexToDeterminize {
        pattern: Option<String>,
        max_states: usize,
        input_states: usize,
        input_transitions: usize,
    },

    /// A regular expression could not be parsed.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// An API was used incorrectly.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with QuiverError.
pub type Result<T> = std::result::Result<T, QuiverError>;

impl QuiverError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        QuiverError::Storage(msg.into())
    }

    /// Create a new corruption error for the named resource.
    pub fn corruption<R: Into<String>, S: Into<String>>(resource: R, reason: S) -> Self {
        QuiverError::Corruption {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidOperation(msg.into())
    }

    /// Create a new invalid pattern error.
    pub fn invalid_pattern<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidPattern(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        QuiverError::InvalidConfig(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        QuiverError::Other(msg.into())
    }

    /// Create a determinization-cap error for an input automaton of the
    /// given size, without a pattern attached.
    pub fn too_complex(max_states: usize, input_states: usize, input_transitions: usize) -> Self {
        QuiverError::TooComplexToDeterminize {
            pattern: None,
            max_states,
            input_states,
            input_transitions,
        }
    }

    /// Attach the offending pattern to a determinization-cap error.
    ///
    /// Other errors are returned unchanged.
    pub fn with_pattern<S: Into<String>>(self, source: S) -> Self {
        match self {
            QuiverError::TooComplexToDeterminize {
                pattern: None,
                max_states,
                input_states,
                input_transitions,
            } => QuiverError::TooComplexToDeterminize {
                pattern: Some(source.into()),
                max_states,
                input_states,
                input_transitions,
            },
            other => other,
        }
    }

    /// Whether this error means on-disk data is unusable.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            QuiverError::Corruption { .. } | QuiverError::UnsupportedVersion { .. }
        )
    }
}
