//! Typed error handling for the weightpack library.
//!
//! All public API functions return [`Result<T>`](type@Result), which uses
//! [`PackError`] as the error type. The CLI binary converts these into
//! `anyhow::Error` automatically via the blanket `From<E: std::error::Error>`
//! impl, so callers that prefer `anyhow` can use `?` without `.map_err()`.
//!
//! Degenerate numeric input (all-zero tensors, zero variance, `min == max`)
//! is never an error; the calibration and quantization stages resolve it
//! with fixed guards.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result type alias used throughout the weightpack public API.
pub type Result<T> = std::result::Result<T, PackError>;

/// Errors produced by the weightpack library.
#[derive(Debug)]
pub enum PackError {
    /// Rank 0 shape or a zero-sized dimension.
    InvalidShape {
        /// The offending shape.
        shape: Vec<usize>,
        /// What went wrong.
        reason: String,
    },

    /// Data length does not match the shape, unreadable array content, etc.
    InvalidTensor {
        /// What went wrong.
        reason: String,
    },

    /// Failed to persist a header, payload or scale sidecar.
    WriteFailure {
        /// Output identity of the tensor being written.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Failed to read a tensor file, sidecar or input array from disk.
    ReadFailure {
        /// Path that was being read.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A tensor file whose header or payload is inconsistent.
    MalformedFile {
        /// Path that was being parsed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Configuration file parsing or validation error.
    Config {
        /// What went wrong.
        reason: String,
    },
}

impl PackError {
    pub(crate) fn write_failure(path: &Path, err: impl fmt::Display) -> Self {
        PackError::WriteFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn read_failure(path: &Path, err: impl fmt::Display) -> Self {
        PackError::ReadFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        PackError::MalformedFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::InvalidShape { shape, reason } => {
                write!(f, "invalid shape {shape:?}: {reason}")
            }
            PackError::InvalidTensor { reason } => {
                write!(f, "invalid tensor: {reason}")
            }
            PackError::WriteFailure { path, reason } => {
                write!(f, "failed to write '{}': {reason}", path.display())
            }
            PackError::ReadFailure { path, reason } => {
                write!(f, "failed to read '{}': {reason}", path.display())
            }
            PackError::MalformedFile { path, reason } => {
                write!(f, "malformed tensor file '{}': {reason}", path.display())
            }
            PackError::Config { reason } => {
                write!(f, "config error: {reason}")
            }
        }
    }
}

impl std::error::Error for PackError {}
