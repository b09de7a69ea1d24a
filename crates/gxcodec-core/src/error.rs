//! Unified error handling for gxcodec
//!
//! Codec-level failures are described by the parser crate's own error type.
//! This enum covers what happens around a codec call: locating files,
//! picking a container format and reporting a failed transaction.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for application-level operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Format Errors ====================

    /// No codec recognises the container
    #[error("Unrecognised container: {path} (magic {magic:02X?})")]
    UnrecognisedContainer {
        path: PathBuf,
        magic: Vec<u8>,
    },

    /// Requested output format is not supported
    #[error("Unsupported output format: {format}")]
    UnsupportedFormat {
        format: String,
    },

    /// The codec rejected the data
    #[error("Codec error: {message}")]
    Codec {
        message: String,
    },

    /// A read or write finished in the Failure state
    #[error("Transaction failed for {path} with {errors} error(s)")]
    TransactionFailed {
        path: String,
        errors: usize,
    },

    /// Written bytes did not survive a re-read unchanged
    #[error("Round trip mismatch: {message}")]
    RoundTripMismatch {
        message: String,
    },

    // ==================== Configuration Errors ====================

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    // ==================== General Errors ====================

    /// Error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap a codec failure message
    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::FileNotFound(PathBuf::from("/model.bmd"));
        let contextualized = err.with_context("while loading model");

        assert!(contextualized.to_string().contains("while loading model"));
        assert!(matches!(contextualized, Error::WithContext { .. }));
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::codec("bad section"));
        let with_context = result.map_err(|e| e.with_context("reading a.brres"));

        let message = with_context.unwrap_err().to_string();
        assert!(message.contains("reading a.brres"));
        assert!(message.contains("bad section"));
    }
}
