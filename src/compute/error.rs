//! Error types for the compute seam.

use thiserror::Error;

/// Errors raised by compute providers and the compute adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// Wrapper for any provider level failure. Never retried.
    #[error("{operation} failed: {message}")]
    Adapter {
        /// Adapter operation that failed.
        operation: String,
        /// Message returned by the provider or transport.
        message: String,
    },
    /// Raised when a name lookup returns more than one exact match.
    #[error("found {count} {resource} resources named '{name}'")]
    ResourceAmbiguity {
        /// Kind of resource that was looked up.
        resource: String,
        /// Name used for the lookup.
        name: String,
        /// Number of exact matches.
        count: usize,
    },
    /// Raised when fresh key material cannot be generated.
    #[error("key generation failed: {message}")]
    KeyGeneration {
        /// Diagnostic from the generator.
        message: String,
    },
    /// Raised when a private key file cannot be read or written.
    #[error("private key file {path}: {message}")]
    KeyFile {
        /// Path of the key file.
        path: String,
        /// Underlying I/O error.
        message: String,
    },
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

impl ComputeError {
    /// Builds a [`ComputeError::Adapter`] for `operation`.
    #[must_use]
    pub fn adapter(operation: &str, message: impl Into<String>) -> Self {
        Self::Adapter {
            operation: operation.to_owned(),
            message: message.into(),
        }
    }
}
