//! Error types for the Scaleway provider.

use scaleway_rs::ScalewayError;
use thiserror::Error;

use crate::compute::ComputeError;
use crate::config::ConfigError;

/// Errors raised inside the Scaleway provider before they cross the compute
/// seam as [`ComputeError::Adapter`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayComputeError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label passed by the caller.
        label: String,
        /// Architecture requested by the caller.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("instance type '{instance_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        instance_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when a server was created but could not be prepared or
    /// powered on. The server has been deleted unless `discarded` is false.
    #[error("server {server_id} created but not started (discarded: {discarded}): {message}")]
    LaunchAborted {
        /// Identifier of the created server.
        server_id: String,
        /// Whether the stopped server was deleted again.
        discarded: bool,
        /// Failure of the user data or power-on call.
        message: String,
    },
    /// Raised when the API answers with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code returned by the API.
        status: u16,
        /// Error message extracted from the body.
        message: String,
        /// Request field the API blamed, when reported.
        resource: Option<String>,
    },
    /// Wrapper for transport, decoding, and SDK failures.
    #[error("provider error: {message}")]
    Provider {
        /// Underlying diagnostic.
        message: String,
    },
}

impl ScalewayComputeError {
    pub(crate) fn provider(err: impl ToString) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }

    /// Wraps the error as an adapter failure of `operation`.
    pub(crate) fn into_compute(self, operation: &str) -> ComputeError {
        ComputeError::adapter(operation, self.to_string())
    }
}

impl From<ScalewayError> for ScalewayComputeError {
    fn from(value: ScalewayError) -> Self {
        Self::provider(value)
    }
}

impl From<ConfigError> for ScalewayComputeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
