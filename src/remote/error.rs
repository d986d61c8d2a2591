//! Error types for the remote channel.

use thiserror::Error;

/// Errors surfaced while running commands on or copying files to a node.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set ARMADA_REMOTE_{env_suffix} or add {field} to [remote] in armada.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when layered configuration cannot be merged.
    #[error("remote configuration parsing failed: {message}")]
    ConfigLoad {
        /// Loader diagnostic.
        message: String,
    },
    /// Raised when no private key is available to authenticate.
    #[error("no private key material available for remote access")]
    MissingKeyMaterial,
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when every connection attempt failed.
    #[error("{host} unreachable after {attempts} attempts: {stderr}")]
    Unreachable {
        /// Target address.
        host: String,
        /// Attempts made.
        attempts: u32,
        /// Stderr of the final attempt.
        stderr: String,
    },
    /// Raised when a remote command exits non-zero and the caller asked for
    /// success.
    #[error("`{command}` on {host} exited with status {status_text}: {stderr}", status_text = status.map_or_else(|| String::from("unknown"), |code| code.to_string()))]
    CommandFailed {
        /// Target address.
        host: String,
        /// Command or transfer that failed.
        command: String,
        /// Exit status as reported by the process.
        status: Option<i32>,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when a polled command never satisfied its condition.
    #[error("`{command}` on {host} did not succeed within {waited_secs}s")]
    Timeout {
        /// Target address.
        host: String,
        /// Polled command.
        command: String,
        /// Seconds spent polling.
        waited_secs: u64,
    },
    /// Raised when the caller cancelled a poll.
    #[error("polling {host} was cancelled")]
    Cancelled {
        /// Target address.
        host: String,
    },
    /// Raised when the identity file cannot be materialised.
    #[error("failed to prepare SSH identity: {message}")]
    Identity {
        /// Underlying I/O error.
        message: String,
    },
    /// Raised when a local file staged for upload cannot be written.
    #[error("failed to stage {path}: {message}")]
    Staging {
        /// Local path being prepared.
        path: String,
        /// Underlying I/O error.
        message: String,
    },
}
