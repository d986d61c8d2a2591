//! Error types for cluster orchestration.

use thiserror::Error;

use super::ConfigureStep;
use super::templates::TemplateError;
use crate::compute::ComputeError;
use crate::node::NodeError;
use crate::remote::RemoteError;

/// Errors that abort a cluster operation.
///
/// Launch and readiness failures of individual workers never surface here;
/// they are recorded on the handle and listed in the operation's report.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Raised when the security group or key pair cannot be resolved.
    #[error("cluster {group_id}: resource resolution failed: {source}")]
    Resource {
        /// Group identifier of the run.
        group_id: String,
        /// Underlying provider error.
        #[source]
        source: ComputeError,
    },
    /// Raised when a launch request is incomplete before anything launches.
    #[error("cluster {group_id}: invalid launch request: {source}")]
    InvalidRequest {
        /// Group identifier of the run.
        group_id: String,
        /// Validation failure.
        #[source]
        source: ComputeError,
    },
    /// Raised when the coordinator fails to launch or never reports
    /// networking.
    #[error("cluster {group_id}: coordinator launch failed: {source}")]
    CoordinatorLaunch {
        /// Group identifier of the run.
        group_id: String,
        /// Node-level failure.
        #[source]
        source: Box<NodeError>,
    },
    /// Raised when a remote operation is requested without a private key.
    #[error(
        "cluster {group_id}: no private key for key pair '{key_pair}'; attach one before running remote steps"
    )]
    MissingKeyMaterial {
        /// Group identifier of the run.
        group_id: String,
        /// Key pair lacking local material.
        key_pair: String,
    },
    /// Raised when the remote channel cannot be prepared.
    #[error("cluster {group_id}: remote channel setup failed: {source}")]
    RemoteSetup {
        /// Group identifier of the run.
        group_id: String,
        /// Underlying remote error.
        #[source]
        source: RemoteError,
    },
    /// Raised when rediscovery finds no running coordinator.
    #[error("cluster {group_id}: no running coordinator found")]
    NoCoordinator {
        /// Group identifier searched for.
        group_id: String,
    },
    /// Raised when rediscovery finds several running coordinators.
    #[error("cluster {group_id}: {count} running coordinators found")]
    AmbiguousCoordinator {
        /// Group identifier searched for.
        group_id: String,
        /// Number of matches.
        count: usize,
    },
    /// Raised when configuration starts before the coordinator finished
    /// booting.
    #[error("cluster {group_id}: coordinator is {state}, not boot_configured")]
    CoordinatorNotReady {
        /// Group identifier of the run.
        group_id: String,
        /// Coordinator state at the time of the call.
        state: String,
    },
    /// Raised when a configuration step fails; later steps did not run.
    #[error("cluster {group_id}: step {step} failed on {node}: {source}")]
    ConfigurationStep {
        /// Group identifier of the run.
        group_id: String,
        /// Node the step targeted.
        node: String,
        /// Step that failed.
        step: ConfigureStep,
        /// Node-level failure.
        #[source]
        source: Box<NodeError>,
    },
    /// Raised when cancellation arrives during configuration; `step` and
    /// every later step did not run.
    #[error("cluster {group_id}: configuration cancelled before step {step}")]
    Cancelled {
        /// Group identifier of the run.
        group_id: String,
        /// First step that did not run.
        step: ConfigureStep,
    },
    /// Raised when a new private key cannot be written to the requested
    /// path. The key pair is already registered with the provider.
    #[error("cluster {group_id}: could not save private key for '{key_pair}': {source}")]
    KeySave {
        /// Group identifier of the run.
        group_id: String,
        /// Key pair whose private half was not saved.
        key_pair: String,
        /// Underlying file error.
        #[source]
        source: ComputeError,
    },
    /// Raised when a template cannot be loaded.
    #[error("template error: {source}")]
    Template {
        /// Underlying template error.
        #[source]
        source: TemplateError,
    },
    /// Raised when listing instances during rediscovery fails.
    #[error("cluster {group_id}: rediscovery failed: {source}")]
    Rediscover {
        /// Group identifier searched for.
        group_id: String,
        /// Underlying provider error.
        #[source]
        source: ComputeError,
    },
}

impl From<TemplateError> for ClusterError {
    fn from(source: TemplateError) -> Self {
        Self::Template { source }
    }
}
