//! Core library for the armada cluster provisioner.
//!
//! The crate launches one coordinator and a pool of workers on Scaleway,
//! waits for each node to report networking and finish its first-boot
//! script, then distributes a node manifest and data-store settings over
//! `ssh`/`scp`. Provider access sits behind [`ComputeApi`] and process
//! execution behind [`CommandRunner`], so the orchestration runs unchanged
//! against the in-memory doubles in [`test_support`].

pub mod cluster;
pub mod compute;
pub mod config;
pub mod files;
pub mod keygen;
pub mod node;
pub mod remote;
pub mod scaleway;
pub mod test_support;
pub mod wait;

pub use cluster::{
    ClusterDescriptor, ClusterError, ClusterGroup, ClusterOrchestrator, ConfigureOutcome,
    ConfigureStep, NodeFailure, NodeSummary, ProvisionReport, ProvisionRequest, ReadinessReport,
};
pub use compute::{ComputeAdapter, ComputeApi, ComputeError, KeyMaterial, NodeRole};
pub use config::{ClusterConfig, ConfigError, ScalewayConfig};
pub use node::{InstanceHandle, NodeError, NodeState};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput, RemoteConfig,
    RemoteError, RemoteExecutor,
};
pub use scaleway::{ScalewayCompute, ScalewayComputeError};
pub use wait::WaitPolicy;
