//! One provisioned node and its launch-to-ready state machine.
//!
//! A handle moves `Requested → Launching → Running → Ready →
//! BootConfigured`, or drops into `Failed` at the stage that went wrong.
//! Network details stay unset until the provider reports a running instance
//! with an address, and every remote step checks for them first.

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use shell_escape::unix::escape;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compute::{
    ComputeAdapter, ComputeApi, ComputeError, InstanceSnapshot, InstanceState, LaunchRequest,
    NodeRole,
};
use crate::remote::{CommandRunner, RemoteError, RemoteExecutor};
use crate::wait::{WaitInterrupt, WaitPolicy};

/// Stage at which a node failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// The provider rejected the launch.
    Launch,
    /// The instance never reported networking.
    Network,
    /// The first-boot script never finished.
    Boot,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Launch => "launch",
            Self::Network => "network",
            Self::Boot => "boot",
        })
    }
}

/// Lifecycle position of an [`InstanceHandle`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Not launched yet.
    Requested,
    /// The provider accepted the launch.
    Launching,
    /// Running, but without networking.
    Running,
    /// Running with an address.
    Ready,
    /// The first-boot script has finished.
    BootConfigured,
    /// Gave up at `stage`.
    Failed {
        /// Stage that failed.
        stage: FailureStage,
        /// Human-readable cause.
        reason: String,
    },
}

impl NodeState {
    /// Returns `true` for [`NodeState::Failed`].
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Launching => f.write_str("launching"),
            Self::Running => f.write_str("running"),
            Self::Ready => f.write_str("ready"),
            Self::BootConfigured => f.write_str("boot_configured"),
            Self::Failed { stage, reason } => write!(f, "failed at {stage}: {reason}"),
        }
    }
}

/// Errors raised while driving a single node.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NodeError {
    /// Raised when an operation needs a state the node has not reached.
    #[error("node {node} is {state}")]
    NotReady {
        /// Node name.
        node: String,
        /// Current state.
        state: String,
    },
    /// Raised when readiness was not reached within the wait budget.
    #[error("node {node} not ready after {waited_secs}s")]
    ReadinessTimeout {
        /// Node name.
        node: String,
        /// Seconds spent waiting.
        waited_secs: u64,
    },
    /// Raised when the caller cancelled the wait.
    #[error("waiting for node {node} was cancelled")]
    Cancelled {
        /// Node name.
        node: String,
    },
    /// Wrapper for provider failures.
    #[error("node {node}: {source}")]
    Compute {
        /// Node name.
        node: String,
        /// Underlying provider error.
        #[source]
        source: ComputeError,
    },
    /// Wrapper for remote channel failures.
    #[error("node {node}: {source}")]
    Remote {
        /// Node name.
        node: String,
        /// Underlying remote error.
        #[source]
        source: RemoteError,
    },
}

/// One provisioned node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    role: NodeRole,
    name: String,
    instance_id: Option<String>,
    address: Option<IpAddr>,
    private_address: Option<IpAddr>,
    dns_name: Option<String>,
    process_count: Option<u32>,
    state: NodeState,
}

impl InstanceHandle {
    /// Creates a handle that has not been launched yet.
    #[must_use]
    pub fn new(role: NodeRole, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            instance_id: None,
            address: None,
            private_address: None,
            dns_name: None,
            process_count: None,
            state: NodeState::Requested,
        }
    }

    /// Builds a handle for an instance found running, already `Ready`.
    #[must_use]
    pub fn from_snapshot(role: NodeRole, snapshot: &InstanceSnapshot) -> Self {
        Self {
            role,
            name: snapshot.id.clone(),
            instance_id: Some(snapshot.id.clone()),
            address: snapshot.address(),
            private_address: snapshot.private_ip,
            dns_name: snapshot.dns_name.clone(),
            process_count: snapshot.process_count,
            state: NodeState::Ready,
        }
    }

    /// Role of the node.
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.role
    }

    /// Name used in logs, errors, and as the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider identifier, once launched.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Address remote commands target, once known.
    #[must_use]
    pub const fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Private address, once known.
    #[must_use]
    pub const fn private_address(&self) -> Option<IpAddr> {
        self.private_address
    }

    /// Public DNS name, once known.
    #[must_use]
    pub fn dns_name(&self) -> Option<&str> {
        self.dns_name.as_deref()
    }

    /// Number of worker processes the node can host, once known.
    #[must_use]
    pub const fn process_count(&self) -> Option<u32> {
        self.process_count
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &NodeState {
        &self.state
    }

    /// Returns `true` once the first-boot script has finished.
    #[must_use]
    pub const fn is_boot_configured(&self) -> bool {
        matches!(self.state, NodeState::BootConfigured)
    }

    /// Returns the address or fails with [`NodeError::NotReady`].
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotReady`] until an address has been observed.
    pub fn require_address(&self) -> Result<IpAddr, NodeError> {
        self.address.ok_or_else(|| self.not_ready())
    }

    fn not_ready(&self) -> NodeError {
        NodeError::NotReady {
            node: self.name.clone(),
            state: self.state.to_string(),
        }
    }

    fn fail(&mut self, stage: FailureStage, cause: impl Into<String>) {
        let reason = cause.into();
        warn!(node = %self.name, %stage, %reason, "node failed");
        self.state = NodeState::Failed { stage, reason };
    }

    /// Submits `request` and records the new instance identifier.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotReady`] when the handle was already launched,
    /// and [`NodeError::Compute`] when the provider rejects the launch; the
    /// handle is then `Failed` at the launch stage.
    pub async fn launch<A: ComputeApi>(
        &mut self,
        compute: &ComputeAdapter<A>,
        request: &LaunchRequest,
    ) -> Result<(), NodeError> {
        if self.state != NodeState::Requested {
            return Err(self.not_ready());
        }
        match compute.launch_instance(request).await {
            Ok(instance_id) => {
                info!(node = %self.name, %instance_id, role = %self.role, "instance launched");
                self.instance_id = Some(instance_id);
                self.state = NodeState::Launching;
                Ok(())
            }
            Err(source) => {
                self.fail(FailureStage::Launch, source.to_string());
                Err(NodeError::Compute {
                    node: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Polls the provider until the instance runs with an address.
    ///
    /// Returns immediately when the handle is already `Ready` or further.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotReady`] for handles that were never launched
    /// or already failed, [`NodeError::ReadinessTimeout`] when the policy
    /// expires, [`NodeError::Cancelled`] when `cancel` fires, and
    /// [`NodeError::Compute`] when a provider call fails.
    pub async fn wait_until_ready<A: ComputeApi>(
        &mut self,
        compute: &ComputeAdapter<A>,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        match self.state {
            NodeState::Ready | NodeState::BootConfigured => return Ok(()),
            NodeState::Launching | NodeState::Running => {}
            NodeState::Requested | NodeState::Failed { .. } => return Err(self.not_ready()),
        }
        let Some(instance_id) = self.instance_id.clone() else {
            return Err(self.not_ready());
        };

        let deadline = policy.start();
        loop {
            let snapshot = match compute.describe_instance(&instance_id).await {
                Ok(snapshot) => snapshot,
                Err(source) => {
                    self.fail(FailureStage::Network, source.to_string());
                    return Err(NodeError::Compute {
                        node: self.name.clone(),
                        source,
                    });
                }
            };

            if snapshot.is_reachable() {
                self.address = snapshot.address();
                self.private_address = snapshot.private_ip;
                self.dns_name = snapshot.dns_name;
                self.process_count = snapshot.process_count;
                self.state = NodeState::Ready;
                info!(
                    node = %self.name,
                    %instance_id,
                    address = ?self.address,
                    elapsed_secs = deadline.elapsed().as_secs(),
                    "instance ready"
                );
                return Ok(());
            }
            if snapshot.state == InstanceState::Running {
                self.state = NodeState::Running;
            }
            debug!(node = %self.name, state = %snapshot.state, "waiting for networking");

            if let Err(interrupt) = deadline.pause(cancel).await {
                let waited_secs = deadline.elapsed().as_secs();
                return Err(self.interrupted(interrupt, FailureStage::Network, waited_secs));
            }
        }
    }

    /// Waits until the first-boot script has left `marker` behind.
    ///
    /// Returns immediately when the handle is already `BootConfigured`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotReady`] before the node is `Ready`,
    /// [`NodeError::ReadinessTimeout`] when the policy expires,
    /// [`NodeError::Cancelled`] when `cancel` fires, and
    /// [`NodeError::Remote`] for other remote failures, including missing
    /// key material.
    pub async fn await_boot<R: CommandRunner>(
        &mut self,
        remote: &RemoteExecutor<R>,
        marker: &str,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), NodeError> {
        match self.state {
            NodeState::BootConfigured => return Ok(()),
            NodeState::Ready => {}
            _ => return Err(self.not_ready()),
        }
        let address = self.require_address()?;
        let check = boot_marker_check(marker);

        let started = policy.start();
        let outcome = remote
            .run_until(
                address,
                &check,
                |output| output.is_success() && output.stdout.trim() == "true",
                policy,
                cancel,
            )
            .await;
        match outcome {
            Ok(_) => {
                self.state = NodeState::BootConfigured;
                info!(node = %self.name, %address, "first boot finished");
                Ok(())
            }
            Err(RemoteError::Timeout { waited_secs, .. }) => {
                Err(self.interrupted(WaitInterrupt::Expired, FailureStage::Boot, waited_secs))
            }
            Err(RemoteError::Cancelled { .. }) => Err(self.interrupted(
                WaitInterrupt::Cancelled,
                FailureStage::Boot,
                started.elapsed().as_secs(),
            )),
            Err(source) => {
                self.fail(FailureStage::Boot, source.to_string());
                Err(NodeError::Remote {
                    node: self.name.clone(),
                    source,
                })
            }
        }
    }

    fn interrupted(
        &mut self,
        interrupt: WaitInterrupt,
        stage: FailureStage,
        waited_secs: u64,
    ) -> NodeError {
        match interrupt {
            WaitInterrupt::Expired => {
                self.fail(stage, format!("not ready after {waited_secs}s"));
                NodeError::ReadinessTimeout {
                    node: self.name.clone(),
                    waited_secs,
                }
            }
            WaitInterrupt::Cancelled => {
                self.fail(stage, "cancelled");
                NodeError::Cancelled {
                    node: self.name.clone(),
                }
            }
        }
    }
}

/// Shell command that prints `true` once `marker` exists.
#[must_use]
pub fn boot_marker_check(marker: &str) -> String {
    format!("[ -e {} ] && echo \"true\"", escape(marker.into()))
}

#[cfg(test)]
mod tests;
