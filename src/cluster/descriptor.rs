//! Serialisable snapshot of a cluster.

use std::net::IpAddr;

use serde::Serialize;

use crate::compute::NodeRole;
use crate::node::{FailureStage, InstanceHandle, NodeState};

/// Summary of one node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NodeSummary {
    /// Name the node was launched with.
    pub name: String,
    /// Role of the node.
    pub role: NodeRole,
    /// Provider identifier.
    pub id: Option<String>,
    /// Address remote commands target.
    pub address: Option<IpAddr>,
    /// Public DNS name.
    pub dns: Option<String>,
    /// Process capacity.
    pub process_count: Option<u32>,
    /// Lifecycle state.
    pub state: String,
    /// Stage the node failed at, if it failed.
    pub failed_at: Option<FailureStage>,
}

impl From<&InstanceHandle> for NodeSummary {
    fn from(handle: &InstanceHandle) -> Self {
        Self {
            name: handle.name().to_owned(),
            role: handle.role(),
            id: handle.instance_id().map(ToOwned::to_owned),
            address: handle.address(),
            dns: handle.dns_name().map(ToOwned::to_owned),
            process_count: handle.process_count(),
            state: handle.state().to_string(),
            failed_at: match handle.state() {
                NodeState::Failed { stage, .. } => Some(*stage),
                _ => None,
            },
        }
    }
}

/// Snapshot of a cluster; worker order is handle order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ClusterDescriptor {
    /// Group identifier.
    pub group_id: String,
    /// Security group name.
    pub security_group: String,
    /// Key pair name.
    pub key_pair: String,
    /// Coordinator summary.
    pub coordinator: NodeSummary,
    /// Worker summaries.
    pub workers: Vec<NodeSummary>,
}

impl ClusterDescriptor {
    /// Renders the descriptor as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error, which cannot occur for this shape in
    /// practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Returns `true` when any node ended in a failed state.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        std::iter::once(&self.coordinator)
            .chain(&self.workers)
            .any(|node| node.failed_at.is_some())
    }
}
