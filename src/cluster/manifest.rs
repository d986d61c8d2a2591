//! Node manifest consumed by the coordinator's worker registration script.
//!
//! One newline-terminated line per node, pipe separated:
//! `master|addr|dns|procs|user|user` for the coordinator and
//! `worker|addr|dns|procs|user|user|true` for each worker.

use std::net::IpAddr;

use crate::compute::NodeRole;
use crate::node::{InstanceHandle, NodeError};

/// One manifest line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestEntry {
    /// Role of the node.
    pub role: NodeRole,
    /// Address the coordinator reaches the node on.
    pub address: IpAddr,
    /// Public DNS name, rendered empty when unknown.
    pub dns_name: Option<String>,
    /// Process capacity, rendered empty when unknown.
    pub process_count: Option<u32>,
}

impl ManifestEntry {
    /// Builds the entry for `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotReady`] when the handle has no address.
    pub fn from_handle(handle: &InstanceHandle) -> Result<Self, NodeError> {
        Ok(Self {
            role: handle.role(),
            address: handle.require_address()?,
            dns_name: handle.dns_name().map(ToOwned::to_owned),
            process_count: handle.process_count(),
        })
    }
}

/// Renders `entries` for `user`, in order.
#[must_use]
pub fn render_manifest(entries: &[ManifestEntry], user: &str) -> String {
    let mut manifest = String::new();
    for entry in entries {
        let procs = entry
            .process_count
            .map(|count| count.to_string())
            .unwrap_or_default();
        manifest.push_str(&format!(
            "{}|{}|{}|{procs}|{user}|{user}",
            entry.role.manifest_label(),
            entry.address,
            entry.dns_name.as_deref().unwrap_or_default(),
        ));
        if entry.role == NodeRole::Worker {
            manifest.push_str("|true");
        }
        manifest.push('\n');
    }
    manifest
}
