//! Cluster provisioning: one coordinator plus a pool of workers.
//!
//! [`ClusterOrchestrator`] drives the whole lifecycle. It resolves shared
//! resources, launches the coordinator first (workers need its address),
//! fans worker launches and readiness polls out concurrently, then hands the
//! booted nodes to the configuration steps. The orchestrator keeps no state
//! between calls; every operation receives the [`ClusterGroup`] it acts on.

use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::compute::{
    ComputeAdapter, ComputeApi, ComputeError, DEFAULT_SECURITY_GROUP_NAME, InstanceFilter,
    InstanceTags, KeyMaterial, KeyPairSpec, LaunchRequest, NodeRole, SecurityGroupSpec,
    default_key_pair_name,
};
use crate::config::{ClusterConfig, ScalewayConfig};
use crate::node::{InstanceHandle, NodeError, NodeState};
use crate::remote::{CommandRunner, RemoteConfig, RemoteExecutor};

mod configure;
mod descriptor;
mod error;
mod manifest;
mod templates;

pub use configure::{ConfigureOutcome, ConfigureStep};
pub use descriptor::{ClusterDescriptor, NodeSummary};
pub use error::ClusterError;
pub use manifest::{ManifestEntry, render_manifest};
pub use templates::{
    COORDINATOR_HOSTNAME, SERVER_ALIAS, SERVER_HOSTNAME, SERVER_IP, Substitutions, TemplateError,
    load_template,
};

/// Returns a fresh group identifier: the current Unix time in seconds.
#[must_use]
pub fn new_group_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
        .to_string()
}

/// Everything one provisioning run created or found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterGroup {
    group_id: String,
    security_group: SecurityGroupSpec,
    key_pair: KeyPairSpec,
    coordinator: InstanceHandle,
    workers: Vec<InstanceHandle>,
}

impl ClusterGroup {
    /// Creates a group without workers.
    #[must_use]
    pub const fn new(
        group_id: String,
        security_group: SecurityGroupSpec,
        key_pair: KeyPairSpec,
        coordinator: InstanceHandle,
    ) -> Self {
        Self {
            group_id,
            security_group,
            key_pair,
            coordinator,
            workers: Vec::new(),
        }
    }

    /// Group identifier carried in every instance tag.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Resolved security group.
    #[must_use]
    pub const fn security_group(&self) -> &SecurityGroupSpec {
        &self.security_group
    }

    /// Resolved key pair.
    #[must_use]
    pub const fn key_pair(&self) -> &KeyPairSpec {
        &self.key_pair
    }

    /// Coordinator handle.
    #[must_use]
    pub const fn coordinator(&self) -> &InstanceHandle {
        &self.coordinator
    }

    /// Worker handles in launch order.
    #[must_use]
    pub fn workers(&self) -> &[InstanceHandle] {
        &self.workers
    }

    /// Supplies the private key for a key pair whose material was not
    /// available at resolution time.
    pub fn attach_private_key(&mut self, material: KeyMaterial) {
        self.key_pair.material = Some(material);
    }

    /// Snapshot of every node. Fields not yet observed are `None`.
    #[must_use]
    pub fn describe_cluster(&self) -> ClusterDescriptor {
        ClusterDescriptor {
            group_id: self.group_id.clone(),
            security_group: self.security_group.name.clone(),
            key_pair: self.key_pair.name.clone(),
            coordinator: NodeSummary::from(&self.coordinator),
            workers: self.workers.iter().map(NodeSummary::from).collect(),
        }
    }

    fn handles_mut(&mut self) -> impl Iterator<Item = &mut InstanceHandle> {
        std::iter::once(&mut self.coordinator).chain(self.workers.iter_mut())
    }
}

/// Parameters of one provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Image label or identifier.
    pub image: String,
    /// Commercial instance type.
    pub instance_type: String,
    /// Number of workers to launch.
    pub worker_count: u32,
    /// Security group to reuse or create.
    pub security_group_name: Option<String>,
    /// Key pair to reuse or create.
    pub key_pair_name: Option<String>,
    /// Local private key for an existing key pair.
    pub private_key_path: Option<Utf8PathBuf>,
    /// Fixed group identifier; a fresh one is generated when unset.
    pub group_id: Option<String>,
    /// Where to write the private key of a newly created key pair.
    pub save_key_path: Option<Utf8PathBuf>,
}

impl ProvisionRequest {
    /// Builds a request from configured defaults.
    #[must_use]
    pub fn from_config(cluster: &ClusterConfig, scaleway: &ScalewayConfig) -> Self {
        Self {
            image: scaleway.default_image.clone(),
            instance_type: scaleway.default_instance_type.clone(),
            worker_count: cluster.worker_count,
            security_group_name: cluster.security_group_name.clone(),
            key_pair_name: cluster.key_pair_name.clone(),
            private_key_path: cluster
                .private_key_path
                .as_deref()
                .map(|path| Utf8PathBuf::from(crate::files::expand_tilde(path))),
            group_id: None,
            save_key_path: None,
        }
    }
}

/// A node that did not reach the expected state, and why.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeFailure {
    /// Node name.
    pub node: String,
    /// What went wrong.
    pub error: NodeError,
}

/// Result of [`ClusterOrchestrator::provision`].
#[derive(Clone, Debug)]
pub struct ProvisionReport {
    /// The provisioned group.
    pub group: ClusterGroup,
    /// Workers whose launch failed.
    pub failures: Vec<NodeFailure>,
}

/// Result of [`ClusterOrchestrator::await_ready`].
#[derive(Clone, Debug, Default)]
pub struct ReadinessReport {
    /// Nodes that finished booting.
    pub ready: Vec<String>,
    /// Nodes that were never launched and were not polled.
    pub skipped: Vec<String>,
    /// Nodes that failed to become ready.
    pub failures: Vec<NodeFailure>,
}

/// Drives cluster operations against a compute provider and remote channel.
#[derive(Clone, Debug)]
pub struct ClusterOrchestrator<A, R> {
    compute: ComputeAdapter<A>,
    cluster: ClusterConfig,
    remote: RemoteConfig,
    runner: R,
}

impl<A, R> ClusterOrchestrator<A, R>
where
    A: ComputeApi,
    R: CommandRunner + Clone,
{
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        compute: ComputeAdapter<A>,
        cluster: ClusterConfig,
        remote: RemoteConfig,
        runner: R,
    ) -> Self {
        Self {
            compute,
            cluster,
            remote,
            runner,
        }
    }

    /// Returns the compute adapter.
    #[must_use]
    pub const fn compute(&self) -> &ComputeAdapter<A> {
        &self.compute
    }

    /// Resolves shared resources and launches the coordinator and workers.
    ///
    /// The coordinator is launched and awaited first; its address is
    /// substituted into the worker boot script before workers launch
    /// concurrently. A failed worker launch is recorded on its handle and
    /// in the report without stopping its siblings.
    ///
    /// A newly created private key is written to
    /// [`ProvisionRequest::save_key_path`] before anything launches, so it
    /// survives a failed coordinator launch.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Template`] when a boot script cannot be read,
    /// [`ClusterError::Resource`] when the security group or key pair cannot
    /// be resolved, [`ClusterError::KeySave`] when a new private key cannot
    /// be written, [`ClusterError::InvalidRequest`] for incomplete launch
    /// parameters, and [`ClusterError::CoordinatorLaunch`] when the
    /// coordinator fails to launch or report networking.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<ProvisionReport, ClusterError> {
        let group_id = request.group_id.clone().unwrap_or_else(new_group_id);
        let coordinator_script = load_template("coordinator", &self.cluster.coordinator_script)?;
        let worker_template = load_template("worker", &self.cluster.worker_script)?;

        let resource_error = |source| ClusterError::Resource {
            group_id: group_id.clone(),
            source,
        };
        let security_group = self
            .compute
            .resolve_or_create_security_group(request.security_group_name.as_deref())
            .await
            .map_err(resource_error)?;
        let key_pair = self
            .compute
            .resolve_or_create_key_pair(
                request.key_pair_name.as_deref(),
                &group_id,
                request.private_key_path.as_deref(),
            )
            .await
            .map_err(resource_error)?;
        info!(
            %group_id,
            security_group = %security_group.name,
            key_pair = %key_pair.name,
            key_created = key_pair.created,
            "cluster resources resolved"
        );
        if let Some(path) = request.save_key_path.as_deref() {
            save_private_key(&group_id, &key_pair, path)?;
        }

        let launch = LaunchPlan {
            request,
            group_id: &group_id,
            security_group: &security_group,
            key_pair: &key_pair.name,
        };
        let coordinator_name = format!("armada-{group_id}-coordinator");
        let coordinator_request = launch
            .request(NodeRole::Coordinator, &coordinator_name, &coordinator_script)
            .map_err(|source| ClusterError::InvalidRequest {
                group_id: group_id.clone(),
                source,
            })?;
        let mut coordinator = InstanceHandle::new(NodeRole::Coordinator, coordinator_name);
        let coordinator_error = |source| ClusterError::CoordinatorLaunch {
            group_id: group_id.clone(),
            source: Box::new(source),
        };
        coordinator
            .launch(&self.compute, &coordinator_request)
            .await
            .map_err(coordinator_error)?;
        coordinator
            .wait_until_ready(&self.compute, self.cluster.network_wait(), cancel)
            .await
            .map_err(coordinator_error)?;
        let coordinator_ip = coordinator
            .require_address()
            .map_err(coordinator_error)?
            .to_string();
        let worker_script = Substitutions::coordinator(&coordinator_ip).apply(&worker_template);

        let mut workers: Vec<InstanceHandle> = (1..=request.worker_count)
            .map(|index| {
                InstanceHandle::new(NodeRole::Worker, format!("armada-{group_id}-worker-{index}"))
            })
            .collect();
        let worker_requests = workers
            .iter()
            .map(|handle| launch.request(NodeRole::Worker, handle.name(), &worker_script))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ClusterError::InvalidRequest {
                group_id: group_id.clone(),
                source,
            })?;

        let results = join_all(
            workers
                .iter_mut()
                .zip(&worker_requests)
                .map(|(handle, worker_request)| handle.launch(&self.compute, worker_request)),
        )
        .await;
        let failures: Vec<NodeFailure> = workers
            .iter()
            .zip(results)
            .filter_map(|(handle, result)| {
                result.err().map(|error| NodeFailure {
                    node: handle.name().to_owned(),
                    error,
                })
            })
            .collect();
        info!(
            %group_id,
            launched = workers.len() - failures.len(),
            failed = failures.len(),
            "workers launched"
        );

        let mut group = ClusterGroup::new(group_id, security_group, key_pair, coordinator);
        group.workers = workers;
        Ok(ProvisionReport { group, failures })
    }

    /// Waits for every launched node to report networking and finish its
    /// first-boot script.
    ///
    /// Nodes are polled concurrently; a slow or failed node does not hold
    /// the others back. Nodes that were never launched are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::MissingKeyMaterial`] without a private key and
    /// [`ClusterError::RemoteSetup`] when the remote channel cannot be
    /// prepared. Per-node failures are reported, not raised.
    pub async fn await_ready(
        &self,
        group: &mut ClusterGroup,
        cancel: &CancellationToken,
    ) -> Result<ReadinessReport, ClusterError> {
        let remote = self.executor(group)?;
        let group_id = group.group_id.clone();
        let network = self.cluster.network_wait();
        let boot = self.cluster.boot_wait();
        let marker = self.cluster.boot_marker.as_str();

        let mut report = ReadinessReport::default();
        let mut pending = Vec::new();
        for handle in group.handles_mut() {
            if matches!(handle.state(), NodeState::Requested | NodeState::Failed { .. }) {
                warn!(%group_id, node = handle.name(), state = %handle.state(), "not polling node");
                report.skipped.push(handle.name().to_owned());
            } else {
                pending.push(handle);
            }
        }

        let executor = &remote;
        let outcomes = join_all(pending.into_iter().map(|handle| async move {
            let result: Result<(), NodeError> = async {
                handle
                    .wait_until_ready(&self.compute, network, cancel)
                    .await?;
                handle.await_boot(executor, marker, boot, cancel).await
            }
            .await;
            (handle.name().to_owned(), result)
        }))
        .await;

        for (node, result) in outcomes {
            match result {
                Ok(()) => report.ready.push(node),
                Err(error) => report.failures.push(NodeFailure { node, error }),
            }
        }
        info!(
            %group_id,
            ready = report.ready.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "readiness wait finished"
        );
        Ok(report)
    }

    /// Rebuilds a group from the running coordinator tagged with `group_id`.
    ///
    /// Workers and private key material are not recovered; attach a key
    /// with [`ClusterGroup::attach_private_key`] before remote steps.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::NoCoordinator`] or
    /// [`ClusterError::AmbiguousCoordinator`] unless exactly one coordinator
    /// runs, and [`ClusterError::Rediscover`] when the listing fails.
    pub async fn rediscover(&self, group_id: &str) -> Result<ClusterGroup, ClusterError> {
        let filter = InstanceFilter::group(group_id).with_role(NodeRole::Coordinator);
        let mut found = self
            .compute
            .find_running_instances(&filter)
            .await
            .map_err(|source| ClusterError::Rediscover {
                group_id: group_id.to_owned(),
                source,
            })?;
        let snapshot = match found.len() {
            0 => {
                return Err(ClusterError::NoCoordinator {
                    group_id: group_id.to_owned(),
                });
            }
            1 => found.remove(0),
            count => {
                return Err(ClusterError::AmbiguousCoordinator {
                    group_id: group_id.to_owned(),
                    count,
                });
            }
        };

        let security_group = snapshot.security_group.clone().unwrap_or_else(|| {
            SecurityGroupSpec {
                id: String::new(),
                name: DEFAULT_SECURITY_GROUP_NAME.to_owned(),
            }
        });
        let key_pair = KeyPairSpec {
            name: snapshot
                .key_pair
                .clone()
                .unwrap_or_else(|| default_key_pair_name(group_id)),
            material: None,
            created: false,
        };
        let coordinator = InstanceHandle::from_snapshot(NodeRole::Coordinator, &snapshot);
        info!(
            group_id,
            instance_id = %snapshot.id,
            address = ?coordinator.address(),
            "coordinator rediscovered"
        );
        Ok(ClusterGroup::new(
            group_id.to_owned(),
            security_group,
            key_pair,
            coordinator,
        ))
    }

    fn executor(&self, group: &ClusterGroup) -> Result<RemoteExecutor<R>, ClusterError> {
        if !group.key_pair.has_material() {
            warn!(
                group_id = %group.group_id,
                key_pair = %group.key_pair.name,
                "no private key available for remote steps"
            );
            return Err(ClusterError::MissingKeyMaterial {
                group_id: group.group_id.clone(),
                key_pair: group.key_pair.name.clone(),
            });
        }
        RemoteExecutor::new(
            self.remote.clone(),
            self.runner.clone(),
            group.key_pair.material.as_ref(),
        )
        .map_err(|source| ClusterError::RemoteSetup {
            group_id: group.group_id.clone(),
            source,
        })
    }
}

fn save_private_key(
    group_id: &str,
    key_pair: &KeyPairSpec,
    path: &Utf8Path,
) -> Result<(), ClusterError> {
    match (&key_pair.material, key_pair.created) {
        (Some(material), true) => {
            material
                .persist(path)
                .map_err(|source| ClusterError::KeySave {
                    group_id: group_id.to_owned(),
                    key_pair: key_pair.name.clone(),
                    source,
                })?;
            info!(group_id, key_pair = %key_pair.name, %path, "private key saved");
        }
        _ => warn!(
            group_id,
            key_pair = %key_pair.name,
            "key pair already existed; no new private key to save"
        ),
    }
    Ok(())
}

/// Shared launch parameters for every node of one run.
struct LaunchPlan<'a> {
    request: &'a ProvisionRequest,
    group_id: &'a str,
    security_group: &'a SecurityGroupSpec,
    key_pair: &'a str,
}

impl LaunchPlan<'_> {
    fn request(
        &self,
        role: NodeRole,
        name: &str,
        boot_script: &str,
    ) -> Result<LaunchRequest, ComputeError> {
        LaunchRequest::builder(
            self.security_group.clone(),
            InstanceTags {
                group_id: self.group_id.to_owned(),
                role,
                key_pair: self.key_pair.to_owned(),
            },
        )
        .name(name)
        .image(&self.request.image)
        .instance_type(&self.request.instance_type)
        .boot_script(boot_script)
        .build()
    }
}
