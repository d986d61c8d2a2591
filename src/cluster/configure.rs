//! Post-boot configuration of a ready cluster.
//!
//! Steps run strictly in order against the coordinator and every worker
//! that finished booting. The first failure stops the sequence, and so does
//! cancellation: no remote action starts once the token fires.

use std::fmt;
use std::net::IpAddr;

use futures::future::join_all;
use serde::Serialize;
use shell_escape::unix::escape;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::manifest::{ManifestEntry, render_manifest};
use super::templates::{Substitutions, load_template};
use super::{ClusterError, ClusterGroup, ClusterOrchestrator};
use crate::compute::ComputeApi;
use crate::node::{InstanceHandle, NodeError};
use crate::remote::{CommandRunner, RemoteError, RemoteExecutor};

const SETUP_SSH_KEYS: &str = "~/setup-ssh-keys.sh";
const SETUP_WORKER_NODES: &str = "~/setup-ssh-worker-nodes.sh";

/// One configuration step, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigureStep {
    /// Render the node manifest.
    RenderManifest,
    /// Upload the manifest to the coordinator.
    UploadManifest,
    /// Generate the coordinator's SSH keys.
    SetupSshKeys,
    /// Register workers with the coordinator.
    RegisterWorkers,
    /// Render the data-store connection file.
    RenderDatastore,
    /// Upload the data-store file to every node.
    UploadDatastore,
    /// Apply the configured mode to uploaded files.
    SetPermissions,
}

impl fmt::Display for ConfigureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RenderManifest => "render_manifest",
            Self::UploadManifest => "upload_manifest",
            Self::SetupSshKeys => "setup_ssh_keys",
            Self::RegisterWorkers => "register_workers",
            Self::RenderDatastore => "render_datastore",
            Self::UploadDatastore => "upload_datastore",
            Self::SetPermissions => "set_permissions",
        })
    }
}

/// Result of a completed configuration run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ConfigureOutcome {
    /// Nodes that received every step, coordinator first.
    pub configured: Vec<String>,
    /// Workers left out because they never finished booting.
    pub skipped: Vec<String>,
    /// Steps completed, in order.
    pub steps: Vec<ConfigureStep>,
}

impl ConfigureOutcome {
    /// One-line worker tally, for example `4 of 5 workers configured, 1 failed`.
    #[must_use]
    pub fn summary(&self) -> String {
        let configured = self.configured.len().saturating_sub(1);
        let total = configured + self.skipped.len();
        format!(
            "{configured} of {total} workers configured, {} failed",
            self.skipped.len()
        )
    }
}

/// A node taking part in configuration, with its address resolved.
struct Target<'a> {
    handle: &'a InstanceHandle,
    address: IpAddr,
}

impl<A, R> ClusterOrchestrator<A, R>
where
    A: ComputeApi,
    R: CommandRunner + Clone,
{
    /// Distributes the manifest and data-store file and registers workers
    /// with the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::MissingKeyMaterial`] without a private key,
    /// [`ClusterError::CoordinatorNotReady`] before the coordinator finished
    /// booting, [`ClusterError::Template`] when the data-store template
    /// cannot be read, [`ClusterError::ConfigurationStep`] for the first
    /// step that fails, and [`ClusterError::Cancelled`] when `cancel` fires
    /// before a remote step starts.
    pub async fn configure_cluster(
        &self,
        group: &ClusterGroup,
        cancel: &CancellationToken,
    ) -> Result<ConfigureOutcome, ClusterError> {
        let remote = self.executor(group)?;
        let run = StepRunner {
            group_id: group.group_id(),
            remote: &remote,
            cancel,
        };
        run.ensure_not_cancelled(ConfigureStep::RenderManifest)?;
        let coordinator_handle = group.coordinator();
        if !coordinator_handle.is_boot_configured() {
            return Err(ClusterError::CoordinatorNotReady {
                group_id: group.group_id().to_owned(),
                state: coordinator_handle.state().to_string(),
            });
        }
        let mut outcome = ConfigureOutcome::default();

        let coordinator = run.target(coordinator_handle, ConfigureStep::RenderManifest)?;
        let mut workers = Vec::new();
        for handle in group.workers() {
            if handle.is_boot_configured() {
                workers.push(run.target(handle, ConfigureStep::RenderManifest)?);
            } else {
                warn!(
                    group_id = group.group_id(),
                    node = handle.name(),
                    state = %handle.state(),
                    "skipping worker that did not finish booting"
                );
                outcome.skipped.push(handle.name().to_owned());
            }
        }

        let entries = std::iter::once(&coordinator)
            .chain(&workers)
            .map(|target| ManifestEntry::from_handle(target.handle))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| {
                run.failed(coordinator.handle, ConfigureStep::RenderManifest, source)
            })?;
        let manifest = render_manifest(&entries, &remote.config().ssh_user);
        run.completed(&mut outcome, ConfigureStep::RenderManifest);

        let manifest_path = self.cluster.manifest_remote_path.as_str();
        run.on(
            &coordinator,
            ConfigureStep::UploadManifest,
            remote.upload_contents(coordinator.address, &manifest, manifest_path),
        )
        .await?;
        run.completed(&mut outcome, ConfigureStep::UploadManifest);

        run.command(&coordinator, ConfigureStep::SetupSshKeys, SETUP_SSH_KEYS)
            .await?;
        run.completed(&mut outcome, ConfigureStep::SetupSshKeys);

        let register = format!("{SETUP_WORKER_NODES} {}", escape(manifest_path.into()));
        run.command(&coordinator, ConfigureStep::RegisterWorkers, &register)
            .await?;
        run.completed(&mut outcome, ConfigureStep::RegisterWorkers);

        let template = load_template("datastore", &self.cluster.datastore_template)?;
        let coordinator_ip = coordinator.address.to_string();
        let datastore = Substitutions::coordinator(&coordinator_ip).apply(&template);
        run.completed(&mut outcome, ConfigureStep::RenderDatastore);

        let datastore_path = self.cluster.datastore_remote_path.as_str();
        run.on(
            &coordinator,
            ConfigureStep::UploadDatastore,
            remote.upload_contents(coordinator.address, &datastore, datastore_path),
        )
        .await?;
        run.on_each(&workers, ConfigureStep::UploadDatastore, |target| {
            remote.upload_contents(target.address, &datastore, datastore_path)
        })
        .await?;
        run.completed(&mut outcome, ConfigureStep::UploadDatastore);

        let mode = self.cluster.uploaded_file_mode.trim();
        let chmod_manifest = format!("chmod {mode} {}", escape(manifest_path.into()));
        let chmod_datastore = format!("chmod {mode} {}", escape(datastore_path.into()));
        run.command(&coordinator, ConfigureStep::SetPermissions, &chmod_manifest)
            .await?;
        run.command(&coordinator, ConfigureStep::SetPermissions, &chmod_datastore)
            .await?;
        let executor = &remote;
        let chmod = chmod_datastore.as_str();
        run.on_each(&workers, ConfigureStep::SetPermissions, |target| async move {
            executor.run_checked(target.address, chmod).await.map(drop)
        })
        .await?;
        run.completed(&mut outcome, ConfigureStep::SetPermissions);

        outcome.configured = std::iter::once(&coordinator)
            .chain(&workers)
            .map(|target| target.handle.name().to_owned())
            .collect();
        info!(
            group_id = group.group_id(),
            summary = %outcome.summary(),
            "cluster configured"
        );
        Ok(outcome)
    }
}

/// Runs steps for one group and maps failures to
/// [`ClusterError::ConfigurationStep`].
struct StepRunner<'a, R: CommandRunner> {
    group_id: &'a str,
    remote: &'a RemoteExecutor<R>,
    cancel: &'a CancellationToken,
}

impl<R: CommandRunner> StepRunner<'_, R> {
    fn target<'h>(
        &self,
        handle: &'h InstanceHandle,
        step: ConfigureStep,
    ) -> Result<Target<'h>, ClusterError> {
        let address = handle
            .require_address()
            .map_err(|source| self.failed(handle, step, source))?;
        Ok(Target { handle, address })
    }

    fn completed(&self, outcome: &mut ConfigureOutcome, step: ConfigureStep) {
        info!(group_id = self.group_id, %step, "configuration step completed");
        outcome.steps.push(step);
    }

    fn failed(
        &self,
        handle: &InstanceHandle,
        step: ConfigureStep,
        source: NodeError,
    ) -> ClusterError {
        ClusterError::ConfigurationStep {
            group_id: self.group_id.to_owned(),
            node: handle.name().to_owned(),
            step,
            source: Box::new(source),
        }
    }

    fn remote_failed(
        &self,
        handle: &InstanceHandle,
        step: ConfigureStep,
        source: RemoteError,
    ) -> ClusterError {
        self.failed(
            handle,
            step,
            NodeError::Remote {
                node: handle.name().to_owned(),
                source,
            },
        )
    }

    fn ensure_not_cancelled(&self, step: ConfigureStep) -> Result<(), ClusterError> {
        if self.cancel.is_cancelled() {
            warn!(group_id = self.group_id, %step, "configuration cancelled");
            return Err(ClusterError::Cancelled {
                group_id: self.group_id.to_owned(),
                step,
            });
        }
        Ok(())
    }

    async fn on(
        &self,
        target: &Target<'_>,
        step: ConfigureStep,
        action: impl Future<Output = Result<(), RemoteError>>,
    ) -> Result<(), ClusterError> {
        self.ensure_not_cancelled(step)?;
        action
            .await
            .map_err(|source| self.remote_failed(target.handle, step, source))
    }

    async fn command(
        &self,
        target: &Target<'_>,
        step: ConfigureStep,
        command: &str,
    ) -> Result<(), ClusterError> {
        let action = async { self.remote.run_checked(target.address, command).await.map(drop) };
        self.on(target, step, action).await
    }

    /// Runs `action` against every target concurrently and reports the
    /// first failure in target order.
    async fn on_each<'t, F, Fut>(
        &self,
        targets: &'t [Target<'t>],
        step: ConfigureStep,
        action: F,
    ) -> Result<(), ClusterError>
    where
        F: Fn(&'t Target<'t>) -> Fut,
        Fut: Future<Output = Result<(), RemoteError>>,
    {
        self.ensure_not_cancelled(step)?;
        let results = join_all(targets.iter().map(&action)).await;
        targets
            .iter()
            .zip(results)
            .try_for_each(|(target, result)| {
                result.map_err(|source| self.remote_failed(target.handle, step, source))
            })
    }
}
