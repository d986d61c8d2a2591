//! Remote command execution and file upload over `ssh` and `scp`.
//!
//! Every call authenticates with the cluster's private key, materialised
//! once per executor as an owner-only temporary identity file. Connection
//! failures (exit status 255) are retried with exponential backoff; any other
//! exit status belongs to the remote command and is handed back untouched.

use std::ffi::OsString;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::compute::KeyMaterial;
use crate::files;
use crate::wait::{WaitInterrupt, WaitPolicy};

mod config;
mod error;
mod identity;
mod types;

pub use config::RemoteConfig;
pub use error::RemoteError;
pub use types::{
    CONNECTION_FAILURE_CODE, CommandOutput, CommandRunner, ProcessCommandRunner,
    RemoteCommandOutput, RunnerFuture,
};

use identity::IdentityFile;

/// Runs commands on and copies files to cluster nodes.
#[derive(Clone, Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    config: RemoteConfig,
    runner: R,
    identity: Option<Arc<IdentityFile>>,
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor authenticating with `key`.
    ///
    /// Without a key the executor still constructs, but every operation
    /// fails with [`RemoteError::MissingKeyMaterial`].
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when configuration validation
    /// fails and [`RemoteError::Identity`] when the key cannot be staged.
    pub fn new(
        config: RemoteConfig,
        runner: R,
        key: Option<&KeyMaterial>,
    ) -> Result<Self, RemoteError> {
        config.validate()?;
        let identity = key
            .filter(|material| !material.is_empty())
            .map(IdentityFile::write)
            .transpose()?
            .map(Arc::new);
        Ok(Self {
            config,
            runner,
            identity,
        })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Returns `true` when the executor holds key material.
    #[must_use]
    pub const fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Executes `command` on `address` and returns its output, whatever the
    /// exit status.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::MissingKeyMaterial`] without a key,
    /// [`RemoteError::Unreachable`] once every connection attempt failed, and
    /// [`RemoteError::Spawn`] when `ssh` cannot be started.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the SSH client. Ensure any
    /// caller-provided arguments are validated or quoted upstream.
    pub async fn run(
        &self,
        address: IpAddr,
        command: &str,
    ) -> Result<RemoteCommandOutput, RemoteError> {
        let mut args = self.common_ssh_options("-p")?;
        args.push(OsString::from(format!("{}@{address}", self.config.ssh_user)));
        args.push(OsString::from(command));
        debug!(host = %address, command, "running remote command");
        let output = self
            .run_with_retry(&self.config.ssh_bin, &args, address)
            .await?;
        Ok(output.into())
    }

    /// Executes `command` and fails unless it exits with status zero.
    ///
    /// # Errors
    ///
    /// Returns any error from [`RemoteExecutor::run`], plus
    /// [`RemoteError::CommandFailed`] for a non-zero exit.
    pub async fn run_checked(
        &self,
        address: IpAddr,
        command: &str,
    ) -> Result<RemoteCommandOutput, RemoteError> {
        let output = self.run(address, command).await?;
        if output.is_success() {
            return Ok(output);
        }
        Err(RemoteError::CommandFailed {
            host: address.to_string(),
            command: command.to_owned(),
            status: output.exit_code,
            stderr: output.stderr,
        })
    }

    /// Polls `command` until `predicate` accepts its output.
    ///
    /// An unreachable node counts as not ready yet. Checks are spaced by the
    /// policy's poll interval and stop at its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Timeout`] once the deadline passes,
    /// [`RemoteError::Cancelled`] when `cancel` fires, and any
    /// non-connection error from [`RemoteExecutor::run`].
    pub async fn run_until<P>(
        &self,
        address: IpAddr,
        command: &str,
        predicate: P,
        policy: WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<RemoteCommandOutput, RemoteError>
    where
        P: Fn(&RemoteCommandOutput) -> bool + Send + Sync,
    {
        let deadline = policy.start();
        let timed_out = || RemoteError::Timeout {
            host: address.to_string(),
            command: command.to_owned(),
            waited_secs: deadline.elapsed().as_secs(),
        };
        loop {
            if cancel.is_cancelled() {
                return Err(RemoteError::Cancelled {
                    host: address.to_string(),
                });
            }
            let attempt = tokio::select! {
                () = cancel.cancelled() => {
                    return Err(RemoteError::Cancelled { host: address.to_string() });
                }
                () = deadline.expired() => {
                    warn!(host = %address, command, "readiness check still running at deadline");
                    return Err(timed_out());
                }
                result = self.run(address, command) => result,
            };
            match attempt {
                Ok(output) if predicate(&output) => return Ok(output),
                Ok(output) => {
                    debug!(host = %address, command, status = ?output.exit_code, "condition not met yet");
                }
                Err(RemoteError::Unreachable { stderr, .. }) => {
                    debug!(host = %address, %stderr, "node not reachable yet");
                }
                Err(err) => return Err(err),
            }

            deadline
                .pause(cancel)
                .await
                .map_err(|interrupt| match interrupt {
                    WaitInterrupt::Expired => timed_out(),
                    WaitInterrupt::Cancelled => RemoteError::Cancelled {
                        host: address.to_string(),
                    },
                })?;
        }
    }

    /// Copies `local_path` to `remote_path` on `address`, overwriting it.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::MissingKeyMaterial`] without a key,
    /// [`RemoteError::Unreachable`] once every connection attempt failed, and
    /// [`RemoteError::CommandFailed`] when `scp` reports any other failure.
    pub async fn upload(
        &self,
        address: IpAddr,
        local_path: &Utf8Path,
        remote_path: &str,
    ) -> Result<(), RemoteError> {
        let mut args = self.common_ssh_options("-P")?;
        args.push(OsString::from("-q"));
        args.push(OsString::from(local_path.as_str()));
        args.push(OsString::from(scp_target(
            &self.config.ssh_user,
            address,
            remote_path,
        )));
        debug!(host = %address, local = %local_path, remote = remote_path, "uploading file");
        let output = self
            .run_with_retry(&self.config.scp_bin, &args, address)
            .await?;
        if output.is_success() {
            return Ok(());
        }
        Err(RemoteError::CommandFailed {
            host: address.to_string(),
            command: format!("{} {local_path} {remote_path}", self.config.scp_bin),
            status: output.code,
            stderr: output.stderr,
        })
    }

    /// Writes `contents` to a temporary file and uploads it to
    /// `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Staging`] when the temporary file cannot be
    /// written, or any error from [`RemoteExecutor::upload`].
    pub async fn upload_contents(
        &self,
        address: IpAddr,
        contents: &str,
        remote_path: &str,
    ) -> Result<(), RemoteError> {
        let staging_error = |path: &str, message: String| RemoteError::Staging {
            path: path.to_owned(),
            message,
        };
        let staged = tempfile::Builder::new()
            .prefix("armada-upload-")
            .tempfile()
            .map_err(|err| staging_error(remote_path, err.to_string()))?;
        let local = Utf8Path::from_path(staged.path())
            .ok_or_else(|| staging_error(remote_path, String::from("path is not UTF-8")))?;
        files::write_owner_only(local.as_str(), contents)
            .map_err(|message| staging_error(local.as_str(), message))?;
        self.upload(address, local, remote_path).await
    }

    async fn run_with_retry(
        &self,
        program: &str,
        args: &[OsString],
        address: IpAddr,
    ) -> Result<CommandOutput, RemoteError> {
        let attempts = self.config.connect_attempts.max(1);
        let mut attempt = 1;
        loop {
            let output = self.runner.run(program, args).await?;
            if !output.is_connection_failure() {
                return Ok(output);
            }
            if attempt >= attempts {
                return Err(RemoteError::Unreachable {
                    host: address.to_string(),
                    attempts,
                    stderr: output.stderr.trim().to_owned(),
                });
            }
            let delay = self.backoff(attempt);
            warn!(
                host = %address,
                attempt,
                attempts,
                delay_ms = delay.as_millis(),
                "connection failed; retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.connect_backoff_ms.saturating_mul(factor))
    }

    fn common_ssh_options(&self, port_flag: &str) -> Result<Vec<OsString>, RemoteError> {
        let identity = self
            .identity
            .as_ref()
            .ok_or(RemoteError::MissingKeyMaterial)?;

        let mut args = vec![
            OsString::from(port_flag),
            OsString::from(self.config.ssh_port.to_string()),
            OsString::from("-i"),
            identity.path().as_os_str().to_owned(),
        ];

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        if self.config.ssh_connect_timeout_secs > 0 {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "ConnectTimeout={}",
                self.config.ssh_connect_timeout_secs
            )));
        }

        Ok(args)
    }
}

fn scp_target(user: &str, address: IpAddr, remote_path: &str) -> String {
    match address {
        IpAddr::V4(v4) => format!("{user}@{v4}:{remote_path}"),
        IpAddr::V6(v6) => format!("{user}@[{v6}]:{remote_path}"),
    }
}
