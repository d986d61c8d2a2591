//! Remote channel configuration structures and validation.
//!
//! [`RemoteConfig`] carries the `ssh`, `scp`, and `ssh-keygen` settings used
//! to reach cluster nodes. Configuration is loaded via `ortho-config` which
//! merges defaults, configuration files, and environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use super::RemoteError;

/// SSH settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ARMADA_REMOTE",
    discovery(
        app_name = "armada",
        env_var = "ARMADA_CONFIG_PATH",
        config_file_name = "armada.toml",
        dotfile_name = ".armada.toml",
        project_file_name = "armada.toml"
    )
)]
pub struct RemoteConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub ssh_user: String,
    /// TCP port of the remote SSH daemon.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; defaults to disabling since
    /// cluster nodes are freshly launched.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Seconds `ssh` waits for a TCP connection before giving up.
    #[ortho_config(default = 10)]
    pub ssh_connect_timeout_secs: u64,
    /// Attempts made when the connection itself fails.
    #[ortho_config(default = 3)]
    pub connect_attempts: u32,
    /// Base delay between connection attempts, doubled after each failure.
    #[ortho_config(default = 1000)]
    pub connect_backoff_ms: u64,
}

impl RemoteConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when any required field is
    /// empty or zero.
    pub fn validate(&self) -> Result<(), RemoteError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.ssh_keygen_bin, "ssh_keygen_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        if self.ssh_port == 0 {
            return Err(RemoteError::InvalidConfig {
                field: String::from("ssh_port"),
            });
        }
        if self.connect_attempts == 0 {
            return Err(RemoteError::InvalidConfig {
                field: String::from("connect_attempts"),
            });
        }
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] naming the loader failure when
    /// merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, RemoteError> {
        Self::load_from_iter([std::ffi::OsString::from("armada")]).map_err(|err| {
            RemoteError::ConfigLoad {
                message: err.to_string(),
            }
        })
    }

    fn require_value(value: &str, field: &str) -> Result<(), RemoteError> {
        if value.trim().is_empty() {
            return Err(RemoteError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            ssh_keygen_bin: String::from("ssh-keygen"),
            ssh_user: String::from("ubuntu"),
            ssh_port: 22,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            ssh_connect_timeout_secs: 10,
            connect_attempts: 3,
            connect_backoff_ms: 1000,
        }
    }
}
