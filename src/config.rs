//! Configuration loading via `ortho-config`.
//!
//! Two layered structures feed the orchestrator: [`ScalewayConfig`] carries
//! provider credentials and launch defaults, and [`ClusterConfig`] carries
//! cluster shape, template locations, remote paths, and wait budgets.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::wait::WaitPolicy;

/// Scaleway specific configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "armada",
        env_var = "ARMADA_CONFIG_PATH",
        config_file_name = "armada.toml",
        dotfile_name = ".armada.toml",
        project_file_name = "armada.toml"
    )
)]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Not needed for API
    /// calls; kept so operators can correlate audit logs.
    pub access_key: Option<String>,
    /// Secret key used for authentication. This value is required.
    pub secret_key: String,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier that owns every cluster resource.
    pub default_project_id: String,
    /// Availability zone for instances and security groups.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Commercial type used when the caller does not pick one.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub default_instance_type: String,
    /// Image label or UUID used when the caller does not pick one.
    #[ortho_config(default = "Ubuntu 24.04 Noble Numbat".to_owned())]
    pub default_image: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Cluster shape, template locations, and wait budgets.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ARMADA_CLUSTER",
    discovery(
        app_name = "armada",
        env_var = "ARMADA_CONFIG_PATH",
        config_file_name = "armada.toml",
        dotfile_name = ".armada.toml",
        project_file_name = "armada.toml"
    )
)]
pub struct ClusterConfig {
    /// Number of worker nodes launched alongside the coordinator.
    #[ortho_config(default = 1)]
    pub worker_count: u32,
    /// Security group to reuse or create. Defaults to the shared cluster
    /// group when unset.
    pub security_group_name: Option<String>,
    /// Key pair to reuse or create. Defaults to a per-group name when unset.
    pub key_pair_name: Option<String>,
    /// Local private key for an existing key pair.
    pub private_key_path: Option<String>,
    /// First-boot script for the coordinator.
    #[ortho_config(default = "templates/coordinator.sh".to_owned())]
    pub coordinator_script: String,
    /// First-boot script template for workers.
    #[ortho_config(default = "templates/worker.sh.template".to_owned())]
    pub worker_script: String,
    /// Data-store connection template distributed to every node.
    #[ortho_config(default = "templates/datastore.yml.template".to_owned())]
    pub datastore_template: String,
    /// File whose presence marks the end of first boot.
    #[ortho_config(default = "/home/ubuntu/user_data_done".to_owned())]
    pub boot_marker: String,
    /// Remote path of the node manifest on the coordinator.
    #[ortho_config(default = "ip_addresses".to_owned())]
    pub manifest_remote_path: String,
    /// Remote path of the data-store connection file on every node.
    #[ortho_config(default = "/mnt/armada/datastore.yml".to_owned())]
    pub datastore_remote_path: String,
    /// Octal mode applied to uploaded files once configuration completes.
    #[ortho_config(default = "664".to_owned())]
    pub uploaded_file_mode: String,
    /// Seconds allowed for an instance to report networking.
    #[ortho_config(default = 600)]
    pub network_timeout_secs: u64,
    /// Seconds allowed for a node's first-boot script to finish.
    #[ortho_config(default = 1800)]
    pub boot_timeout_secs: u64,
    /// Seconds between readiness checks.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in armada.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("armada")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.secret_key,
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_project_id,
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new(
                "availability zone",
                "SCW_DEFAULT_ZONE",
                "default_zone",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_instance_type,
            &FieldMetadata::new(
                "instance type",
                "SCW_DEFAULT_INSTANCE_TYPE",
                "default_instance_type",
                "scaleway",
            ),
        )?;
        require_field(
            &self.default_image,
            &FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image", "scaleway"),
        )?;
        require_field(
            &self.default_architecture,
            &FieldMetadata::new(
                "CPU architecture",
                "SCW_DEFAULT_ARCHITECTURE",
                "default_architecture",
                "scaleway",
            ),
        )?;
        Ok(())
    }
}

impl ClusterConfig {
    /// Loads cluster configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("armada")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates paths, the file mode, and wait budgets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is empty
    /// and [`ConfigError::Invalid`] when a value is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in [
            (
                &self.coordinator_script,
                FieldMetadata::new(
                    "coordinator boot script",
                    "ARMADA_CLUSTER_COORDINATOR_SCRIPT",
                    "coordinator_script",
                    "cluster",
                ),
            ),
            (
                &self.worker_script,
                FieldMetadata::new(
                    "worker boot script template",
                    "ARMADA_CLUSTER_WORKER_SCRIPT",
                    "worker_script",
                    "cluster",
                ),
            ),
            (
                &self.datastore_template,
                FieldMetadata::new(
                    "data-store template",
                    "ARMADA_CLUSTER_DATASTORE_TEMPLATE",
                    "datastore_template",
                    "cluster",
                ),
            ),
            (
                &self.boot_marker,
                FieldMetadata::new(
                    "boot marker path",
                    "ARMADA_CLUSTER_BOOT_MARKER",
                    "boot_marker",
                    "cluster",
                ),
            ),
            (
                &self.manifest_remote_path,
                FieldMetadata::new(
                    "manifest remote path",
                    "ARMADA_CLUSTER_MANIFEST_REMOTE_PATH",
                    "manifest_remote_path",
                    "cluster",
                ),
            ),
            (
                &self.datastore_remote_path,
                FieldMetadata::new(
                    "data-store remote path",
                    "ARMADA_CLUSTER_DATASTORE_REMOTE_PATH",
                    "datastore_remote_path",
                    "cluster",
                ),
            ),
        ] {
            require_field(value, &metadata)?;
        }

        if !is_octal_mode(&self.uploaded_file_mode) {
            return Err(ConfigError::Invalid {
                field: String::from("uploaded_file_mode"),
                reason: format!("'{}' is not an octal file mode", self.uploaded_file_mode),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: String::from("poll_interval_secs"),
                reason: String::from("must be at least one second"),
            });
        }
        Ok(())
    }

    /// Budget for an instance to report networking after launch.
    #[must_use]
    pub const fn network_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.network_timeout_secs),
        )
    }

    /// Budget for a node's first-boot script to finish.
    #[must_use]
    pub const fn boot_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.boot_timeout_secs),
        )
    }
}

fn is_octal_mode(value: &str) -> bool {
    let trimmed = value.trim();
    (3..=4).contains(&trimmed.len()) && trimmed.chars().all(|ch| ('0'..='7').contains(&ch))
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
