//! Configuration loading and validation through the public API.

use armada::config::ConfigError;
use armada::test_support::EnvGuard;
use armada::{ClusterConfig, RemoteConfig, ScalewayConfig};
use rstest::{fixture, rstest};

#[fixture]
fn valid_scaleway() -> ScalewayConfig {
    ScalewayConfig {
        access_key: Some(String::from("SCWACCESSKEYEXAMPLE")),
        secret_key: String::from("SCWSECRETKEYEXAMPLE"),
        default_organization_id: None,
        default_project_id: String::from("11111111-2222-3333-4444-555555555555"),
        default_zone: String::from("fr-par-1"),
        default_instance_type: String::from("DEV1-S"),
        default_image: String::from("Ubuntu 24.04 Noble Numbat"),
        default_architecture: String::from("x86_64"),
    }
}

/// Every required provider field names its environment variable and its
/// `armada.toml` key when missing.
#[rstest]
#[case("SCW_SECRET_KEY", "secret_key")]
#[case("SCW_DEFAULT_PROJECT_ID", "default_project_id")]
#[case("SCW_DEFAULT_ZONE", "default_zone")]
#[case("SCW_DEFAULT_INSTANCE_TYPE", "default_instance_type")]
#[case("SCW_DEFAULT_IMAGE", "default_image")]
#[case("SCW_DEFAULT_ARCHITECTURE", "default_architecture")]
fn scaleway_validation_errors_are_actionable(
    valid_scaleway: ScalewayConfig,
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_scaleway;
    match toml_key {
        "secret_key" => cfg.secret_key.clear(),
        "default_project_id" => cfg.default_project_id.clear(),
        "default_zone" => cfg.default_zone.clear(),
        "default_instance_type" => cfg.default_instance_type.clear(),
        "default_image" => cfg.default_image.clear(),
        _ => cfg.default_architecture.clear(),
    }

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(message.contains(env_var), "should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "should mention {toml_key}: {message}");
    assert!(
        message.contains("armada.toml"),
        "should mention config file: {message}"
    );
}

#[tokio::test]
async fn cluster_config_reads_environment_overrides() {
    let _guard = EnvGuard::set_vars(&[
        ("ARMADA_CLUSTER_WORKER_COUNT", "3"),
        ("ARMADA_CLUSTER_BOOT_TIMEOUT_SECS", "90"),
    ])
    .await;

    let cfg = ClusterConfig::load_without_cli_args().expect("cluster config should load");

    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.boot_timeout_secs, 90);
    assert_eq!(cfg.manifest_remote_path, "ip_addresses");
    assert_eq!(cfg.uploaded_file_mode, "664");
    assert_eq!(cfg.validate(), Ok(()));
}

#[tokio::test]
async fn remote_config_defaults_to_ubuntu_over_port_22() {
    let _guard = EnvGuard::set_vars(&[("ARMADA_REMOTE_CONNECT_ATTEMPTS", "5")]).await;

    let cfg = RemoteConfig::load_without_cli_args().expect("remote config should load");

    assert_eq!(cfg.ssh_user, "ubuntu");
    assert_eq!(cfg.ssh_port, 22);
    assert_eq!(cfg.connect_attempts, 5);
    assert!(cfg.validate().is_ok());
}
