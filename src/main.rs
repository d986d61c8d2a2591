//! Binary entry point for the armada CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use armada::files::expand_tilde;
use armada::{
    ClusterConfig, ClusterError, ClusterGroup, ClusterOrchestrator, CommandRunner, ComputeAdapter,
    ComputeApi, ConfigureOutcome, KeyMaterial, ProcessCommandRunner, ProvisionRequest,
    RemoteConfig, ScalewayCompute, ScalewayConfig,
};

mod cli;

use cli::{Cli, DescribeCommand, ProvisionCommand, ZonesCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    #[error("private key error: {0}")]
    KeyFile(String),
    #[error("failed to write output: {0}")]
    Output(String),
    #[error("cluster incomplete: {0}")]
    NodesFailed(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let exit_code = match dispatch(&cli, &cancel).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling in-flight waits");
            cancel.cancel();
        }
    });
}

async fn dispatch(cli: &Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    match cli {
        Cli::Provision(args) => provision(args, cancel).await,
        Cli::Describe(args) => describe(args).await,
        Cli::Instances => instances().await,
        Cli::Zones(args) => zones(args).await,
    }
}

struct LoadedConfig {
    scaleway: ScalewayConfig,
    cluster: ClusterConfig,
    remote: RemoteConfig,
}

fn load_config() -> Result<LoadedConfig, CliError> {
    let scaleway =
        ScalewayConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let cluster =
        ClusterConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let remote =
        RemoteConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    scaleway
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    remote
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    Ok(LoadedConfig {
        scaleway,
        cluster,
        remote,
    })
}

fn compute(loaded: &LoadedConfig) -> Result<ComputeAdapter<ScalewayCompute>, CliError> {
    ScalewayCompute::new(loaded.scaleway.clone(), &loaded.remote.ssh_keygen_bin)
        .map(ComputeAdapter::new)
        .map_err(|err| CliError::Provider(err.to_string()))
}

fn orchestrator(
    loaded: LoadedConfig,
) -> Result<ClusterOrchestrator<ScalewayCompute, ProcessCommandRunner>, CliError> {
    let adapter = compute(&loaded)?;
    Ok(ClusterOrchestrator::new(
        adapter,
        loaded.cluster,
        loaded.remote,
        ProcessCommandRunner,
    ))
}

async fn provision(args: &ProvisionCommand, cancel: &CancellationToken) -> Result<(), CliError> {
    let mut loaded = load_config()?;
    if let Some(workers) = args.workers {
        loaded.cluster.worker_count = workers;
    }
    loaded
        .cluster
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let mut request = ProvisionRequest::from_config(&loaded.cluster, &loaded.scaleway);
    apply_overrides(&mut request, args);
    let orchestrator = orchestrator(loaded)?;

    let report = orchestrator.provision(&request, cancel).await?;
    let mut group = report.group;
    info!(group_id = group.group_id(), "cluster launched");
    for failure in &report.failures {
        warn!(node = %failure.node, error = %failure.error, "worker launch failed");
    }

    let configured = bring_up(&orchestrator, &mut group, cancel).await;
    let descriptor = group.describe_cluster();
    write_json(&descriptor)?;
    let outcome = configured?;
    info!(summary = %outcome.summary(), "provisioning finished");

    if descriptor.has_failures() || !outcome.skipped.is_empty() {
        return Err(CliError::NodesFailed(outcome.summary()));
    }
    Ok(())
}

async fn bring_up<A: ComputeApi, R: CommandRunner + Clone>(
    orchestrator: &ClusterOrchestrator<A, R>,
    group: &mut ClusterGroup,
    cancel: &CancellationToken,
) -> Result<ConfigureOutcome, CliError> {
    let readiness = orchestrator.await_ready(group, cancel).await?;
    for failure in &readiness.failures {
        warn!(node = %failure.node, error = %failure.error, "node did not become ready");
    }
    Ok(orchestrator.configure_cluster(group, cancel).await?)
}

async fn describe(args: &DescribeCommand) -> Result<(), CliError> {
    let orchestrator = orchestrator(load_config()?)?;
    let mut group = orchestrator.rediscover(&args.group_id).await?;
    if let Some(path) = args.private_key.as_deref() {
        let expanded = Utf8PathBuf::from(expand_tilde(path));
        let material = KeyMaterial::load(&expanded)
            .map_err(|err| CliError::KeyFile(err.to_string()))?
            .ok_or_else(|| CliError::KeyFile(format!("{expanded} does not exist")))?;
        group.attach_private_key(material);
    }
    write_json(&group.describe_cluster())
}

async fn instances() -> Result<(), CliError> {
    let inventory = compute(&load_config()?)?
        .inventory()
        .await
        .map_err(|err| CliError::Provider(err.to_string()))?;
    info!(zone = %inventory.zone, total = inventory.total, "active instances");
    write_json(&inventory)
}

async fn zones(args: &ZonesCommand) -> Result<(), CliError> {
    let loaded = load_config()?;
    let instance_type = args
        .instance_type
        .clone()
        .unwrap_or_else(|| loaded.scaleway.default_instance_type.clone());
    let zones = compute(&loaded)?
        .list_zones(&instance_type)
        .await
        .map_err(|err| CliError::Provider(err.to_string()))?;
    write_json(&zones)
}

fn apply_overrides(request: &mut ProvisionRequest, args: &ProvisionCommand) {
    if let Some(image) = &args.image {
        request.image.clone_from(image);
    }
    if let Some(instance_type) = &args.instance_type {
        request.instance_type.clone_from(instance_type);
    }
    if let Some(workers) = args.workers {
        request.worker_count = workers;
    }
    if let Some(path) = &args.save_key {
        request.save_key_path = Some(Utf8PathBuf::from(expand_tilde(path)));
    }
}

fn write_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(io::stdout(), "{json}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada::test_support::{FakeCompute, ScriptedRunner};

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            image: String::from("Ubuntu 24.04 Noble Numbat"),
            instance_type: String::from("DEV1-S"),
            worker_count: 1,
            security_group_name: None,
            key_pair_name: None,
            private_key_path: None,
            group_id: Some(String::from("1700000000")),
            save_key_path: None,
        }
    }

    fn template(name: &str) -> String {
        format!("{}/templates/{name}", env!("CARGO_MANIFEST_DIR"))
    }

    fn cluster_config() -> ClusterConfig {
        ClusterConfig {
            worker_count: 1,
            security_group_name: None,
            key_pair_name: None,
            private_key_path: None,
            coordinator_script: template("coordinator.sh"),
            worker_script: template("worker.sh.template"),
            datastore_template: template("datastore.yml.template"),
            boot_marker: String::from("/home/ubuntu/user_data_done"),
            manifest_remote_path: String::from("ip_addresses"),
            datastore_remote_path: String::from("/mnt/armada/datastore.yml"),
            uploaded_file_mode: String::from("664"),
            network_timeout_secs: 5,
            boot_timeout_secs: 5,
            poll_interval_secs: 1,
        }
    }

    #[test]
    fn apply_overrides_replaces_only_given_values() {
        let mut req = request();
        let args = ProvisionCommand {
            workers: Some(4),
            instance_type: None,
            image: Some(String::from("debian")),
            save_key: Some(String::from("/tmp/armada.pem")),
        };

        apply_overrides(&mut req, &args);

        assert_eq!(req.image, "debian");
        assert_eq!(req.instance_type, "DEV1-S");
        assert_eq!(req.worker_count, 4);
        assert_eq!(
            req.save_key_path.as_deref().map(camino::Utf8Path::as_str),
            Some("/tmp/armada.pem")
        );
    }

    #[tokio::test]
    async fn interrupted_bring_up_skips_configuration() {
        let runner = ScriptedRunner::succeeding();
        runner.respond_matching("user_data_done", Some(0), "true\n");
        let orchestrator = ClusterOrchestrator::new(
            ComputeAdapter::new(FakeCompute::new()),
            cluster_config(),
            RemoteConfig {
                connect_attempts: 1,
                connect_backoff_ms: 0,
                ..RemoteConfig::default()
            },
            runner.clone(),
        );
        let mut group = orchestrator
            .provision(&request(), &CancellationToken::new())
            .await
            .expect("provision")
            .group;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = bring_up(&orchestrator, &mut group, &cancel)
            .await
            .expect_err("interrupted");

        assert!(matches!(
            err,
            CliError::Cluster(ClusterError::Cancelled { .. })
        ));
        assert!(runner.invocations_matching("setup-ssh").is_empty());
        assert!(runner.invocations_matching("scp").is_empty());
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::NodesFailed(String::from("1 of 2 workers configured, 1 failed"));

        write_error(&mut buf, &err);

        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.contains("1 of 2 workers configured"),
            "rendered: {rendered}"
        );
    }
}
