//! Command-line interface definitions for the `armada` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `armada` binary.
#[derive(Debug, Parser)]
#[command(
    name = "armada",
    about = "Provision a coordinator and worker pool on Scaleway and wire them together",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Launch a cluster, wait for it to boot, and configure it.
    #[command(
        name = "provision",
        about = "Launch a cluster, wait for it to boot, and configure it"
    )]
    Provision(ProvisionCommand),
    /// Describe the running cluster of a previous provisioning run.
    #[command(
        name = "describe",
        about = "Describe the running cluster of a previous provisioning run"
    )]
    Describe(DescribeCommand),
    /// List every active instance of the project in the configured zone.
    #[command(
        name = "instances",
        about = "List every active instance of the project in the configured zone"
    )]
    Instances,
    /// Report which zones can launch the instance type.
    #[command(name = "zones", about = "Report which zones can launch the instance type")]
    Zones(ZonesCommand),
}

/// Arguments for the `armada provision` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ProvisionCommand {
    /// Number of workers to launch alongside the coordinator.
    #[arg(long, value_name = "N")]
    pub(crate) workers: Option<u32>,
    /// Override the Scaleway instance type (commercial type) for every node.
    ///
    /// Unknown or unavailable types are rejected by the provider when the
    /// coordinator launches.
    #[arg(long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
    /// Override the image label or identifier for every node.
    ///
    /// Labels resolve to the newest available image for the configured
    /// architecture and zone.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: Option<String>,
    /// Write a newly created private key to this path with mode 0600.
    #[arg(long, value_name = "PATH")]
    pub(crate) save_key: Option<String>,
}

/// Arguments for the `armada describe` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DescribeCommand {
    /// Group identifier printed by `armada provision`.
    #[arg(value_name = "GROUP_ID")]
    pub(crate) group_id: String,
    /// Private key to attach to the rediscovered cluster.
    #[arg(long, value_name = "PATH")]
    pub(crate) private_key: Option<String>,
}

/// Arguments for the `armada zones` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ZonesCommand {
    /// Instance type to check; defaults to the configured one.
    #[arg(long, value_name = "TYPE")]
    pub(crate) instance_type: Option<String>,
}
