//! Command-line interface definitions for the `pbmachine` binary.
//!
//! Only clap types live here so the build script can include this module
//! when it renders the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `pbmachine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "pbmachine",
    about = "Provision Docker hosts on ProfitBricks and manage them over SSH",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Name of the machine to operate on.
    #[arg(long, global = true, default_value = "default", value_name = "NAME")]
    pub(crate) machine_name: String,
    /// Directory holding the machine's key pair and record.
    ///
    /// Defaults to `.pbmachine/<machine-name>` under the current directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) store_path: Option<String>,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `pbmachine`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Provision a new machine and install the container runtime.
    Create(CreateCommand),
    /// Print the machine state reported by the API.
    State,
    /// Print the machine's public address.
    Ip,
    /// Print the Docker daemon URL.
    Url,
    /// Print the ssh invocation for the machine.
    SshCommand {
        /// Remote command; omit for an interactive shell.
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Start the Docker service on the machine.
    StartDocker,
    /// Stop the Docker service on the machine.
    StopDocker,
    /// Upgrade the Docker package on the machine.
    Upgrade,
    /// List the driver's creation flags.
    Flags,
}

/// Overrides accepted by `pbmachine create`.
///
/// Each value falls back to configuration files and `PB_*` environment
/// variables when omitted.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// ProfitBricks user name.
    #[arg(long = "pb-user", value_name = "USER")]
    pub(crate) user: Option<String>,
    /// ProfitBricks password.
    #[arg(long = "pb-password", value_name = "PASSWORD")]
    pub(crate) password: Option<String>,
    /// Name of the virtual data center to provision into.
    #[arg(long = "pb-vdc-name", value_name = "NAME")]
    pub(crate) vdc_name: Option<String>,
    /// Boot volume size in gigabytes.
    #[arg(long = "pb-storage-size-gb", value_name = "GB")]
    pub(crate) storage_size_gb: Option<String>,
    /// Number of cores.
    #[arg(long = "pb-cores", value_name = "COUNT")]
    pub(crate) cores: Option<String>,
    /// Memory in gigabytes.
    #[arg(long = "pb-ram-gb", value_name = "GB")]
    pub(crate) ram_gb: Option<String>,
}
