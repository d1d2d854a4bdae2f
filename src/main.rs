//! Binary entry point for the `pbmachine` CLI.

mod cli;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pbmachine::registry::{
    FLAG_CORES, FLAG_PASSWORD, FLAG_RAM_GB, FLAG_STORAGE_SIZE_GB, FLAG_USER, FLAG_VDC_NAME,
};
use pbmachine::{
    CommandOutput, ConfigError, DriverError, MachineSettings, MachineStore, MachineStoreError,
    ProfitBricksConfig, registry_entry,
};

use cli::{Cli, Command, CreateCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Store(#[from] MachineStoreError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
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

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let Cli {
        machine_name,
        store_path,
        command,
    } = cli;
    if matches!(command, Command::Flags) {
        return print_flags();
    }

    let store_root = store_path.map_or_else(
        || Utf8PathBuf::from(".pbmachine").join(&machine_name),
        Utf8PathBuf::from,
    );
    let store = MachineStore::new(store_root.clone());
    let config = ProfitBricksConfig::load_without_cli_args()?;
    let entry = registry_entry();
    let mut driver = (entry.factory)(MachineSettings::new(machine_name, store_root), config);

    if let Command::Create(args) = command {
        driver.set_config_from_flags(&create_options(args))?;
        driver.pre_create_check()?;
        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());
        let record = driver.create(&cancel).await?;
        let path = store.save(record)?;
        info!(%path, "machine record saved");
        return print_line(driver.get_url()?);
    }

    match store.load() {
        Ok(record) => driver.restore(record),
        Err(MachineStoreError::Missing { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    match command {
        Command::State => print_line(driver.get_state().await?),
        Command::Ip => print_line(driver.get_ip()?),
        Command::Url => print_line(driver.get_url()?),
        Command::SshCommand { command: remote } => {
            print_line(driver.get_ssh_command(&remote.join(" "))?.render())
        }
        Command::StartDocker => print_output(&driver.start_docker().await?),
        Command::StopDocker => print_output(&driver.stop_docker().await?),
        Command::Upgrade => print_output(&driver.upgrade().await?),
        Command::Create(_) | Command::Flags => Ok(()),
    }
}

fn create_options(args: CreateCommand) -> BTreeMap<String, String> {
    [
        (FLAG_USER, args.user),
        (FLAG_PASSWORD, args.password),
        (FLAG_VDC_NAME, args.vdc_name),
        (FLAG_STORAGE_SIZE_GB, args.storage_size_gb),
        (FLAG_CORES, args.cores),
        (FLAG_RAM_GB, args.ram_gb),
    ]
    .into_iter()
    .filter_map(|(flag, value)| value.map(|present| (flag.to_owned(), present)))
    .collect()
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping at the next stage boundary");
            cancel.cancel();
        }
    });
}

fn print_flags() -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    for flag in (registry_entry().create_flags)() {
        let default = flag
            .default
            .map(|value| format!(" (default: {value})"))
            .unwrap_or_default();
        writeln!(
            stdout,
            "--{}\t{}\t{}{default}",
            flag.name, flag.env_var, flag.usage
        )?;
    }
    Ok(())
}

fn print_line(value: impl Display) -> Result<(), CliError> {
    writeln!(io::stdout(), "{value}")?;
    Ok(())
}

fn print_output(output: &CommandOutput) -> Result<(), CliError> {
    let stdout = output.stdout.trim_end();
    if !stdout.is_empty() {
        writeln!(io::stdout(), "{stdout}")?;
    }
    Ok(())
}

fn report_error(err: &CliError) {
    writeln!(io::stderr(), "error: {err}").ok();
}
