//! Machine driver exposing the host lifecycle surface.
//!
//! [`PbDriver`] holds one machine's configuration and persisted identifiers.
//! `create` runs the provisioner; the remaining operations work from the
//! stored record.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{ApiError, ApiGateway, Client, HttpGateway, VirtualMachineState};
use crate::bootstrap::{BootstrapSettings, RuntimeBootstrapper};
use crate::config::{ConfigError, ProfitBricksConfig};
use crate::machine_store::{MachineRecord, MachineStoreError};
use crate::process::{CommandOutput, CommandRunner, ProcessCommandRunner, ProcessError};
use crate::provision::{ImageDefaults, PollPolicy, ProvisionError, Provisioner};
use crate::registry::{
    DriverOptions, FLAG_CORES, FLAG_PASSWORD, FLAG_RAM_GB, FLAG_STORAGE_SIZE_GB, FLAG_USER,
    FLAG_VDC_NAME,
};
use crate::ssh::{SshClient, SshCommand, SshSettings};

/// Name under which the driver registers.
pub const DRIVER_NAME: &str = "pb";
/// Port of the remote Docker daemon.
pub const DOCKER_PORT: u16 = 2376;
/// Docker configuration directory on the host.
pub const DOCKER_CONFIG_DIR: &str = "/etc/docker";
/// Starts the Docker service.
pub const START_DOCKER_COMMAND: &str = "sudo service docker start";
/// Stops the Docker service.
pub const STOP_DOCKER_COMMAND: &str = "sudo service docker stop";
/// Upgrades the Docker package.
pub const UPGRADE_COMMAND: &str =
    "sudo apt-get update && sudo apt-get install -y --upgrade lxc-docker";

/// Machine state as understood by the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    /// Unknown or not yet created.
    None,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Shutting down.
    Stopping,
    /// Powered off.
    Stopped,
    /// Booting.
    Starting,
    /// Crashed or failed.
    Error,
}

impl From<&VirtualMachineState> for MachineState {
    fn from(state: &VirtualMachineState) -> Self {
        match state {
            VirtualMachineState::NoState | VirtualMachineState::Other(_) => Self::None,
            VirtualMachineState::Provisioning => Self::Starting,
            VirtualMachineState::Running => Self::Running,
            VirtualMachineState::Paused => Self::Paused,
            VirtualMachineState::Shutdown => Self::Stopping,
            VirtualMachineState::Shutoff => Self::Stopped,
            VirtualMachineState::Crashed | VirtualMachineState::Failed => Self::Error,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "None",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Per-machine settings supplied by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineSettings {
    /// Machine name.
    pub machine_name: String,
    /// Directory holding the key pair and machine record.
    pub store_path: Utf8PathBuf,
}

impl MachineSettings {
    /// Creates settings.
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
        }
    }
}

/// Errors surfaced by [`PbDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// Configuration is incomplete or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Provisioning failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    /// A status query failed.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The machine record could not be read or written.
    #[error(transparent)]
    Store(#[from] MachineStoreError),
    /// The machine has no recorded address.
    #[error("IP address is not set")]
    MissingIp,
    /// A remote command failed.
    #[error("remote command `{command}` failed: {source}")]
    RemoteCommand {
        /// Command that was run.
        command: String,
        /// Underlying failure.
        #[source]
        source: ProcessError,
    },
    /// A flag value could not be interpreted.
    #[error("invalid value for --{flag}: {message}")]
    InvalidFlag {
        /// Flag name.
        flag: &'static str,
        /// Description of the problem.
        message: String,
    },
}

/// ProfitBricks machine driver.
#[derive(Clone, Debug)]
pub struct PbDriver<G, R> {
    settings: MachineSettings,
    config: ProfitBricksConfig,
    gateway: G,
    runner: R,
    record: MachineRecord,
}

impl PbDriver<HttpGateway, ProcessCommandRunner> {
    /// Builds a driver talking to the configured endpoint and spawning real
    /// processes.
    #[must_use]
    pub fn from_config(settings: MachineSettings, config: ProfitBricksConfig) -> Self {
        let gateway = HttpGateway::new(config.endpoint.clone(), config.http_timeout());
        let runner = ProcessCommandRunner::new().with_timeout(config.command_timeout());
        Self::new(settings, config, gateway, runner)
    }
}

impl<G, R> PbDriver<G, R>
where
    G: ApiGateway + Clone,
    R: CommandRunner + Clone,
{
    /// Creates a driver from explicit collaborators.
    #[must_use]
    pub fn new(settings: MachineSettings, config: ProfitBricksConfig, gateway: G, runner: R) -> Self {
        let record = MachineRecord::new(settings.machine_name.clone());
        Self {
            settings,
            config,
            gateway,
            runner,
            record,
        }
    }

    /// Returns the driver name.
    #[must_use]
    pub const fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    /// Returns the machine settings.
    #[must_use]
    pub const fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    /// Returns the effective configuration.
    #[must_use]
    pub const fn config(&self) -> &ProfitBricksConfig {
        &self.config
    }

    /// Returns the machine record.
    #[must_use]
    pub const fn record(&self) -> &MachineRecord {
        &self.record
    }

    /// Replaces the machine record with one loaded from the store.
    pub fn restore(&mut self, record: MachineRecord) {
        self.record = record;
    }

    /// Applies host-supplied flag values over the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidFlag`] when a numeric flag does not
    /// parse.
    pub fn set_config_from_flags(&mut self, options: &impl DriverOptions) -> Result<(), DriverError> {
        if let Some(value) = options.string(FLAG_USER) {
            self.config.user = value;
        }
        if let Some(value) = options.string(FLAG_PASSWORD) {
            self.config.password = value;
        }
        if let Some(value) = options.string(FLAG_VDC_NAME) {
            self.config.vdc_name = value;
        }
        if let Some(value) = options.string(FLAG_STORAGE_SIZE_GB) {
            self.config.storage_size_gb = parse_flag(FLAG_STORAGE_SIZE_GB, &value)?;
        }
        if let Some(value) = options.string(FLAG_CORES) {
            self.config.cores = parse_flag(FLAG_CORES, &value)?;
        }
        if let Some(value) = options.string(FLAG_RAM_GB) {
            self.config.ram_gb = value;
        }
        Ok(())
    }

    /// Checks that `create` has everything it needs, without remote calls.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] or [`DriverError::Provision`] naming
    /// the first problem found.
    pub fn pre_create_check(&self) -> Result<(), DriverError> {
        self.config.validate()?;
        self.config.provision_request(&self.settings.machine_name)?;
        Ok(())
    }

    /// Provisions the machine and records its identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when validation or provisioning fails.
    pub async fn create(&mut self, cancel: &CancellationToken) -> Result<&MachineRecord, DriverError> {
        self.config.validate()?;
        let request = self.config.provision_request(&self.settings.machine_name)?;
        let provisioned = self.provisioner().provision(&request, cancel).await?;
        self.record.apply(&provisioned);
        info!(
            machine = %self.settings.machine_name,
            address = %provisioned.address,
            "machine created"
        );
        Ok(&self.record)
    }

    /// Reports the machine state, querying the API when a server is known.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Api`] when the status query fails.
    pub async fn get_state(&self) -> Result<MachineState, DriverError> {
        let Some(server_id) = self.record.server_id.as_ref() else {
            return Ok(MachineState::None);
        };
        let credentials = self.config.credentials();
        let status = Client::new(&self.gateway, &credentials)
            .get_server(server_id)
            .await?;
        Ok(MachineState::from(&status.state))
    }

    /// Accepted for host compatibility; the server is left as it is.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn start(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Accepted for host compatibility; the server is left as it is.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn stop(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Accepted for host compatibility; the server is left as it is.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn restart(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Accepted for host compatibility; the server is left as it is.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn kill(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Accepted for host compatibility; remote resources are not deleted.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn remove(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Returns the recorded public address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingIp`] before a successful `create`.
    pub fn get_ip(&self) -> Result<IpAddr, DriverError> {
        self.record.ip_address.ok_or(DriverError::MissingIp)
    }

    /// Returns the Docker endpoint, `tcp://<ip>:2376`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingIp`] before a successful `create`.
    pub fn get_url(&self) -> Result<String, DriverError> {
        let address = SocketAddr::new(self.get_ip()?, DOCKER_PORT);
        Ok(format!("tcp://{address}"))
    }

    /// Builds the `ssh` invocation for `remote_command` (empty for a shell).
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingIp`] before a successful `create`.
    pub fn get_ssh_command(&self, remote_command: &str) -> Result<SshCommand, DriverError> {
        Ok(self.ssh().command(self.get_ip()?, remote_command))
    }

    /// Starts the Docker service on the host.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::RemoteCommand`] when the command fails.
    pub async fn start_docker(&self) -> Result<CommandOutput, DriverError> {
        self.run_remote(START_DOCKER_COMMAND).await
    }

    /// Stops the Docker service on the host.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::RemoteCommand`] when the command fails.
    pub async fn stop_docker(&self) -> Result<CommandOutput, DriverError> {
        self.run_remote(STOP_DOCKER_COMMAND).await
    }

    /// Upgrades the Docker package on the host.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::RemoteCommand`] when the command fails.
    pub async fn upgrade(&self) -> Result<CommandOutput, DriverError> {
        self.run_remote(UPGRADE_COMMAND).await
    }

    /// Returns the Docker configuration directory on the host.
    #[must_use]
    pub const fn docker_config_dir(&self) -> &'static str {
        DOCKER_CONFIG_DIR
    }

    async fn run_remote(&self, command: &str) -> Result<CommandOutput, DriverError> {
        let address = self.get_ip()?;
        self.ssh()
            .run(address, command)
            .await
            .map_err(|source| DriverError::RemoteCommand {
                command: command.to_owned(),
                source,
            })
    }

    fn ssh(&self) -> SshClient<R> {
        SshClient::new(
            SshSettings::from_config(&self.config, &self.settings.store_path),
            self.runner.clone(),
        )
    }

    fn provisioner(&self) -> Provisioner<G, R> {
        let bootstrapper =
            RuntimeBootstrapper::new(BootstrapSettings::from_config(&self.config), self.runner.clone());
        Provisioner::new(
            self.gateway.clone(),
            self.ssh(),
            bootstrapper,
            ImageDefaults::from_config(&self.config),
        )
        .with_poll_policy(PollPolicy::from_config(&self.config))
        .with_rollback(self.config.rollback_on_failure)
    }
}

fn parse_flag(flag: &'static str, value: &str) -> Result<u32, DriverError> {
    value
        .trim()
        .parse()
        .map_err(|_| DriverError::InvalidFlag {
            flag,
            message: format!("expected a whole number, got '{value}'"),
        })
}
