//! Runtime bootstrap through a local helper container.
//!
//! The helper connects to the fresh host and installs the container runtime.
//! It receives the host address and root credential through environment
//! variables.

use std::ffi::OsString;
use std::net::IpAddr;

use tracing::{debug, info};

use crate::config::ProfitBricksConfig;
use crate::process::{CommandOutput, CommandRunner, ProcessError};

/// Settings for the bootstrap container.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    /// Local container CLI.
    pub docker_bin: String,
    /// Helper image.
    pub image: String,
    /// Root password of the remote host.
    pub credential: String,
}

impl BootstrapSettings {
    /// Derives settings from configuration.
    #[must_use]
    pub fn from_config(config: &ProfitBricksConfig) -> Self {
        Self {
            docker_bin: config.docker_bin.clone(),
            image: config.bootstrap_image.clone(),
            credential: config.bootstrap_credential.clone(),
        }
    }
}

impl std::fmt::Debug for BootstrapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapSettings")
            .field("docker_bin", &self.docker_bin)
            .field("image", &self.image)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Installs the container runtime on a provisioned host.
#[derive(Clone, Debug)]
pub struct RuntimeBootstrapper<R> {
    settings: BootstrapSettings,
    runner: R,
}

impl<R: CommandRunner> RuntimeBootstrapper<R> {
    /// Creates a bootstrapper.
    #[must_use]
    pub const fn new(settings: BootstrapSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Arguments passed to the container CLI for `address`.
    #[must_use]
    pub fn args(&self, address: IpAddr) -> Vec<OsString> {
        vec![
            OsString::from("run"),
            OsString::from("--rm"),
            OsString::from("-e"),
            OsString::from(format!("HOST_IP={address}")),
            OsString::from("-e"),
            OsString::from(format!("HOST_PASSWORD={}", self.settings.credential)),
            OsString::from(&self.settings.image),
        ]
    }

    /// Runs the helper container against `address` and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::CommandFailure`] on a non-zero exit, and spawn
    /// or timeout errors from the runner.
    pub async fn bootstrap(&self, address: IpAddr) -> Result<CommandOutput, ProcessError> {
        info!(%address, image = %self.settings.image, "bootstrapping container runtime");
        let program = &self.settings.docker_bin;
        let output = self.runner.run(program, &self.args(address)).await?;
        debug!(
            code = ?output.code,
            stdout = %output.stdout,
            stderr = %output.stderr,
            "bootstrap helper finished"
        );
        output.into_success(program)
    }
}
