//! Configuration loading via `ortho-config`.

use std::env;
use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::api::{Credentials, DEFAULT_ENDPOINT};
use crate::provision::ProvisionError;
use crate::request::ProvisionRequest;

/// Image written to the boot volume when none is configured.
pub const DEFAULT_IMAGE_ID: &str = "ubuntu-14.04-docker";
/// Environment variable read for the account password when `PB_PASSWORD`
/// leaves it empty.
pub const PASSWORD_ENV_ALIAS: &str = "PB_PASSWD";
/// Root password baked into the boot image when none is configured.
pub const DEFAULT_IMAGE_PASSWORD: &str = "pbmachine-root";
/// Container image that installs the Docker runtime on a fresh host.
pub const DEFAULT_BOOTSTRAP_IMAGE: &str = "pbmachine/docker-bootstrap:latest";
/// Password handed to the bootstrap container for the remote host.
pub const DEFAULT_BOOTSTRAP_CREDENTIAL: &str = DEFAULT_IMAGE_PASSWORD;

/// ProfitBricks driver settings derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PB",
    discovery(
        app_name = "pbmachine",
        env_var = "PBMACHINE_CONFIG_PATH",
        config_file_name = "pbmachine.toml",
        dotfile_name = ".pbmachine.toml",
        project_file_name = "pbmachine.toml"
    )
)]
pub struct ProfitBricksConfig {
    /// Account user name. Required before provisioning.
    #[ortho_config(default = String::new())]
    pub user: String,
    /// Account password. Required before provisioning.
    #[ortho_config(default = String::new())]
    pub password: String,
    /// Name of the virtual data center to provision into.
    #[ortho_config(default = String::new())]
    pub vdc_name: String,
    /// Boot volume size in gigabytes.
    #[ortho_config(default = 10)]
    pub storage_size_gb: u32,
    /// Core count.
    #[ortho_config(default = 1)]
    pub cores: u32,
    /// Memory in gigabytes. Kept as text so that bad values surface as a
    /// provisioning error naming the field.
    #[ortho_config(default = "1".to_owned())]
    pub ram_gb: String,
    /// SOAP endpoint URL.
    #[ortho_config(default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Image written to the boot volume.
    #[ortho_config(default = DEFAULT_IMAGE_ID.to_owned())]
    pub image_id: String,
    /// Root password baked into the boot image.
    #[ortho_config(default = DEFAULT_IMAGE_PASSWORD.to_owned())]
    pub image_password: String,
    /// Container image used to install the runtime.
    #[ortho_config(default = DEFAULT_BOOTSTRAP_IMAGE.to_owned())]
    pub bootstrap_image: String,
    /// Password passed to the bootstrap container as `HOST_PASSWORD`.
    #[ortho_config(default = DEFAULT_BOOTSTRAP_CREDENTIAL.to_owned())]
    pub bootstrap_credential: String,
    /// Local container CLI used to launch the bootstrap container.
    #[ortho_config(default = "docker".to_owned())]
    pub docker_bin: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Remote SSH port.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Seconds between `getServer` polls.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Maximum number of `getServer` polls before giving up.
    #[ortho_config(default = 100)]
    pub max_poll_attempts: u32,
    /// Timeout for a single HTTP exchange, in seconds.
    #[ortho_config(default = 60)]
    pub http_timeout_secs: u64,
    /// Timeout for a single external command, in seconds.
    #[ortho_config(default = 900)]
    pub command_timeout_secs: u64,
    /// Whether to delete remote resources created by a failed attempt.
    #[ortho_config(default = true)]
    pub rollback_on_failure: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ProfitBricksConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to pbmachine.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    /// An empty password is filled from [`PASSWORD_ENV_ALIAS`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_iter([OsString::from("pbmachine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        if config.password.is_empty() {
            config.password = env::var(PASSWORD_ENV_ALIAS).unwrap_or_default();
        }
        Ok(config)
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a polling or timeout value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in [
            (&self.user, FieldMetadata::new("ProfitBricks user", "PB_USER", "user")),
            (
                &self.password,
                FieldMetadata::new(
                    "ProfitBricks password",
                    "PB_PASSWD or PB_PASSWORD",
                    "password",
                ),
            ),
            (
                &self.vdc_name,
                FieldMetadata::new("virtual data center name", "PB_VDC_NAME", "vdc_name"),
            ),
            (&self.endpoint, FieldMetadata::new("API endpoint", "PB_ENDPOINT", "endpoint")),
            (&self.image_id, FieldMetadata::new("boot image", "PB_IMAGE_ID", "image_id")),
            (
                &self.bootstrap_image,
                FieldMetadata::new("bootstrap image", "PB_BOOTSTRAP_IMAGE", "bootstrap_image"),
            ),
            (&self.docker_bin, FieldMetadata::new("docker binary", "PB_DOCKER_BIN", "docker_bin")),
            (&self.ssh_bin, FieldMetadata::new("ssh binary", "PB_SSH_BIN", "ssh_bin")),
            (
                &self.ssh_keygen_bin,
                FieldMetadata::new("ssh-keygen binary", "PB_SSH_KEYGEN_BIN", "ssh_keygen_bin"),
            ),
            (&self.ssh_user, FieldMetadata::new("SSH user", "PB_SSH_USER", "ssh_user")),
        ] {
            Self::require_field(value, &metadata)?;
        }

        for (value, field) in [
            (self.poll_interval_secs, "poll_interval_secs"),
            (u64::from(self.max_poll_attempts), "max_poll_attempts"),
            (self.http_timeout_secs, "http_timeout_secs"),
            (self.command_timeout_secs, "command_timeout_secs"),
            (u64::from(self.ssh_port), "ssh_port"),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Returns the account credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.user.trim(), self.password.clone())
    }

    /// Builds a [`ProvisionRequest`] for `machine_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidConfig`] when a value is out of range.
    pub fn provision_request(&self, machine_name: &str) -> Result<ProvisionRequest, ProvisionError> {
        ProvisionRequest::builder()
            .user(&self.user)
            .password(&self.password)
            .vdc_name(&self.vdc_name)
            .storage_size_gb(self.storage_size_gb)
            .cores(self.cores)
            .ram_gb(&self.ram_gb)
            .machine_name(machine_name)
            .build()
    }

    /// Delay between status polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Timeout for a single HTTP exchange.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Timeout for a single external command.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for ProfitBricksConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            vdc_name: String::new(),
            storage_size_gb: 10,
            cores: 1,
            ram_gb: String::from("1"),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            image_id: DEFAULT_IMAGE_ID.to_owned(),
            image_password: DEFAULT_IMAGE_PASSWORD.to_owned(),
            bootstrap_image: DEFAULT_BOOTSTRAP_IMAGE.to_owned(),
            bootstrap_credential: DEFAULT_BOOTSTRAP_CREDENTIAL.to_owned(),
            docker_bin: String::from("docker"),
            ssh_bin: String::from("ssh"),
            ssh_keygen_bin: String::from("ssh-keygen"),
            ssh_user: String::from("root"),
            ssh_port: 22,
            poll_interval_secs: 10,
            max_poll_attempts: 100,
            http_timeout_secs: 60,
            command_timeout_secs: 900,
            rollback_on_failure: true,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
