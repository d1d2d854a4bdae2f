//! Provisioning orchestration.
//!
//! A machine is provisioned in a fixed sequence of stages:
//!
//! 1. generate (or reuse) the SSH key pair,
//! 2. resolve the data center by name,
//! 3. create the boot volume,
//! 4. create the server,
//! 5. poll until the server runs with an address,
//! 6. bootstrap the container runtime.
//!
//! Resources created along the way are recorded in a [`RollbackLedger`] and
//! deleted, newest first, when a later stage fails.

mod error;
mod poll;
mod rollback;

use std::fmt;
use std::net::IpAddr;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use error::ProvisionError;
pub use poll::{DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL, PollPolicy, RunningServer};
pub use rollback::{RollbackLedger, RollbackReport, UndoAction};

use crate::api::{
    ApiGateway, Client, ComputeInstance, CreateServerCall, CreateStorageCall, DataCenter,
    StorageVolume, VirtualMachineState,
};
use crate::bootstrap::RuntimeBootstrapper;
use crate::config::ProfitBricksConfig;
use crate::process::CommandRunner;
use crate::request::ProvisionRequest;
use crate::ssh::{KeyPair, SshClient};

/// Provisioning stage, used in logs and errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stage {
    /// Request validation.
    Validate,
    /// SSH key generation.
    KeyGen,
    /// Data center lookup.
    ResolveDataCenter,
    /// Boot volume creation.
    CreateStorage,
    /// Server creation.
    CreateInstance,
    /// Readiness polling.
    PollUntilRunning,
    /// Container runtime installation.
    BootstrapRuntime,
    /// Provisioning finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validate => "validate",
            Self::KeyGen => "key-gen",
            Self::ResolveDataCenter => "resolve-data-center",
            Self::CreateStorage => "create-storage",
            Self::CreateInstance => "create-instance",
            Self::PollUntilRunning => "poll-until-running",
            Self::BootstrapRuntime => "bootstrap-runtime",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Image settings for the boot volume.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageDefaults {
    /// Image written to the volume.
    pub image_id: String,
    /// Root password baked into the image.
    pub image_password: String,
}

impl ImageDefaults {
    /// Derives image settings from configuration.
    #[must_use]
    pub fn from_config(config: &ProfitBricksConfig) -> Self {
        Self {
            image_id: config.image_id.clone(),
            image_password: config.image_password.clone(),
        }
    }
}

impl fmt::Debug for ImageDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageDefaults")
            .field("image_id", &self.image_id)
            .field("image_password", &"<redacted>")
            .finish()
    }
}

/// Result of a successful provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Provisioned {
    /// Data center the machine lives in.
    pub data_center: DataCenter,
    /// Boot volume.
    pub storage: StorageVolume,
    /// Running server.
    pub instance: ComputeInstance,
    /// Public address of the server.
    pub address: IpAddr,
    /// SSH key pair authorised on the server.
    pub key_pair: KeyPair,
    /// Number of status polls it took to see the server running.
    pub poll_attempts: u32,
}

/// Drives the provisioning stages against an API gateway and command runner.
#[derive(Debug)]
pub struct Provisioner<G, R> {
    gateway: G,
    ssh: SshClient<R>,
    bootstrapper: RuntimeBootstrapper<R>,
    image: ImageDefaults,
    poll: PollPolicy,
    rollback_on_failure: bool,
}

struct Attempt<'a, G> {
    api: Client<'a, G>,
    ledger: RollbackLedger,
    stage: Stage,
}

impl<G, R> Provisioner<G, R>
where
    G: ApiGateway,
    R: CommandRunner,
{
    /// Creates a provisioner with the default poll policy and rollback
    /// enabled.
    #[must_use]
    pub fn new(
        gateway: G,
        ssh: SshClient<R>,
        bootstrapper: RuntimeBootstrapper<R>,
        image: ImageDefaults,
    ) -> Self {
        Self {
            gateway,
            ssh,
            bootstrapper,
            image,
            poll: PollPolicy::default(),
            rollback_on_failure: true,
        }
    }

    /// Overrides the poll policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll = policy;
        self
    }

    /// Enables or disables rollback of partially created resources.
    #[must_use]
    pub const fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    /// Returns the gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Provisions one machine.
    ///
    /// The request is validated before any remote call. When a stage fails
    /// after resources were created, they are rolled back (unless disabled)
    /// and the original error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] describing the first failing stage. If any
    /// created resource survives the rollback, that error is wrapped in
    /// [`ProvisionError::ResourcesLeftBehind`] together with the survivors.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<Provisioned, ProvisionError> {
        request.validate().inspect_err(|err| {
            error!(stage = %Stage::Validate, error = %err, "provisioning failed");
        })?;
        let ram_mb = request.ram_mb()?;

        let mut attempt = Attempt {
            api: Client::new(&self.gateway, &request.credentials),
            ledger: RollbackLedger::default(),
            stage: Stage::Validate,
        };
        match self.run_stages(&mut attempt, request, ram_mb, cancel).await {
            Ok(provisioned) => {
                info!(
                    stage = %Stage::Done,
                    server_id = %provisioned.instance.id,
                    address = %provisioned.address,
                    polls = provisioned.poll_attempts,
                    "machine provisioned"
                );
                Ok(provisioned)
            }
            Err(err) => {
                error!(
                    stage = %attempt.stage,
                    error = %err,
                    body = err.response_body().unwrap_or_default(),
                    "provisioning failed"
                );
                let resources = self.settle(attempt).await;
                if resources.is_empty() {
                    return Err(err);
                }
                Err(ProvisionError::ResourcesLeftBehind {
                    cause: Box::new(err),
                    resources,
                })
            }
        }
    }

    async fn run_stages(
        &self,
        attempt: &mut Attempt<'_, G>,
        request: &ProvisionRequest,
        ram_mb: u32,
        cancel: &CancellationToken,
    ) -> Result<Provisioned, ProvisionError> {
        enter(attempt, Stage::KeyGen, cancel)?;
        let key_pair = self
            .ssh
            .generate_key_pair()
            .await
            .map_err(|err| ProvisionError::KeyGen {
                message: err.to_string(),
            })?;

        enter(attempt, Stage::ResolveDataCenter, cancel)?;
        let centers = attempt.api.list_data_centers().await?;
        let data_center = resolve_data_center(centers, &request.vdc_name)?;

        enter(attempt, Stage::CreateStorage, cancel)?;
        let storage_call = CreateStorageCall {
            data_center_id: data_center.id.clone(),
            storage_name: format!("{}-storage", request.machine_name),
            size_gb: request.storage_size_gb,
            image_id: self.image.image_id.clone(),
            image_password: self.image.image_password.clone(),
        };
        let storage = attempt
            .api
            .create_storage(&storage_call)
            .await
            .map_err(ProvisionError::storage_creation)?;
        attempt.ledger.push(UndoAction::DeleteStorage(storage.id.clone()));
        info!(storage_id = %storage.id, size_gb = storage.size_gb, "storage created");

        enter(attempt, Stage::CreateInstance, cancel)?;
        let server_call = CreateServerCall {
            data_center_id: data_center.id.clone(),
            server_name: request.machine_name.clone(),
            cores: request.cores,
            ram_mb,
            boot_storage_id: storage.id.clone(),
            internet_access: true,
            hot_plug: true,
        };
        let mut instance = attempt
            .api
            .create_server(&server_call)
            .await
            .map_err(ProvisionError::server_creation)?;
        attempt.ledger.push(UndoAction::DeleteServer(instance.id.clone()));
        info!(server_id = %instance.id, cores = instance.cores, ram_mb, "server created");

        enter(attempt, Stage::PollUntilRunning, cancel)?;
        let running = poll::wait_until_running(&attempt.api, &instance.id, self.poll, cancel).await?;
        instance.state = VirtualMachineState::Running;

        enter(attempt, Stage::BootstrapRuntime, cancel)?;
        self.bootstrapper
            .bootstrap(running.address)
            .await
            .map_err(|err| ProvisionError::Bootstrap {
                message: err.to_string(),
            })?;

        Ok(Provisioned {
            data_center,
            storage,
            instance,
            address: running.address,
            key_pair,
            poll_attempts: running.attempts,
        })
    }

    /// Rolls back what the attempt created and returns what is still left.
    async fn settle(&self, attempt: Attempt<'_, G>) -> Vec<UndoAction> {
        let Attempt { api, ledger, .. } = attempt;
        if ledger.is_empty() {
            return Vec::new();
        }
        if !self.rollback_on_failure {
            return ledger.abandon();
        }
        let report = ledger.unwind(&api).await;
        if report.is_clean() {
            info!(removed = report.completed.len(), "rollback complete");
        } else {
            error!(
                removed = report.completed.len(),
                failed = report.failed.len(),
                "rollback incomplete"
            );
        }
        report.into_orphaned()
    }
}

fn enter<G>(
    attempt: &mut Attempt<'_, G>,
    stage: Stage,
    cancel: &CancellationToken,
) -> Result<(), ProvisionError> {
    if cancel.is_cancelled() {
        return Err(ProvisionError::Cancelled {
            stage: attempt.stage,
        });
    }
    attempt.stage = stage;
    info!(%stage, "entering stage");
    Ok(())
}

/// Picks the data center whose name equals `name` exactly.
///
/// # Errors
///
/// Returns [`ProvisionError::DataCenterNotFound`] when nothing matches and
/// [`ProvisionError::AmbiguousDataCenter`] when several do.
pub fn resolve_data_center(
    centers: Vec<DataCenter>,
    name: &str,
) -> Result<DataCenter, ProvisionError> {
    let (mut matches, others): (Vec<_>, Vec<_>) =
        centers.into_iter().partition(|center| center.name == name);
    if matches.len() > 1 {
        return Err(ProvisionError::AmbiguousDataCenter {
            name: name.to_owned(),
            count: matches.len(),
        });
    }
    matches
        .pop()
        .ok_or_else(|| ProvisionError::DataCenterNotFound {
            name: name.to_owned(),
            available: others.into_iter().map(|center| center.name).collect(),
        })
}

#[cfg(test)]
mod tests;
