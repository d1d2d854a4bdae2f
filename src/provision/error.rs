//! Errors raised while provisioning a machine.

use thiserror::Error;

use super::{Stage, UndoAction};
use crate::api::{ApiError, ServerId, VirtualMachineState};

/// Errors surfaced by [`Provisioner::provision`](super::Provisioner::provision).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the request is unusable; no remote call has been made.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Raised when the SSH key pair cannot be generated.
    #[error("failed to generate SSH key pair: {message}")]
    KeyGen {
        /// Underlying failure.
        message: String,
    },
    /// Raised when a remote call fails outside a stage-specific mapping.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Raised when no data center has the requested name.
    #[error("data center '{name}' not found (available: {names})", names = .available.join(", "))]
    DataCenterNotFound {
        /// Requested name.
        name: String,
        /// Names visible to the account.
        available: Vec<String>,
    },
    /// Raised when several data centers share the requested name.
    #[error("data center name '{name}' matches {count} data centers")]
    AmbiguousDataCenter {
        /// Requested name.
        name: String,
        /// Number of matches.
        count: usize,
    },
    /// Raised when `createStorage` yields no volume.
    #[error("storage creation failed: {message}")]
    StorageCreation {
        /// Description of the failure.
        message: String,
        /// Raw response body.
        body: String,
    },
    /// Raised when `createServer` yields no server.
    #[error("server creation failed: {message}")]
    ServerCreation {
        /// Description of the failure.
        message: String,
        /// Raw response body.
        body: String,
    },
    /// Raised when the poll budget is exhausted before the server runs.
    #[error("server {server_id} did not reach RUNNING after {attempts} polls (last state {last_state})")]
    ProvisioningTimeout {
        /// Server being polled.
        server_id: ServerId,
        /// Polls performed.
        attempts: u32,
        /// State reported by the final poll.
        last_state: VirtualMachineState,
    },
    /// Raised when the server runs but never reports a usable address.
    #[error("server {server_id} is running but reported no usable IP address after {attempts} polls")]
    MissingAddress {
        /// Server being polled.
        server_id: ServerId,
        /// Polls performed.
        attempts: u32,
    },
    /// Raised when the server enters a state it cannot recover from.
    #[error("server {server_id} entered state {state}")]
    InstanceFailed {
        /// Server being polled.
        server_id: ServerId,
        /// Reported state.
        state: VirtualMachineState,
    },
    /// Raised when the runtime bootstrap helper fails.
    #[error("runtime bootstrap failed: {message}")]
    Bootstrap {
        /// Underlying failure.
        message: String,
    },
    /// Raised when the caller cancels provisioning.
    #[error("provisioning cancelled during {stage}")]
    Cancelled {
        /// Stage that was interrupted.
        stage: Stage,
    },
    /// Wraps a stage failure whose created resources could not all be
    /// deleted, either because rollback is disabled or a delete call failed.
    #[error("{cause}; resources left behind: {names}", names = list_resources(.resources))]
    ResourcesLeftBehind {
        /// Failure that stopped provisioning.
        cause: Box<ProvisionError>,
        /// Resources still present on the account, newest first.
        resources: Vec<UndoAction>,
    },
}

fn list_resources(resources: &[UndoAction]) -> String {
    resources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ProvisionError {
    /// Returns the raw response body when the error carries one.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Api(err) => err.response_body(),
            Self::StorageCreation { body, .. } | Self::ServerCreation { body, .. } => {
                Some(body.as_str())
            }
            Self::ResourcesLeftBehind { cause, .. } => cause.response_body(),
            _ => None,
        }
    }

    /// Returns the stage failure, unwrapping [`Self::ResourcesLeftBehind`].
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::ResourcesLeftBehind { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Remote resources a failed attempt left on the account.
    #[must_use]
    pub fn orphaned(&self) -> &[UndoAction] {
        match self {
            Self::ResourcesLeftBehind { resources, .. } => resources,
            _ => &[],
        }
    }

    /// Maps `createStorage` failures that produced no volume.
    pub(crate) fn storage_creation(err: ApiError) -> Self {
        match err {
            ApiError::EmptyResult { ref body, .. } | ApiError::Fault { ref body, .. } => {
                Self::StorageCreation {
                    message: err.to_string(),
                    body: body.clone(),
                }
            }
            other => Self::Api(other),
        }
    }

    /// Maps `createServer` failures that produced no server.
    pub(crate) fn server_creation(err: ApiError) -> Self {
        match err {
            ApiError::EmptyResult { ref body, .. } | ApiError::Fault { ref body, .. } => {
                Self::ServerCreation {
                    message: err.to_string(),
                    body: body.clone(),
                }
            }
            other => Self::Api(other),
        }
    }
}
