//! Readiness polling for freshly created servers.

use std::net::IpAddr;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ProvisionError, Stage};
use crate::api::{ApiGateway, Client, ServerId, ServerStatus, VirtualMachineState};
use crate::config::ProfitBricksConfig;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Default poll budget.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 100;

/// Fixed-interval poll budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Delay between consecutive polls.
    pub interval: Duration,
    /// Maximum number of polls.
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Derives the policy from configuration.
    #[must_use]
    pub const fn from_config(config: &ProfitBricksConfig) -> Self {
        Self::new(config.poll_interval(), config.max_poll_attempts)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_POLL_ATTEMPTS)
    }
}

/// A server observed in the running state with a usable address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunningServer {
    /// Status record from the successful poll.
    pub status: ServerStatus,
    /// Address taken from that record.
    pub address: IpAddr,
    /// Poll on which the server was found running, starting at 1.
    pub attempts: u32,
}

/// Polls `getServer` until the server runs with an address.
///
/// The first poll happens immediately; the policy interval separates later
/// polls and is the only point where cancellation is observed.
pub(crate) async fn wait_until_running<G: ApiGateway>(
    api: &Client<'_, G>,
    server_id: &ServerId,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<RunningServer, ProvisionError> {
    let mut saw_running = false;
    let mut last_state = VirtualMachineState::NoState;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled { stage: Stage::PollUntilRunning });
                }
                () = sleep(policy.interval) => {}
            }
        }

        let status = api.get_server(server_id).await?;
        debug!(
            %server_id,
            attempt,
            state = %status.state,
            ips = ?status.ips,
            "polled server state"
        );

        if status.state.is_failed() {
            return Err(ProvisionError::InstanceFailed {
                server_id: server_id.clone(),
                state: status.state,
            });
        }
        if status.state.is_running() {
            saw_running = true;
            if let Some(address) = status.address() {
                return Ok(RunningServer {
                    status,
                    address,
                    attempts: attempt,
                });
            }
        }
        last_state = status.state;
    }

    if saw_running {
        return Err(ProvisionError::MissingAddress {
            server_id: server_id.clone(),
            attempts: policy.max_attempts,
        });
    }
    Err(ProvisionError::ProvisioningTimeout {
        server_id: server_id.clone(),
        attempts: policy.max_attempts,
        last_state,
    })
}
