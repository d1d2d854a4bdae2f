//! Typed records exchanged with the ProfitBricks API.

use std::net::IpAddr;
use std::str::FromStr;

use super::types::{DataCenterId, ServerId, StorageId, VirtualMachineState};

/// A virtual data center listed by `getAllDataCenters`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataCenter {
    /// Provider identifier.
    pub id: DataCenterId,
    /// Human readable name, matched against the requested VDC name.
    pub name: String,
    /// Version counter bumped by the API on every change.
    pub version: u32,
    /// Provisioning-state tag (for example `AVAILABLE`).
    pub provisioning_state: String,
}

/// Result of `createStorage`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageCreated {
    /// Identifier of the new volume.
    pub storage_id: StorageId,
    /// Asynchronous request identifier, when reported.
    pub request_id: Option<String>,
}

/// Result of `createServer`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCreated {
    /// Identifier of the new server.
    pub server_id: ServerId,
    /// Asynchronous request identifier, when reported.
    pub request_id: Option<String>,
}

/// Result of `getServer`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerStatus {
    /// Identifier of the server.
    pub server_id: ServerId,
    /// Server name as stored by the API.
    pub server_name: String,
    /// Reported `virtualMachineState`.
    pub state: VirtualMachineState,
    /// Reported `provisioningState`.
    pub provisioning_state: String,
    /// Every `ips` value in document order.
    pub ips: Vec<String>,
}

impl ServerStatus {
    /// Returns the first IP value that parses as an address.
    #[must_use]
    pub fn address(&self) -> Option<IpAddr> {
        self.ips
            .iter()
            .find_map(|raw| IpAddr::from_str(raw.trim()).ok())
    }
}

/// Result of a delete call; only the request id is of interest.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Acknowledged {
    /// Asynchronous request identifier, when reported.
    pub request_id: Option<String>,
}

/// Block storage volume created to boot the instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageVolume {
    /// Provider identifier.
    pub id: StorageId,
    /// Owning data center.
    pub data_center_id: DataCenterId,
    /// Size in gigabytes.
    pub size_gb: u32,
}

/// Compute instance booted from a [`StorageVolume`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComputeInstance {
    /// Provider identifier.
    pub id: ServerId,
    /// Owning data center.
    pub data_center_id: DataCenterId,
    /// Boot volume.
    pub storage_id: StorageId,
    /// Requested core count.
    pub cores: u32,
    /// Requested memory in megabytes.
    pub ram_mb: u32,
    /// Last state observed while polling.
    pub state: VirtualMachineState,
}
