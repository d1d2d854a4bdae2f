//! Typed SOAP request documents.
//!
//! Requests are modelled as plain structs and serialised with `quick-xml`'s
//! serde support, so every value is escaped as XML text. Nothing is spliced
//! into a raw template.

use serde::Serialize;

use super::error::{ApiError, Operation};
use super::model::{StorageCreated, StorageVolume};
use super::types::{DataCenterId, ServerId, StorageId};

/// Namespace of the SOAP 1.1 envelope.
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// Namespace of the ProfitBricks web service.
pub const PROFITBRICKS_WS_NS: &str = "http://ws.api.profitbricks.com/";

/// Parameters of a `createStorage` call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateStorageCall {
    /// Data center that will own the volume.
    pub data_center_id: DataCenterId,
    /// Volume name.
    pub storage_name: String,
    /// Size in gigabytes.
    pub size_gb: u32,
    /// Image written to the volume.
    pub image_id: String,
    /// Root password baked into the image.
    pub image_password: String,
}

impl CreateStorageCall {
    /// Combines this request with the API's answer into a [`StorageVolume`].
    #[must_use]
    pub fn volume(&self, created: StorageCreated) -> StorageVolume {
        StorageVolume {
            id: created.storage_id,
            data_center_id: self.data_center_id.clone(),
            size_gb: self.size_gb,
        }
    }
}

/// Parameters of a `createServer` call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateServerCall {
    /// Data center that will own the server.
    pub data_center_id: DataCenterId,
    /// Server name, usually the machine name.
    pub server_name: String,
    /// Core count.
    pub cores: u32,
    /// Memory in megabytes.
    pub ram_mb: u32,
    /// Volume to boot from.
    pub boot_storage_id: StorageId,
    /// Whether to attach the server to the public internet.
    pub internet_access: bool,
    /// Whether cores, RAM, NICs, and disks may be hot-plugged.
    pub hot_plug: bool,
}

/// A single remote call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// List every data center visible to the account.
    ListDataCenters,
    /// Create a bootable storage volume.
    CreateStorage(CreateStorageCall),
    /// Create a server booting from a volume.
    CreateServer(CreateServerCall),
    /// Fetch the current status of a server.
    GetServer(ServerId),
    /// Delete a server.
    DeleteServer(ServerId),
    /// Delete a storage volume.
    DeleteStorage(StorageId),
}

impl ApiCall {
    /// Returns the logical operation of this call.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::ListDataCenters => Operation::ListDataCenters,
            Self::CreateStorage(_) => Operation::CreateStorage,
            Self::CreateServer(_) => Operation::CreateServer,
            Self::GetServer(_) => Operation::GetServer,
            Self::DeleteServer(_) => Operation::DeleteServer,
            Self::DeleteStorage(_) => Operation::DeleteStorage,
        }
    }

    /// Serialises the call into a SOAP envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Encode`] when the serialiser rejects the document.
    pub fn to_xml(&self) -> Result<String, ApiError> {
        let envelope = Envelope {
            soapenv_ns: SOAP_ENVELOPE_NS,
            ws_ns: PROFITBRICKS_WS_NS,
            header: Header {},
            body: Body {
                operation: self.wire_operation(),
            },
        };
        quick_xml::se::to_string(&envelope).map_err(|err| ApiError::Encode {
            operation: self.operation(),
            message: err.to_string(),
        })
    }

    fn wire_operation(&self) -> WireOperation<'_> {
        match self {
            Self::ListDataCenters => WireOperation::GetAllDataCenters,
            Self::CreateStorage(call) => WireOperation::CreateStorage {
                request: StorageRequest {
                    data_center_id: call.data_center_id.as_str(),
                    storage_name: call.storage_name.as_str(),
                    size: call.size_gb,
                    mount_image_id: call.image_id.as_str(),
                    profit_bricks_image_password: call.image_password.as_str(),
                },
            },
            Self::CreateServer(call) => WireOperation::CreateServer {
                request: ServerRequest {
                    data_center_id: call.data_center_id.as_str(),
                    server_name: call.server_name.as_str(),
                    cores: call.cores,
                    ram: call.ram_mb,
                    boot_from_storage_id: call.boot_storage_id.as_str(),
                    internet_access: call.internet_access,
                    cpu_hot_plug: call.hot_plug,
                    ram_hot_plug: call.hot_plug,
                    nic_hot_plug: call.hot_plug,
                    nic_hot_un_plug: call.hot_plug,
                    disc_virtio_hot_plug: call.hot_plug,
                    disc_virtio_hot_un_plug: call.hot_plug,
                },
            },
            Self::GetServer(server_id) => WireOperation::GetServer {
                server_id: server_id.as_str(),
            },
            Self::DeleteServer(server_id) => WireOperation::DeleteServer {
                server_id: server_id.as_str(),
            },
            Self::DeleteStorage(storage_id) => WireOperation::DeleteStorage {
                storage_id: storage_id.as_str(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename = "soapenv:Envelope")]
struct Envelope<'a> {
    #[serde(rename = "@xmlns:soapenv")]
    soapenv_ns: &'static str,
    #[serde(rename = "@xmlns:ws")]
    ws_ns: &'static str,
    #[serde(rename = "soapenv:Header")]
    header: Header,
    #[serde(rename = "soapenv:Body")]
    body: Body<'a>,
}

#[derive(Serialize)]
struct Header {}

#[derive(Serialize)]
struct Body<'a> {
    #[serde(rename = "$value")]
    operation: WireOperation<'a>,
}

#[derive(Serialize)]
enum WireOperation<'a> {
    #[serde(rename = "ws:getAllDataCenters")]
    GetAllDataCenters,
    #[serde(rename = "ws:createStorage")]
    CreateStorage { request: StorageRequest<'a> },
    #[serde(rename = "ws:createServer")]
    CreateServer { request: ServerRequest<'a> },
    #[serde(rename = "ws:getServer")]
    GetServer {
        #[serde(rename = "serverId")]
        server_id: &'a str,
    },
    #[serde(rename = "ws:deleteServer")]
    DeleteServer {
        #[serde(rename = "serverId")]
        server_id: &'a str,
    },
    #[serde(rename = "ws:deleteStorage")]
    DeleteStorage {
        #[serde(rename = "storageId")]
        storage_id: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StorageRequest<'a> {
    data_center_id: &'a str,
    storage_name: &'a str,
    size: u32,
    mount_image_id: &'a str,
    profit_bricks_image_password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors the createServer wire schema, which spells each hot-plug flag out"
)]
struct ServerRequest<'a> {
    data_center_id: &'a str,
    server_name: &'a str,
    cores: u32,
    ram: u32,
    boot_from_storage_id: &'a str,
    internet_access: bool,
    cpu_hot_plug: bool,
    ram_hot_plug: bool,
    nic_hot_plug: bool,
    nic_hot_un_plug: bool,
    disc_virtio_hot_plug: bool,
    disc_virtio_hot_un_plug: bool,
}
