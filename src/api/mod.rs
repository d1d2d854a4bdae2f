//! ProfitBricks SOAP API client.
//!
//! Calls are encoded by [`ApiCall::to_xml`], sent through an [`ApiGateway`],
//! and decoded into typed records. [`Client`] ties the three steps together
//! for a single set of credentials.

mod decode;
mod envelope;
mod error;
mod gateway;
mod model;
mod types;

pub use decode::{ResponseRecord, ReturnFields, SoapResponse, decode, parse_envelope};
pub use envelope::{
    ApiCall, CreateServerCall, CreateStorageCall, PROFITBRICKS_WS_NS, SOAP_ENVELOPE_NS,
};
pub use error::{ApiError, Operation};
pub use gateway::{
    ApiFuture, ApiGateway, Credentials, DEFAULT_ENDPOINT, DEFAULT_HTTP_TIMEOUT, HttpGateway,
};
pub use model::{
    Acknowledged, ComputeInstance, DataCenter, ServerCreated, ServerStatus, StorageCreated,
    StorageVolume,
};
pub use types::{DataCenterId, ServerId, StorageId, VirtualMachineState};

use tracing::trace;

/// Typed view over a gateway bound to one set of credentials.
#[derive(Debug)]
pub struct Client<'a, G> {
    gateway: &'a G,
    credentials: &'a Credentials,
}

impl<G> Clone for Client<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G> Copy for Client<'_, G> {}

impl<'a, G: ApiGateway> Client<'a, G> {
    /// Binds `gateway` to `credentials`.
    #[must_use]
    pub const fn new(gateway: &'a G, credentials: &'a Credentials) -> Self {
        Self {
            gateway,
            credentials,
        }
    }

    /// Lists every data center visible to the account.
    ///
    /// # Errors
    ///
    /// Propagates transport, decode, and fault errors.
    pub async fn list_data_centers(&self) -> Result<Vec<DataCenter>, ApiError> {
        self.call(&ApiCall::ListDataCenters).await
    }

    /// Creates a storage volume.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::EmptyResult`] when the response has no storage id.
    pub async fn create_storage(&self, call: &CreateStorageCall) -> Result<StorageVolume, ApiError> {
        let created: StorageCreated = self.call(&ApiCall::CreateStorage(call.clone())).await?;
        Ok(call.volume(created))
    }

    /// Creates a server booting from an existing volume.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::EmptyResult`] when the response has no server id.
    pub async fn create_server(&self, call: &CreateServerCall) -> Result<ComputeInstance, ApiError> {
        let created: ServerCreated = self.call(&ApiCall::CreateServer(call.clone())).await?;
        Ok(ComputeInstance {
            id: created.server_id,
            data_center_id: call.data_center_id.clone(),
            storage_id: call.boot_storage_id.clone(),
            cores: call.cores,
            ram_mb: call.ram_mb,
            state: VirtualMachineState::NoState,
        })
    }

    /// Fetches the status of a server.
    ///
    /// # Errors
    ///
    /// Propagates transport, decode, and fault errors.
    pub async fn get_server(&self, server_id: &ServerId) -> Result<ServerStatus, ApiError> {
        self.call(&ApiCall::GetServer(server_id.clone())).await
    }

    /// Deletes a server.
    ///
    /// # Errors
    ///
    /// Propagates transport, decode, and fault errors.
    pub async fn delete_server(&self, server_id: &ServerId) -> Result<Acknowledged, ApiError> {
        self.call(&ApiCall::DeleteServer(server_id.clone())).await
    }

    /// Deletes a storage volume.
    ///
    /// # Errors
    ///
    /// Propagates transport, decode, and fault errors.
    pub async fn delete_storage(&self, storage_id: &StorageId) -> Result<Acknowledged, ApiError> {
        self.call(&ApiCall::DeleteStorage(storage_id.clone())).await
    }

    async fn call<T: ResponseRecord>(&self, call: &ApiCall) -> Result<T, ApiError> {
        let operation = call.operation();
        let body = self.gateway.invoke(call, self.credentials).await?;
        trace!(%operation, %body, "raw SOAP response");
        decode(operation, &body)
    }
}

#[cfg(test)]
mod tests;
