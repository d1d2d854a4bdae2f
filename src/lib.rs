//! ProfitBricks machine driver.
//!
//! The crate provisions a Docker-ready virtual machine on the ProfitBricks
//! SOAP API (boot volume, server, readiness polling, runtime bootstrap) and
//! exposes the result through a host-facing driver surface.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod machine_store;
pub mod process;
pub mod provision;
pub mod registry;
pub mod request;
pub mod ssh;
pub mod test_support;

pub use api::{ApiError, ApiGateway, Client, Credentials, HttpGateway};
pub use bootstrap::{BootstrapSettings, RuntimeBootstrapper};
pub use config::{ConfigError, ProfitBricksConfig};
pub use driver::{DriverError, MachineSettings, MachineState, PbDriver};
pub use machine_store::{MachineRecord, MachineStore, MachineStoreError};
pub use process::{CommandOutput, CommandRunner, ProcessCommandRunner, ProcessError};
pub use provision::{PollPolicy, ProvisionError, Provisioned, Provisioner, Stage};
pub use registry::{DriverOptions, FlagSpec, RegisteredDriver, registry_entry};
pub use request::{ProvisionRequest, ProvisionRequestBuilder};
pub use ssh::{KeyPair, SshClient, SshCommand, SshSettings};
