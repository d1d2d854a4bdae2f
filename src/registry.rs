//! Driver registration for a host plugin system.
//!
//! Nothing is registered at load time. A host calls [`registry_entry`] and
//! decides what to do with the result.

use std::collections::BTreeMap;

use crate::api::HttpGateway;
use crate::config::{PASSWORD_ENV_ALIAS, ProfitBricksConfig};
use crate::driver::{DRIVER_NAME, MachineSettings, PbDriver};
use crate::process::ProcessCommandRunner;

/// Flag carrying the account user.
pub const FLAG_USER: &str = "pb-user";
/// Flag carrying the account password.
pub const FLAG_PASSWORD: &str = "pb-password";
/// Flag carrying the data center name.
pub const FLAG_VDC_NAME: &str = "pb-vdc-name";
/// Flag carrying the boot volume size.
pub const FLAG_STORAGE_SIZE_GB: &str = "pb-storage-size-gb";
/// Flag carrying the core count.
pub const FLAG_CORES: &str = "pb-cores";
/// Flag carrying the memory size.
pub const FLAG_RAM_GB: &str = "pb-ram-gb";

/// A creation flag exposed to the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlagSpec {
    /// Flag name without leading dashes.
    pub name: &'static str,
    /// Environment variable bound to the flag.
    pub env_var: &'static str,
    /// Help text.
    pub usage: &'static str,
    /// Default value, when the flag has one.
    pub default: Option<&'static str>,
}

/// Returns the creation flag catalogue.
#[must_use]
pub fn create_flags() -> Vec<FlagSpec> {
    vec![
        FlagSpec {
            name: FLAG_USER,
            env_var: "PB_USER",
            usage: "ProfitBricks user name",
            default: None,
        },
        FlagSpec {
            name: FLAG_PASSWORD,
            env_var: PASSWORD_ENV_ALIAS,
            usage: "ProfitBricks password",
            default: None,
        },
        FlagSpec {
            name: FLAG_VDC_NAME,
            env_var: "PB_VDC_NAME",
            usage: "Name of the virtual data center to provision into",
            default: None,
        },
        FlagSpec {
            name: FLAG_STORAGE_SIZE_GB,
            env_var: "PB_STORAGE_SIZE_GB",
            usage: "Boot volume size in gigabytes",
            default: Some("10"),
        },
        FlagSpec {
            name: FLAG_CORES,
            env_var: "PB_CORES",
            usage: "Number of cores",
            default: Some("1"),
        },
        FlagSpec {
            name: FLAG_RAM_GB,
            env_var: "PB_RAM_GB",
            usage: "Memory in gigabytes",
            default: Some("1"),
        },
    ]
}

/// Source of flag values supplied by the host.
pub trait DriverOptions {
    /// Returns the value of `name`, or `None` when it was not supplied.
    fn string(&self, name: &str) -> Option<String>;
}

impl DriverOptions for BTreeMap<String, String> {
    fn string(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Constructs a driver for one machine.
pub type DriverFactory =
    fn(MachineSettings, ProfitBricksConfig) -> PbDriver<HttpGateway, ProcessCommandRunner>;

/// Everything a host needs to offer this driver.
#[derive(Clone, Copy, Debug)]
pub struct RegisteredDriver {
    /// Driver name.
    pub name: &'static str,
    /// Flag catalogue.
    pub create_flags: fn() -> Vec<FlagSpec>,
    /// Driver constructor.
    pub factory: DriverFactory,
}

/// Returns the registry entry for the ProfitBricks driver.
#[must_use]
pub fn registry_entry() -> RegisteredDriver {
    RegisteredDriver {
        name: DRIVER_NAME,
        create_flags,
        factory: PbDriver::<HttpGateway, ProcessCommandRunner>::from_config,
    }
}
