//! Newtypes for ProfitBricks identifiers and the reported VM state.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

newtype!(
    /// Identifier of a virtual data center.
    DataCenterId
);
newtype!(
    /// Identifier of a block storage volume.
    StorageId
);
newtype!(
    /// Identifier of a compute instance.
    ServerId
);

/// Lifecycle status of a compute instance as reported by `getServer`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum VirtualMachineState {
    /// No state reported yet.
    #[default]
    NoState,
    /// The instance is still being provisioned.
    Provisioning,
    /// The instance is running.
    Running,
    /// The instance is paused.
    Paused,
    /// The instance is shutting down.
    Shutdown,
    /// The instance is powered off.
    Shutoff,
    /// The hypervisor reports a crash.
    Crashed,
    /// Provisioning failed.
    Failed,
    /// Any value this crate does not recognise, kept verbatim.
    Other(String),
}

impl VirtualMachineState {
    /// Parses the API text, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "NOSTATE" => Self::NoState,
            "PROVISIONING" | "INPROCESS" => Self::Provisioning,
            "RUNNING" => Self::Running,
            "PAUSED" | "BLOCKED" => Self::Paused,
            "SHUTDOWN" => Self::Shutdown,
            "SHUTOFF" => Self::Shutoff,
            "CRASHED" => Self::Crashed,
            "FAILED" | "ERROR" => Self::Failed,
            _ => Self::Other(trimmed.to_owned()),
        }
    }

    /// Returns `true` for the running sentinel.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns `true` when the instance can no longer reach the running state.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Crashed | Self::Failed)
    }
}

impl fmt::Display for VirtualMachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoState => "NOSTATE",
            Self::Provisioning => "PROVISIONING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Shutdown => "SHUTDOWN",
            Self::Shutoff => "SHUTOFF",
            Self::Crashed => "CRASHED",
            Self::Failed => "FAILED",
            Self::Other(value) => value.as_str(),
        };
        f.write_str(label)
    }
}
