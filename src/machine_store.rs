//! Persistent per-machine state.
//!
//! After a successful `create` the driver writes the identifiers it needs for
//! later commands (`state`, `ip`, `ssh-command`, ...) to
//! `<store>/pb-machine.json`.

use std::io;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{DataCenterId, ServerId, StorageId};
use crate::provision::Provisioned;

/// File name of the machine record inside the store directory.
pub const RECORD_FILE_NAME: &str = "pb-machine.json";

/// Identifiers of a provisioned machine.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MachineRecord {
    /// Machine name.
    pub machine_name: String,
    /// Data center the machine lives in.
    pub data_center_id: Option<DataCenterId>,
    /// Boot volume.
    pub storage_id: Option<StorageId>,
    /// Server.
    pub server_id: Option<ServerId>,
    /// Public address.
    pub ip_address: Option<IpAddr>,
}

impl MachineRecord {
    /// Creates an empty record for `machine_name`.
    pub fn new(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            ..Self::default()
        }
    }

    /// Copies the identifiers of a provisioning result.
    pub fn apply(&mut self, provisioned: &Provisioned) {
        self.data_center_id = Some(provisioned.data_center.id.clone());
        self.storage_id = Some(provisioned.storage.id.clone());
        self.server_id = Some(provisioned.instance.id.clone());
        self.ip_address = Some(provisioned.address);
    }
}

/// Errors raised while reading or writing the machine record.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MachineStoreError {
    /// Raised when no record exists yet.
    #[error("no machine record at {path}; run `pbmachine create` first")]
    Missing {
        /// Expected record path.
        path: Utf8PathBuf,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the record is not valid JSON.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// JSON record store rooted at a machine's store directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineStore {
    root: Utf8PathBuf,
}

impl MachineStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        self.root.join(RECORD_FILE_NAME)
    }

    /// Reads the record.
    ///
    /// # Errors
    ///
    /// Returns [`MachineStoreError::Missing`] when no record exists, and
    /// [`MachineStoreError::Io`] or [`MachineStoreError::Parse`] when it
    /// cannot be read.
    pub fn load(&self) -> Result<MachineRecord, MachineStoreError> {
        let path = self.path();
        let dir = Dir::open_ambient_dir(&self.root, ambient_authority())
            .map_err(|err| missing_or_io(&path, &self.root, &err))?;
        let contents = dir
            .read_to_string(RECORD_FILE_NAME)
            .map_err(|err| missing_or_io(&path, &path, &err))?;
        serde_json::from_str(&contents).map_err(|err| MachineStoreError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Writes the record, creating the store directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`MachineStoreError::Io`] when the directory or file cannot be
    /// written.
    pub fn save(&self, record: &MachineRecord) -> Result<Utf8PathBuf, MachineStoreError> {
        let path = self.path();
        Dir::create_ambient_dir_all(&self.root, ambient_authority())
            .map_err(|err| io_error(&self.root, &err))?;
        let dir = Dir::open_ambient_dir(&self.root, ambient_authority())
            .map_err(|err| io_error(&self.root, &err))?;
        let rendered =
            serde_json::to_string_pretty(record).map_err(|err| MachineStoreError::Parse {
                path: path.clone(),
                message: err.to_string(),
            })?;
        dir.write(RECORD_FILE_NAME, rendered)
            .map_err(|err| io_error(&path, &err))?;
        Ok(path)
    }
}

fn io_error(path: &Utf8Path, err: &io::Error) -> MachineStoreError {
    MachineStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn missing_or_io(record: &Utf8Path, accessed: &Utf8Path, err: &io::Error) -> MachineStoreError {
    if err.kind() == io::ErrorKind::NotFound {
        MachineStoreError::Missing {
            path: record.to_path_buf(),
        }
    } else {
        io_error(accessed, err)
    }
}
