//! Parameters for a single provisioning attempt.

use crate::api::Credentials;
use crate::provision::ProvisionError;

/// Multiplier used to convert configured gigabytes of RAM into the megabytes
/// expected by `createServer`.
pub const MEGABYTES_PER_GIGABYTE: u32 = 1024;

/// Everything needed to provision one machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Account credentials.
    pub credentials: Credentials,
    /// Name of the virtual data center to provision into.
    pub vdc_name: String,
    /// Boot volume size in gigabytes.
    pub storage_size_gb: u32,
    /// Core count.
    pub cores: u32,
    /// Memory in gigabytes, kept as text until validation.
    pub ram_gb: String,
    /// Machine name, used for the server and its volume.
    pub machine_name: String,
}

impl ProvisionRequest {
    /// Starts a builder for a [`ProvisionRequest`].
    #[must_use]
    pub fn builder() -> ProvisionRequestBuilder {
        ProvisionRequestBuilder::new()
    }

    /// Checks every field, returning the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        if self.credentials.user.is_empty() {
            return Err(invalid("user must not be empty"));
        }
        if self.credentials.password.is_empty() {
            return Err(invalid("password must not be empty"));
        }
        if self.vdc_name.trim().is_empty() {
            return Err(invalid("vdc_name must not be empty"));
        }
        if self.machine_name.is_empty() {
            return Err(invalid("machine name must not be empty"));
        }
        if self.storage_size_gb == 0 {
            return Err(invalid("storage_size_gb must be greater than zero"));
        }
        if self.cores == 0 {
            return Err(invalid("cores must be greater than zero"));
        }
        self.ram_mb().map(|_| ())
    }

    /// Returns the requested memory in megabytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidConfig`] when `ram_gb` is not a
    /// positive integer or the conversion overflows.
    pub fn ram_mb(&self) -> Result<u32, ProvisionError> {
        gigabytes_to_megabytes(&self.ram_gb)
    }
}

/// Converts a textual gigabyte count into megabytes.
///
/// # Errors
///
/// Returns [`ProvisionError::InvalidConfig`] for non-numeric, zero, or
/// overflowing input.
pub fn gigabytes_to_megabytes(raw: &str) -> Result<u32, ProvisionError> {
    let trimmed = raw.trim();
    let gigabytes: u32 = trimmed
        .parse()
        .map_err(|_| invalid(&format!("ram_gb must be a whole number of gigabytes, got '{trimmed}'")))?;
    if gigabytes == 0 {
        return Err(invalid("ram_gb must be greater than zero"));
    }
    gigabytes
        .checked_mul(MEGABYTES_PER_GIGABYTE)
        .ok_or_else(|| invalid(&format!("ram_gb value {gigabytes} is too large")))
}

fn invalid(message: &str) -> ProvisionError {
    ProvisionError::InvalidConfig(message.to_owned())
}

/// Builder for [`ProvisionRequest`] that validates on [`build`](Self::build).
///
/// The user, RAM, and machine name are trimmed. The data center name is kept
/// verbatim because it is matched exactly.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisionRequestBuilder {
    user: String,
    password: String,
    vdc_name: String,
    storage_size_gb: u32,
    cores: u32,
    ram_gb: String,
    machine_name: String,
}

impl ProvisionRequestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the account user.
    #[must_use]
    pub fn user(mut self, value: impl Into<String>) -> Self {
        self.user = value.into();
        self
    }

    /// Sets the account password. It is not trimmed.
    #[must_use]
    pub fn password(mut self, value: impl Into<String>) -> Self {
        self.password = value.into();
        self
    }

    /// Sets the data center name.
    #[must_use]
    pub fn vdc_name(mut self, value: impl Into<String>) -> Self {
        self.vdc_name = value.into();
        self
    }

    /// Sets the boot volume size.
    #[must_use]
    pub const fn storage_size_gb(mut self, value: u32) -> Self {
        self.storage_size_gb = value;
        self
    }

    /// Sets the core count.
    #[must_use]
    pub const fn cores(mut self, value: u32) -> Self {
        self.cores = value;
        self
    }

    /// Sets the memory size in gigabytes.
    #[must_use]
    pub fn ram_gb(mut self, value: impl Into<String>) -> Self {
        self.ram_gb = value.into();
        self
    }

    /// Sets the machine name.
    #[must_use]
    pub fn machine_name(mut self, value: impl Into<String>) -> Self {
        self.machine_name = value.into();
        self
    }

    /// Builds and validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::InvalidConfig`] when any field is invalid.
    pub fn build(self) -> Result<ProvisionRequest, ProvisionError> {
        let request = ProvisionRequest {
            credentials: Credentials::new(self.user.trim(), self.password),
            vdc_name: self.vdc_name,
            storage_size_gb: self.storage_size_gb,
            cores: self.cores,
            ram_gb: self.ram_gb.trim().to_owned(),
            machine_name: self.machine_name.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}
