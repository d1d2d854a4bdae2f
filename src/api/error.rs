//! Error types for remote calls against the ProfitBricks SOAP API.

use std::fmt;

use thiserror::Error;

/// Logical API operation, used to label requests, logs, and errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// `getAllDataCenters`.
    ListDataCenters,
    /// `createStorage`.
    CreateStorage,
    /// `createServer`.
    CreateServer,
    /// `getServer`.
    GetServer,
    /// `deleteServer`.
    DeleteServer,
    /// `deleteStorage`.
    DeleteStorage,
}

impl Operation {
    /// Returns the SOAP operation name.
    #[must_use]
    pub const fn soap_name(self) -> &'static str {
        match self {
            Self::ListDataCenters => "getAllDataCenters",
            Self::CreateStorage => "createStorage",
            Self::CreateServer => "createServer",
            Self::GetServer => "getServer",
            Self::DeleteServer => "deleteServer",
            Self::DeleteStorage => "deleteStorage",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.soap_name())
    }
}

/// Errors raised by the gateway and the response decoder.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the HTTP exchange itself fails.
    #[error("transport failure during {operation}: {message}")]
    Transport {
        /// Operation being invoked.
        operation: Operation,
        /// Underlying cause reported by the HTTP client.
        message: String,
    },
    /// Raised when the request document cannot be serialised.
    #[error("failed to encode {operation} request: {message}")]
    Encode {
        /// Operation being encoded.
        operation: Operation,
        /// Serialiser error message.
        message: String,
    },
    /// Raised when the response is not the XML document we expect.
    #[error("malformed {operation} response: {message}")]
    Decode {
        /// Operation whose response was decoded.
        operation: Operation,
        /// Parser error message.
        message: String,
        /// Raw response body.
        body: String,
    },
    /// Raised when a well-formed response carries no usable result.
    #[error("{operation} returned an empty {field}")]
    EmptyResult {
        /// Operation whose response was decoded.
        operation: Operation,
        /// Mandatory field that was absent or blank.
        field: &'static str,
        /// Raw response body.
        body: String,
    },
    /// Raised when the API answers with a SOAP fault.
    #[error("{operation} failed with fault {code}: {message}")]
    Fault {
        /// Operation whose response was decoded.
        operation: Operation,
        /// `faultcode` reported by the API.
        code: String,
        /// `faultstring` reported by the API.
        message: String,
        /// Raw response body.
        body: String,
    },
}

impl ApiError {
    /// Returns the raw response body when the error carries one.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Decode { body, .. } | Self::EmptyResult { body, .. } | Self::Fault { body, .. } => {
                Some(body.as_str())
            }
            Self::Transport { .. } | Self::Encode { .. } => None,
        }
    }

    /// Returns the operation the error relates to.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Transport { operation, .. }
            | Self::Encode { operation, .. }
            | Self::Decode { operation, .. }
            | Self::EmptyResult { operation, .. }
            | Self::Fault { operation, .. } => *operation,
        }
    }
}
