//! HTTP transport for SOAP calls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::envelope::ApiCall;
use super::error::ApiError;

/// Default ProfitBricks SOAP endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.profitbricks.com/1.3";

/// Default timeout applied to a single HTTP exchange.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

/// Boxed future returned by [`ApiGateway`] implementations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Account credentials sent with every call using HTTP basic auth.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Account user name.
    pub user: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Builds a credential pair.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sends one encoded call and returns the raw response body.
///
/// Implementations must not interpret the HTTP status; fault detection
/// happens when the body is decoded.
pub trait ApiGateway {
    /// Performs `call` authenticated with `credentials`.
    fn invoke<'a>(&'a self, call: &'a ApiCall, credentials: &'a Credentials)
    -> ApiFuture<'a, String>;
}

/// [`ApiGateway`] that posts envelopes over HTTPS with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGateway {
    /// Creates a gateway for `endpoint` with a per-request `timeout`.
    ///
    /// If the HTTP client cannot be built with that timeout, a shared client
    /// without one is used and a warning is logged.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(
                    error = %err,
                    timeout_secs = timeout.as_secs(),
                    "failed to build HTTP client; requests will not time out"
                );
                SHARED_CLIENT.clone()
            });
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_HTTP_TIMEOUT)
    }
}

impl ApiGateway for HttpGateway {
    fn invoke<'a>(
        &'a self,
        call: &'a ApiCall,
        credentials: &'a Credentials,
    ) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let operation = call.operation();
            let payload = call.to_xml()?;
            debug!(%operation, endpoint = %self.endpoint, "sending SOAP request");

            let transport = |err: reqwest::Error| ApiError::Transport {
                operation,
                message: err.to_string(),
            };
            let response = self
                .client
                .post(&self.endpoint)
                .basic_auth(&credentials.user, Some(&credentials.password))
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header("SOAPAction", operation.soap_name())
                .body(payload)
                .send()
                .await
                .map_err(transport)?;
            let status = response.status();
            let body = response.text().await.map_err(transport)?;
            debug!(%operation, %status, bytes = body.len(), "received SOAP response");
            Ok(body)
        })
    }
}
