//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::api::{ApiCall, ApiError, ApiFuture, ApiGateway, Credentials, Operation};
use crate::process::{CommandFuture, CommandOutput, CommandRunner, ProcessError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Clones share the same script, so a test can keep one handle for
/// assertions while the code under test owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, ProcessError>>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }));
    }

    /// Pushes a runner error such as a spawn failure or timeout.
    pub fn push_error(&self, error: ProcessError) {
        lock(&self.responses).push_back(Err(error));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        let response = lock(&self.responses).pop_front();
        Box::pin(async move {
            response.unwrap_or_else(|| {
                Err(ProcessError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
            })
        })
    }
}

/// A call recorded by [`ScriptedGateway`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedCall {
    /// The call as issued.
    pub call: ApiCall,
    /// User the call was authenticated as.
    pub user: String,
}

#[derive(Debug, Default)]
struct GatewayScript {
    responses: VecDeque<Result<String, String>>,
    calls: Vec<RecordedCall>,
}

/// Scripted gateway that answers calls with queued SOAP bodies in FIFO order.
///
/// Clones share the same script.
#[derive(Clone, Debug, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<GatewayScript>>,
}

impl ScriptedGateway {
    /// Creates a gateway with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response body.
    pub fn push_response(&self, body: impl Into<String>) {
        lock(&self.script).responses.push_back(Ok(body.into()));
    }

    /// Queues a transport failure with `message`.
    pub fn push_transport_failure(&self, message: impl Into<String>) {
        lock(&self.script).responses.push_back(Err(message.into()));
    }

    /// Returns every call issued so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        lock(&self.script)
            .calls
            .iter()
            .map(|recorded| recorded.call.clone())
            .collect()
    }

    /// Returns the operation of every call issued so far.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        lock(&self.script)
            .calls
            .iter()
            .map(|recorded| recorded.call.operation())
            .collect()
    }

    /// Returns the user of every call issued so far.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        lock(&self.script)
            .calls
            .iter()
            .map(|recorded| recorded.user.clone())
            .collect()
    }

    /// Counts the calls issued for `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        lock(&self.script)
            .calls
            .iter()
            .filter(|recorded| recorded.call.operation() == operation)
            .count()
    }
}

impl ApiGateway for ScriptedGateway {
    fn invoke<'a>(
        &'a self,
        call: &'a ApiCall,
        credentials: &'a Credentials,
    ) -> ApiFuture<'a, String> {
        let operation = call.operation();
        let response = {
            let mut script = lock(&self.script);
            script.calls.push(RecordedCall {
                call: call.clone(),
                user: credentials.user.clone(),
            });
            script.responses.pop_front()
        };
        Box::pin(async move {
            call.to_xml()?;
            match response {
                Some(Ok(body)) => Ok(body),
                Some(Err(message)) => Err(ApiError::Transport { operation, message }),
                None => Err(ApiError::Transport {
                    operation,
                    message: String::from("no scripted response available"),
                }),
            }
        })
    }
}

/// Wraps `returns` in a `<operation>Response` SOAP envelope.
#[must_use]
pub fn soap_response(operation: &str, returns: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">"#,
            "<S:Body>",
            r#"<ns2:{operation}Response xmlns:ns2="http://ws.api.profitbricks.com/">"#,
            "{returns}",
            "</ns2:{operation}Response>",
            "</S:Body></S:Envelope>"
        ),
        operation = operation,
        returns = returns
    )
}

/// `getAllDataCenters` response listing `(id, name)` pairs.
#[must_use]
pub fn data_centers_response(centers: &[(&str, &str)]) -> String {
    let returns: String = centers
        .iter()
        .map(|(id, name)| {
            format!(
                concat!(
                    "<return><dataCenterId>{id}</dataCenterId>",
                    "<dataCenterName>{name}</dataCenterName>",
                    "<dataCenterVersion>1</dataCenterVersion>",
                    "<provisioningState>AVAILABLE</provisioningState></return>"
                ),
                id = id,
                name = name
            )
        })
        .collect();
    soap_response("getAllDataCenters", &returns)
}

/// `createStorage` response carrying `storage_id`.
#[must_use]
pub fn storage_created_response(storage_id: &str) -> String {
    soap_response(
        "createStorage",
        &format!("<return><requestId>req-1</requestId><storageId>{storage_id}</storageId></return>"),
    )
}

/// `createServer` response carrying `server_id`.
#[must_use]
pub fn server_created_response(server_id: &str) -> String {
    soap_response(
        "createServer",
        &format!("<return><requestId>req-1</requestId><serverId>{server_id}</serverId></return>"),
    )
}

/// `getServer` response with `state` and one NIC carrying `ips`.
#[must_use]
pub fn server_status_response(server_id: &str, state: &str, ips: &[&str]) -> String {
    let ip_elements: String = ips.iter().map(|ip| format!("<ips>{ip}</ips>")).collect();
    soap_response(
        "getServer",
        &format!(
            concat!(
                "<return><serverId>{server_id}</serverId>",
                "<serverName>node</serverName>",
                "<virtualMachineState>{state}</virtualMachineState>",
                "<provisioningState>AVAILABLE</provisioningState>",
                "<nics><nicId>nic-1</nicId>{ips}</nics></return>"
            ),
            server_id = server_id,
            state = state,
            ips = ip_elements
        ),
    )
}

/// Acknowledgement for a delete call named `operation`.
#[must_use]
pub fn delete_response(operation: &str) -> String {
    soap_response(operation, "<return><requestId>req-del</requestId></return>")
}

/// SOAP fault envelope.
#[must_use]
pub fn fault_response(code: &str, message: &str) -> String {
    format!(
        concat!(
            r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">"#,
            "<S:Body><S:Fault><faultcode>{code}</faultcode>",
            "<faultstring>{message}</faultstring></S:Fault></S:Body></S:Envelope>"
        ),
        code = code,
        message = message
    )
}

static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Overrides environment variables for one test and restores them on drop.
///
/// Guards are serialised, so tests that read the environment never observe
/// each other's overrides.
pub struct EnvGuard {
    saved: Vec<(&'static str, Option<OsString>)>,
    _lock: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Applies `pairs` in order once the previous guard has been dropped.
    pub async fn set_vars(pairs: &[(&'static str, &str)]) -> Self {
        let lock = ENV_LOCK.lock().await;
        let saved = pairs
            .iter()
            .map(|&(key, value)| {
                let old = env::var_os(key);
                // SAFETY: every writer holds `ENV_LOCK`.
                unsafe { env::set_var(key, value) };
                (key, old)
            })
            .collect();
        Self { saved, _lock: lock }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        while let Some((key, old)) = self.saved.pop() {
            // SAFETY: `_lock` is still held here.
            unsafe {
                match old {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
