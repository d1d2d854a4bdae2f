//! External command execution.
//!
//! Key generation, runtime bootstrap, and remote SSH commands all shell out.
//! They go through [`CommandRunner`] so tests can substitute a scripted
//! runner for real processes.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Converts a non-zero exit into [`ProcessError::CommandFailure`].
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::CommandFailure`] when the command failed.
    pub fn into_success(self, program: &str) -> Result<Self, ProcessError> {
        if self.is_success() {
            return Ok(self);
        }
        let status_text = self
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(ProcessError::CommandFailure {
            program: program.to_owned(),
            status: self.code,
            status_text,
            stderr: self.stderr,
        })
    }
}

/// Errors raised while running external commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    /// Raised when the program cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating-system error message.
        message: String,
    },
    /// Raised when the program outlives its deadline and is killed.
    #[error("{program} did not finish within {seconds} seconds")]
    Timeout {
        /// Program that timed out.
        program: String,
        /// Deadline in seconds.
        seconds: u64,
    },
    /// Raised when the program exits unsuccessfully.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit code, when one was reported.
        status: Option<i32>,
        /// Exit code rendered for display.
        status_text: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when preparing local files for a command fails.
    #[error("failed to prepare {path}: {message}")]
    Io {
        /// Path being prepared.
        path: String,
        /// Operating-system error message.
        message: String,
    },
}

/// Boxed future returned by [`CommandRunner::run`].
pub type CommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, ProcessError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// A non-zero exit is reported through [`CommandOutput::code`], not as an
    /// error.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a>;
}

/// Real command runner that spawns host processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner {
    timeout: Option<Duration>,
}

impl ProcessCommandRunner {
    /// Creates a runner without a deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Kills commands that run longer than `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        Box::pin(async move {
            debug!(program, args = args.len(), "spawning command");
            let mut command = Command::new(program);
            command.args(args).stdin(Stdio::null()).kill_on_drop(true);
            let child = command.output();

            let output = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                    ProcessError::Timeout {
                        program: program.to_owned(),
                        seconds: limit.as_secs(),
                    }
                })?,
                None => child.await,
            }
            .map_err(|err| ProcessError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
