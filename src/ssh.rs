//! SSH key management and remote command execution.

use std::ffi::OsString;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;
use tracing::{debug, info};

use crate::config::ProfitBricksConfig;
use crate::process::{CommandOutput, CommandRunner, ProcessError};

/// Default remote SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// File name of the private key inside the store directory.
pub const KEY_FILE_NAME: &str = "id_rsa";

/// Paths of a generated key pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPair {
    /// Private key file.
    pub private_key: Utf8PathBuf,
    /// Public key file, `<private>.pub`.
    pub public_key: Utf8PathBuf,
}

/// Settings for the `ssh` and `ssh-keygen` invocations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshSettings {
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Path to the `ssh-keygen` executable.
    pub keygen_bin: String,
    /// Remote user.
    pub user: String,
    /// Remote port.
    pub port: u16,
    /// Directory holding the machine's key pair.
    pub store_path: Utf8PathBuf,
}

impl SshSettings {
    /// Derives settings from configuration and the machine store directory.
    #[must_use]
    pub fn from_config(config: &ProfitBricksConfig, store_path: &Utf8Path) -> Self {
        Self {
            ssh_bin: config.ssh_bin.clone(),
            keygen_bin: config.ssh_keygen_bin.clone(),
            user: config.ssh_user.clone(),
            port: config.ssh_port,
            store_path: store_path.to_owned(),
        }
    }

    /// Path of the private key file.
    #[must_use]
    pub fn private_key_path(&self) -> Utf8PathBuf {
        self.store_path.join(KEY_FILE_NAME)
    }
}

/// A fully rendered `ssh` invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshCommand {
    /// Program to run.
    pub program: String,
    /// Arguments, ending with the destination and the remote command.
    pub args: Vec<OsString>,
}

impl SshCommand {
    /// Renders the invocation as a shell-escaped command line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts = vec![escape(self.program.as_str().into()).into_owned()];
        parts.extend(
            self.args
                .iter()
                .map(|arg| escape(arg.to_string_lossy()).into_owned()),
        );
        parts.join(" ")
    }
}

/// Generates keys and runs commands on the provisioned host.
#[derive(Clone, Debug)]
pub struct SshClient<R> {
    settings: SshSettings,
    runner: R,
}

impl<R: CommandRunner> SshClient<R> {
    /// Creates a client.
    #[must_use]
    pub const fn new(settings: SshSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &SshSettings {
        &self.settings
    }

    /// Returns the key pair paths, whether or not the files exist yet.
    #[must_use]
    pub fn key_pair(&self) -> KeyPair {
        let private_key = self.settings.private_key_path();
        let public_key = Utf8PathBuf::from(format!("{private_key}.pub"));
        KeyPair {
            private_key,
            public_key,
        }
    }

    /// Ensures an RSA key pair exists in the store directory.
    ///
    /// An existing private key is reused untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Io`] when the store directory cannot be
    /// created, and the runner's errors when `ssh-keygen` fails.
    pub async fn generate_key_pair(&self) -> Result<KeyPair, ProcessError> {
        let key_pair = self.key_pair();
        let store = &self.settings.store_path;
        Dir::create_ambient_dir_all(store, ambient_authority()).map_err(|err| io_error(store, &err))?;
        let dir = Dir::open_ambient_dir(store, ambient_authority())
            .map_err(|err| io_error(store, &err))?;
        if dir.exists(KEY_FILE_NAME) {
            debug!(path = %key_pair.private_key, "reusing existing SSH key");
            return Ok(key_pair);
        }

        let args = [
            "-t",
            "rsa",
            "-b",
            "2048",
            "-N",
            "",
            "-q",
            "-f",
            key_pair.private_key.as_str(),
        ]
        .map(OsString::from);
        self.runner
            .run(&self.settings.keygen_bin, &args)
            .await?
            .into_success(&self.settings.keygen_bin)?;
        info!(path = %key_pair.private_key, "generated SSH key pair");
        Ok(key_pair)
    }

    /// Builds the `ssh` invocation that runs `remote_command` on `host`.
    #[must_use]
    pub fn command(&self, host: IpAddr, remote_command: &str) -> SshCommand {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.settings.port.to_string()),
            OsString::from("-i"),
            OsString::from(self.settings.private_key_path().as_str()),
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
            OsString::from("-o"),
            OsString::from("UserKnownHostsFile=/dev/null"),
            OsString::from("-o"),
            OsString::from("LogLevel=quiet"),
            OsString::from(format!("{}@{host}", self.settings.user)),
        ];
        if !remote_command.is_empty() {
            args.push(OsString::from(remote_command));
        }
        SshCommand {
            program: self.settings.ssh_bin.clone(),
            args,
        }
    }

    /// Runs `remote_command` on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::CommandFailure`] when the remote command exits
    /// non-zero, and spawn or timeout errors from the runner.
    pub async fn run(&self, host: IpAddr, remote_command: &str) -> Result<CommandOutput, ProcessError> {
        let command = self.command(host, remote_command);
        debug!(%host, remote_command, "running remote command");
        self.runner
            .run(&command.program, &command.args)
            .await?
            .into_success(&command.program)
    }
}

fn io_error(path: &Utf8Path, err: &std::io::Error) -> ProcessError {
    ProcessError::Io {
        path: path.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::ScriptedRunner;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

    fn settings(store_path: &Utf8Path) -> SshSettings {
        SshSettings::from_config(&ProfitBricksConfig::default(), store_path)
    }

    #[fixture]
    fn store() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("machine")).expect("utf8 path");
        (tmp, path)
    }

    #[rstest]
    fn command_targets_root_on_port_22_with_the_store_key() {
        let client = SshClient::new(settings(Utf8Path::new("/store")), ScriptedRunner::new());
        let command = client.command(HOST, "sudo service docker start");

        assert_eq!(command.program, "ssh");
        let args: Vec<String> = command
            .args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[..4], ["-p", "22", "-i", "/store/id_rsa"]);
        assert_eq!(
            args[args.len() - 2..],
            ["root@10.0.0.5", "sudo service docker start"]
        );
        assert!(args.contains(&String::from("BatchMode=yes")), "{args:?}");
    }

    #[rstest]
    fn rendered_command_escapes_the_remote_command() {
        let client = SshClient::new(settings(Utf8Path::new("/store")), ScriptedRunner::new());
        let rendered = client.command(HOST, "echo hi").render();
        assert!(rendered.starts_with("ssh -p 22 -i /store/id_rsa"), "{rendered}");
        assert!(rendered.contains("10.0.0.5"), "{rendered}");
        assert!(rendered.ends_with(" 'echo hi'"), "{rendered}");
    }

    #[rstest]
    #[tokio::test]
    async fn key_generation_runs_ssh_keygen_once(store: (TempDir, Utf8PathBuf)) {
        let (_tmp, path) = store;
        let runner = ScriptedRunner::new();
        runner.push_success();
        let client = SshClient::new(settings(&path), runner.clone());

        let key_pair = client.generate_key_pair().await.expect("keygen");

        assert_eq!(key_pair.private_key, path.join("id_rsa"));
        assert_eq!(key_pair.public_key, path.join("id_rsa.pub"));
        assert!(path.is_dir(), "store directory should be created");
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].command_string(),
            format!("ssh-keygen -t rsa -b 2048 -N  -q -f {path}/id_rsa")
        );
    }

    #[rstest]
    #[tokio::test]
    async fn existing_keys_are_reused(store: (TempDir, Utf8PathBuf)) {
        let (_tmp, path) = store;
        std::fs::create_dir_all(&path).expect("create store");
        std::fs::write(path.join("id_rsa"), "key").expect("write key");
        let runner = ScriptedRunner::new();
        let client = SshClient::new(settings(&path), runner.clone());

        client.generate_key_pair().await.expect("reuse key");

        assert!(runner.invocations().is_empty(), "ssh-keygen should not run");
    }

    #[rstest]
    #[tokio::test]
    async fn keygen_failures_surface_as_command_failures(store: (TempDir, Utf8PathBuf)) {
        let (_tmp, path) = store;
        let runner = ScriptedRunner::new();
        runner.push_failure(1);
        let client = SshClient::new(settings(&path), runner);

        let err = client.generate_key_pair().await.expect_err("keygen fails");
        assert!(
            matches!(err, ProcessError::CommandFailure { status: Some(1), .. }),
            "unexpected error: {err:?}"
        );
    }
}
