//! Shared fixtures for provisioning BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use pbmachine::test_support::{ScriptedGateway, ScriptedRunner};
use pbmachine::{MachineRecord, MachineSettings, PbDriver, ProfitBricksConfig};
use rstest::fixture;
use tempfile::TempDir;

#[derive(Clone, Debug)]
pub struct ProvisionContext {
    pub gateway: ScriptedGateway,
    pub runner: ScriptedRunner,
    pub settings: MachineSettings,
    _store_tmp: Arc<TempDir>,
}

impl ProvisionContext {
    pub fn driver(&self) -> PbDriver<ScriptedGateway, ScriptedRunner> {
        let config = ProfitBricksConfig {
            user: String::from("user"),
            password: String::from("secret"),
            vdc_name: String::from("vdc-test"),
            ram_gb: String::from("2"),
            poll_interval_secs: 1,
            max_poll_attempts: 5,
            ..ProfitBricksConfig::default()
        };
        PbDriver::new(
            self.settings.clone(),
            config,
            self.gateway.clone(),
            self.runner.clone(),
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProvisionOutcome {
    pub record: Option<MachineRecord>,
    pub url: Option<String>,
    pub error: Option<String>,
}

#[fixture]
pub fn provision_context() -> ProvisionContext {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("create store temp directory: {err}"));
    let store_path = Utf8PathBuf::from_path_buf(tmp.path().join("node-1"))
        .unwrap_or_else(|path| panic!("store path should be valid UTF-8: {}", path.display()));
    ProvisionContext {
        gateway: ScriptedGateway::new(),
        runner: ScriptedRunner::new(),
        settings: MachineSettings::new("node-1", store_path),
        _store_tmp: Arc::new(tmp),
    }
}

#[fixture]
pub fn outcome() -> ProvisionOutcome {
    ProvisionOutcome::default()
}
