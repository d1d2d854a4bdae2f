//! BDD step definitions for the provisioning workflow.

use pbmachine::api::{ApiCall, Operation, ServerId, StorageId};
use pbmachine::test_support::{
    data_centers_response, delete_response, server_created_response, server_status_response,
    storage_created_response,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{ProvisionContext, ProvisionOutcome};

#[given("a data center named \"{name}\" with id \"{id}\"")]
fn data_center_named(provision_context: &ProvisionContext, name: String, id: String) {
    provision_context
        .gateway
        .push_response(data_centers_response(&[(id.as_str(), name.as_str())]));
}

#[given("the API creates storage \"{storage}\" and server \"{server}\"")]
fn api_creates_resources(provision_context: &ProvisionContext, storage: String, server: String) {
    provision_context
        .gateway
        .push_response(storage_created_response(&storage));
    provision_context
        .gateway
        .push_response(server_created_response(&server));
}

#[given("the server is provisioning and then runs at \"{address}\"")]
fn server_boots(provision_context: &ProvisionContext, address: String) {
    provision_context
        .gateway
        .push_response(server_status_response("srv-1", "PROVISIONING", &[]));
    provision_context.gateway.push_response(server_status_response(
        "srv-1",
        "RUNNING",
        &[address.as_str()],
    ));
}

#[given("the server runs at \"{address}\"")]
fn server_runs(provision_context: &ProvisionContext, address: String) {
    provision_context.gateway.push_response(server_status_response(
        "srv-1",
        "RUNNING",
        &[address.as_str()],
    ));
}

#[given("ssh keys can be generated")]
fn keys_can_be_generated(provision_context: &ProvisionContext) {
    provision_context.runner.push_success();
}

#[given("the bootstrap container succeeds")]
fn bootstrap_succeeds(provision_context: &ProvisionContext) {
    provision_context.runner.push_success();
}

#[given("the bootstrap container fails with exit code \"{code}\"")]
fn bootstrap_fails(provision_context: &ProvisionContext, code: i32) {
    provision_context.runner.push_failure(code);
}

#[given("the API acknowledges deletes")]
fn api_acknowledges_deletes(provision_context: &ProvisionContext) {
    provision_context
        .gateway
        .push_response(delete_response("deleteServer"));
    provision_context
        .gateway
        .push_response(delete_response("deleteStorage"));
}

#[when("I create the machine")]
fn create_machine(provision_context: &ProvisionContext) -> ProvisionOutcome {
    let runtime =
        Runtime::new().unwrap_or_else(|err| panic!("failed to build tokio runtime: {err}"));
    let mut driver = provision_context.driver();
    let cancel = CancellationToken::new();
    let result = runtime.block_on(async { driver.create(&cancel).await.cloned() });
    match result {
        Ok(record) => ProvisionOutcome {
            record: Some(record),
            url: driver.get_url().ok(),
            error: None,
        },
        Err(err) => ProvisionOutcome {
            record: None,
            url: None,
            error: Some(err.to_string()),
        },
    }
}

#[then("the machine URL is \"{url}\"")]
fn machine_url(outcome: &ProvisionOutcome, url: String) {
    assert_eq!(
        outcome.url.as_deref(),
        Some(url.as_str()),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("the server was polled \"{count}\" times")]
fn server_polled(provision_context: &ProvisionContext, count: usize) {
    assert_eq!(provision_context.gateway.count(Operation::GetServer), count);
}

#[then("the machine record names server \"{server}\"")]
fn record_names_server(outcome: &ProvisionOutcome, server: String) {
    let record = outcome
        .record
        .as_ref()
        .unwrap_or_else(|| panic!("expected a machine record, got {outcome:?}"));
    assert_eq!(record.server_id, Some(ServerId::new(server)));
    assert_eq!(record.storage_id, Some(StorageId::new("st-1")));
}

#[then("provisioning fails mentioning \"{text}\"")]
fn provisioning_fails(outcome: &ProvisionOutcome, text: String) {
    let message = outcome
        .error
        .as_deref()
        .unwrap_or_else(|| panic!("expected provisioning to fail, got {outcome:?}"));
    assert!(message.contains(&text), "{message}");
}

#[then("no storage is created")]
fn no_storage_created(provision_context: &ProvisionContext) {
    assert_eq!(provision_context.gateway.count(Operation::CreateStorage), 0);
}

#[then("the server and then the storage are deleted")]
fn resources_deleted_in_order(provision_context: &ProvisionContext) {
    let deletes: Vec<ApiCall> = provision_context
        .gateway
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call.operation(),
                Operation::DeleteServer | Operation::DeleteStorage
            )
        })
        .collect();
    assert_eq!(
        deletes,
        vec![
            ApiCall::DeleteServer(ServerId::new("srv-1")),
            ApiCall::DeleteStorage(StorageId::new("st-1")),
        ]
    );
}
