//! Unit tests for the provisioning orchestrator.
//!
//! Polling and rollback have their own submodules; this file covers the
//! stage sequence end to end over scripted collaborators.

mod rollback;

use std::net::{IpAddr, Ipv4Addr};

use rstest::rstest;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::api::{ApiCall, Operation, ServerId, StorageId};
use crate::test_support::{
    data_centers_response, server_created_response, server_status_response,
    storage_created_response,
};

use fixtures::{Harness, harness, request};

#[rstest]
#[tokio::test]
async fn provisions_a_machine_after_two_polls(harness: Harness) {
    harness.script_until_server("srv-1");
    harness.gateway.push_response(server_status_response("srv-1", "PROVISIONING", &[]));
    harness
        .gateway
        .push_response(server_status_response("srv-1", "RUNNING", &["10.0.0.5"]));
    harness.runner.push_success();
    harness.runner.push_success();

    let provisioned = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect("provisioning should succeed");

    assert_eq!(provisioned.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
    assert_eq!(provisioned.poll_attempts, 2);
    assert_eq!(provisioned.data_center.id.as_str(), "dc-1");
    assert_eq!(provisioned.storage.id.as_str(), "st-1");
    assert_eq!(provisioned.instance.id.as_str(), "srv-1");
    assert_eq!(provisioned.instance.ram_mb, 2048);
    assert!(provisioned.instance.state.is_running());
    assert_eq!(
        harness.gateway.operations(),
        [
            Operation::ListDataCenters,
            Operation::CreateStorage,
            Operation::CreateServer,
            Operation::GetServer,
            Operation::GetServer,
        ]
    );

    let commands: Vec<String> = harness
        .runner
        .invocations()
        .iter()
        .map(crate::test_support::CommandInvocation::command_string)
        .collect();
    assert_eq!(commands.len(), 2, "keygen then bootstrap: {commands:?}");
    assert!(commands[0].starts_with("ssh-keygen -t rsa -b 2048"), "{commands:?}");
    assert!(
        commands[1].contains("-e HOST_IP=10.0.0.5"),
        "bootstrap should receive the polled address: {commands:?}"
    );
}

#[rstest]
#[tokio::test]
async fn create_calls_carry_the_requested_sizes(harness: Harness) {
    harness.script_until_server("srv-1");
    harness
        .gateway
        .push_response(server_status_response("srv-1", "RUNNING", &["10.0.0.5"]));
    harness.runner.push_success();
    harness.runner.push_success();

    harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect("provisioning should succeed");

    let calls = harness.gateway.calls();
    let Some(ApiCall::CreateStorage(storage)) = calls.get(1) else {
        panic!("second call should create storage: {calls:?}");
    };
    assert_eq!(storage.size_gb, 10);
    assert_eq!(storage.data_center_id.as_str(), "dc-1");
    assert_eq!(storage.image_id, "img-test");
    let Some(ApiCall::CreateServer(server)) = calls.get(2) else {
        panic!("third call should create the server: {calls:?}");
    };
    assert_eq!(server.cores, 2);
    assert_eq!(server.ram_mb, 2048);
    assert_eq!(server.boot_storage_id, StorageId::new("st-1"));
    assert_eq!(server.server_name, "node-1");
    assert!(server.internet_access && server.hot_plug);
}

#[rstest]
#[case::word("lots")]
#[case::zero("0")]
#[tokio::test]
async fn invalid_ram_fails_before_any_remote_call(harness: Harness, #[case] ram_gb: &str) {
    let mut bad = request();
    bad.ram_gb = ram_gb.to_owned();

    let err = harness
        .provisioner()
        .provision(&bad, &CancellationToken::new())
        .await
        .expect_err("invalid RAM should fail");

    assert!(matches!(err, ProvisionError::InvalidConfig(_)), "{err:?}");
    assert!(harness.gateway.calls().is_empty());
    assert!(harness.runner.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn unknown_data_center_lists_the_alternatives(harness: Harness) {
    harness.runner.push_success();
    harness
        .gateway
        .push_response(data_centers_response(&[("dc-1", "other"), ("dc-2", "spare")]));

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("missing data center should fail");

    assert_eq!(
        err,
        ProvisionError::DataCenterNotFound {
            name: String::from("vdc-test"),
            available: vec![String::from("other"), String::from("spare")],
        }
    );
    assert_eq!(harness.gateway.operations(), [Operation::ListDataCenters]);
}

#[rstest]
fn duplicate_data_center_names_are_ambiguous() {
    let centers = vec![
        DataCenter {
            id: "dc-1".into(),
            name: String::from("twin"),
            version: 1,
            provisioning_state: String::new(),
        },
        DataCenter {
            id: "dc-2".into(),
            name: String::from("twin"),
            version: 1,
            provisioning_state: String::new(),
        },
    ];
    let err = resolve_data_center(centers, "twin").expect_err("ambiguous");
    assert_eq!(
        err,
        ProvisionError::AmbiguousDataCenter {
            name: String::from("twin"),
            count: 2,
        }
    );
}

#[rstest]
fn padded_data_center_names_match_exactly() {
    let center = |id: &str, name: &str| DataCenter {
        id: id.into(),
        name: name.to_owned(),
        version: 1,
        provisioning_state: String::new(),
    };
    let centers = vec![center("dc-1", "vdc"), center("dc-2", "vdc ")];
    let request = ProvisionRequest::builder()
        .user("user")
        .password("secret")
        .vdc_name("vdc ")
        .storage_size_gb(10)
        .cores(1)
        .ram_gb("1")
        .machine_name("node-1")
        .build()
        .expect("valid request");

    let resolved = resolve_data_center(centers, &request.vdc_name).expect("exact match");

    assert_eq!(resolved.id.as_str(), "dc-2");
}

#[rstest]
#[tokio::test]
async fn empty_storage_id_is_a_storage_creation_error(harness: Harness) {
    harness.runner.push_success();
    harness
        .gateway
        .push_response(data_centers_response(&[("dc-1", "vdc-test")]));
    let body = storage_created_response("");
    harness.gateway.push_response(body.clone());

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("empty storage id should fail");

    assert!(matches!(err, ProvisionError::StorageCreation { .. }), "{err:?}");
    assert_eq!(err.response_body(), Some(body.as_str()));
    assert_eq!(harness.gateway.count(Operation::DeleteStorage), 0);
}

#[rstest]
#[tokio::test]
async fn empty_server_id_is_a_server_creation_error(harness: Harness) {
    harness.runner.push_success();
    harness
        .gateway
        .push_response(data_centers_response(&[("dc-1", "vdc-test")]));
    harness.gateway.push_response(storage_created_response("st-1"));
    harness.gateway.push_response(server_created_response(""));
    harness
        .gateway
        .push_response(crate::test_support::delete_response("deleteStorage"));

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("empty server id should fail");

    assert!(matches!(err, ProvisionError::ServerCreation { .. }), "{err:?}");
    assert_eq!(
        harness.gateway.calls().last(),
        Some(&ApiCall::DeleteStorage(StorageId::new("st-1")))
    );
}

#[rstest]
#[tokio::test]
async fn keygen_failure_stops_before_the_api(harness: Harness) {
    harness.runner.push_failure(1);

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("keygen failure should abort");

    assert!(matches!(err, ProvisionError::KeyGen { .. }), "{err:?}");
    assert!(harness.gateway.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn cancelled_token_aborts_before_the_first_stage(harness: Harness) {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness
        .provisioner()
        .provision(&request(), &cancel)
        .await
        .expect_err("cancelled run should abort");

    assert_eq!(
        err,
        ProvisionError::Cancelled {
            stage: Stage::Validate
        }
    );
    assert!(harness.runner.invocations().is_empty());
}

#[rstest]
fn stages_render_as_kebab_case() {
    assert_eq!(Stage::PollUntilRunning.to_string(), "poll-until-running");
    assert_eq!(Stage::KeyGen.to_string(), "key-gen");
}

#[rstest]
fn api_errors_expose_their_body_through_provision_errors() {
    let err = ProvisionError::from(crate::api::ApiError::Decode {
        operation: Operation::GetServer,
        message: String::from("bad"),
        body: String::from("<x/>"),
    });
    assert_eq!(err.response_body(), Some("<x/>"));
    let timeout = ProvisionError::ProvisioningTimeout {
        server_id: ServerId::new("srv-1"),
        attempts: 3,
        last_state: crate::api::VirtualMachineState::Provisioning,
    };
    assert_eq!(timeout.response_body(), None);
    assert!(timeout.to_string().contains("after 3 polls"), "{timeout}");
}
