//! Tests for the rollback ledger and its use by the orchestrator.

use rstest::rstest;
use tokio_util::sync::CancellationToken;

use super::fixtures::{Harness, harness, request};
use crate::api::{ApiCall, Client, Credentials, Operation, ServerId, StorageId};
use crate::provision::{ProvisionError, RollbackLedger, UndoAction};
use crate::test_support::{ScriptedGateway, delete_response, server_status_response};

#[rstest]
#[tokio::test]
async fn ledger_unwinds_newest_first() {
    let gateway = ScriptedGateway::new();
    gateway.push_response(delete_response("deleteServer"));
    gateway.push_response(delete_response("deleteStorage"));
    let credentials = Credentials::new("user", "secret");
    let api = Client::new(&gateway, &credentials);
    let mut ledger = RollbackLedger::default();
    ledger.push(UndoAction::DeleteStorage(StorageId::new("st-1")));
    ledger.push(UndoAction::DeleteServer(ServerId::new("srv-1")));

    let report = ledger.unwind(&api).await;

    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        gateway.calls(),
        [
            ApiCall::DeleteServer(ServerId::new("srv-1")),
            ApiCall::DeleteStorage(StorageId::new("st-1")),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn failed_undo_actions_do_not_stop_the_rest() {
    let gateway = ScriptedGateway::new();
    gateway.push_transport_failure("connection reset");
    gateway.push_response(delete_response("deleteStorage"));
    let credentials = Credentials::new("user", "secret");
    let api = Client::new(&gateway, &credentials);
    let mut ledger = RollbackLedger::default();
    ledger.push(UndoAction::DeleteStorage(StorageId::new("st-1")));
    ledger.push(UndoAction::DeleteServer(ServerId::new("srv-1")));

    let report = ledger.unwind(&api).await;

    assert_eq!(report.completed, [UndoAction::DeleteStorage(StorageId::new("st-1"))]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, UndoAction::DeleteServer(ServerId::new("srv-1")));
    assert!(report.failed[0].1.contains("connection reset"), "{report:?}");
}

fn script_bootstrap_failure(harness: &Harness) {
    harness.script_until_server("srv-1");
    harness
        .gateway
        .push_response(server_status_response("srv-1", "RUNNING", &["10.0.0.5"]));
    harness.runner.push_success();
    harness.runner.push_output(Some(1), "", "bootstrap exploded");
}

#[rstest]
#[tokio::test]
async fn bootstrap_failure_rolls_back_server_then_storage(harness: Harness) {
    script_bootstrap_failure(&harness);
    harness.gateway.push_response(delete_response("deleteServer"));
    harness.gateway.push_response(delete_response("deleteStorage"));

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("bootstrap failure should abort");

    assert!(
        matches!(err, ProvisionError::Bootstrap { ref message } if message.contains("bootstrap exploded")),
        "{err:?}"
    );
    assert!(err.orphaned().is_empty());
    let calls = harness.gateway.calls();
    assert_eq!(
        calls[calls.len() - 2..],
        [
            ApiCall::DeleteServer(ServerId::new("srv-1")),
            ApiCall::DeleteStorage(StorageId::new("st-1")),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn rollback_failures_keep_the_original_error(harness: Harness) {
    script_bootstrap_failure(&harness);
    harness.gateway.push_transport_failure("gone");
    harness.gateway.push_transport_failure("gone");

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("bootstrap failure should abort");

    assert!(matches!(err.root_cause(), ProvisionError::Bootstrap { .. }), "{err:?}");
    assert_eq!(
        err.orphaned(),
        [
            UndoAction::DeleteServer(ServerId::new("srv-1")),
            UndoAction::DeleteStorage(StorageId::new("st-1")),
        ]
    );
    let message = err.to_string();
    assert!(message.contains("runtime bootstrap failed"), "{message}");
    assert!(message.contains("server srv-1, storage st-1"), "{message}");
    assert_eq!(harness.gateway.count(Operation::DeleteServer), 1);
    assert_eq!(harness.gateway.count(Operation::DeleteStorage), 1);
}

#[rstest]
#[tokio::test]
async fn partial_rollback_reports_only_the_survivors(harness: Harness) {
    script_bootstrap_failure(&harness);
    harness.gateway.push_response(delete_response("deleteServer"));
    harness.gateway.push_transport_failure("gone");

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("bootstrap failure should abort");

    assert_eq!(err.orphaned(), [UndoAction::DeleteStorage(StorageId::new("st-1"))]);
}

#[rstest]
#[tokio::test]
async fn disabled_rollback_leaves_resources_in_place(mut harness: Harness) {
    harness.rollback = false;
    script_bootstrap_failure(&harness);

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("bootstrap failure should abort");

    assert!(matches!(err.root_cause(), ProvisionError::Bootstrap { .. }), "{err:?}");
    assert_eq!(
        err.orphaned(),
        [
            UndoAction::DeleteServer(ServerId::new("srv-1")),
            UndoAction::DeleteStorage(StorageId::new("st-1")),
        ]
    );
    assert_eq!(harness.gateway.count(Operation::DeleteServer), 0);
    assert_eq!(harness.gateway.count(Operation::DeleteStorage), 0);
}

#[rstest]
#[tokio::test]
async fn poll_timeout_rolls_back_created_resources(mut harness: Harness) {
    harness.policy.max_attempts = 2;
    harness.script_until_server("srv-1");
    harness.runner.push_success();
    for _ in 0..2 {
        harness
            .gateway
            .push_response(server_status_response("srv-1", "PROVISIONING", &[]));
    }
    harness.gateway.push_response(delete_response("deleteServer"));
    harness.gateway.push_response(delete_response("deleteStorage"));

    let err = harness
        .provisioner()
        .provision(&request(), &CancellationToken::new())
        .await
        .expect_err("timeout should abort");

    assert!(matches!(err, ProvisionError::ProvisioningTimeout { attempts: 2, .. }), "{err:?}");
    assert!(err.orphaned().is_empty());
    assert_eq!(harness.gateway.count(Operation::DeleteServer), 1);
    assert_eq!(harness.gateway.count(Operation::DeleteStorage), 1);
}
