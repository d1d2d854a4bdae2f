//! BDD scenarios for the provisioning workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, ProvisionOutcome, outcome, provision_context};

#[scenario(
    path = "tests/features/provision.feature",
    name = "Provision a machine end to end"
)]
fn scenario_end_to_end(provision_context: ProvisionContext, outcome: ProvisionOutcome) {
    let _ = (provision_context, outcome);
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Reject an unknown data center"
)]
fn scenario_unknown_data_center(provision_context: ProvisionContext, outcome: ProvisionOutcome) {
    let _ = (provision_context, outcome);
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Roll back after a bootstrap failure"
)]
fn scenario_bootstrap_rollback(provision_context: ProvisionContext, outcome: ProvisionOutcome) {
    let _ = (provision_context, outcome);
}
