//! BDD scenarios for the instance group.

use rstest_bdd_macros::scenario;

use super::test_helpers::{GroupWorld, group_world};

#[scenario(
    path = "tests/features/group.feature",
    name = "Initialise offline with the test token"
)]
fn scenario_offline_init(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Reject an empty configuration"
)]
fn scenario_empty_config(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Refuse to delete a foreign server"
)]
fn scenario_foreign_server(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Collect a failed creation and keep going"
)]
fn scenario_partial_increase(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(path = "tests/features/group.feature", name = "Delete owned servers")]
fn scenario_delete_owned(group_world: GroupWorld) {
    drop(group_world);
}

#[scenario(
    path = "tests/features/group.feature",
    name = "Report states in provider order"
)]
fn scenario_report_states(group_world: GroupWorld) {
    drop(group_world);
}
