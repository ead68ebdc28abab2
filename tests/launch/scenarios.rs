//! BDD scenarios for the launch workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LaunchContext, launch_context};

#[scenario(
    path = "tests/features/launch.feature",
    name = "Accepting the cheapest offer launches and reports connection details"
)]
fn scenario_launch_succeeds(launch_context: LaunchContext) {
    let _ = launch_context;
}

#[scenario(
    path = "tests/features/launch.feature",
    name = "Connection details never appear and the instance is destroyed"
)]
fn scenario_launch_cleans_up(launch_context: LaunchContext) {
    let _ = launch_context;
}

#[scenario(
    path = "tests/features/launch.feature",
    name = "Declining every offer creates nothing"
)]
fn scenario_launch_cancelled(launch_context: LaunchContext) {
    let _ = launch_context;
}
