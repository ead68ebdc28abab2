//! BDD step definitions for the launch workflow.

use std::io::Cursor;

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use vastlaunch::test_support::{json_instance, json_offers};
use vastlaunch::workflow::LaunchOutcome;

use super::test_helpers::{LaunchContext, LaunchResult, MISSING_KEY_PATH, build_workflow};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("the marketplace lists offer {offer_id:u64} for \"{gpu_name}\"")]
fn marketplace_lists_offer(
    launch_context: LaunchContext,
    offer_id: u64,
    gpu_name: String,
) -> LaunchContext {
    launch_context
        .runner
        .push_stdout(json_offers(&[(offer_id, gpu_name.trim(), 0.09)]));
    launch_context
}

#[given("instance creation returns contract \"{contract}\"")]
fn creation_returns_contract(launch_context: LaunchContext, contract: String) -> LaunchContext {
    launch_context
        .runner
        .push_stdout(format!("{{\"success\": true, \"new_contract\": \"{contract}\"}}"));
    launch_context
}

#[given("the connection URI \"{uri}\" appears after {empty:u32} empty polls")]
fn uri_appears_after(launch_context: LaunchContext, uri: String, empty: u32) -> LaunchContext {
    for _ in 0..empty {
        launch_context.runner.push_stdout("");
    }
    launch_context.runner.push_stdout(uri);
    launch_context
}

#[given("the connection URI never appears")]
fn uri_never_appears(launch_context: LaunchContext) -> LaunchContext {
    for _ in 0..6 {
        launch_context.runner.push_stdout("");
    }
    launch_context
}

#[given("the instance reports public IP \"{ip}\" with SSH port {port:u16}")]
fn instance_reports_networking(launch_context: LaunchContext, ip: String, port: u16) -> LaunchContext {
    launch_context
        .runner
        .push_stdout(json_instance(Some(ip.as_str()), Some(port), None));
    launch_context
}

#[given("no public key exists locally")]
fn no_public_key(mut launch_context: LaunchContext) -> LaunchContext {
    launch_context.ssh_key_path = String::from(MISSING_KEY_PATH);
    launch_context
}

#[given("destroying the instance succeeds")]
fn destroy_succeeds(launch_context: LaunchContext) -> LaunchContext {
    launch_context.runner.push_success();
    launch_context
}

#[when("the operator answers \"{answer}\"")]
fn operator_answers(
    mut launch_context: LaunchContext,
    answer: String,
) -> Result<LaunchContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let workflow = build_workflow(&launch_context);
    let mut input = Cursor::new(format!("{answer}\n"));
    let mut output = Vec::new();

    let result = runtime.block_on(workflow.run(&mut input, &mut output));
    launch_context.outcome = Some(match result {
        Ok(LaunchOutcome::Launched(report)) => LaunchResult::Launched(report),
        Ok(LaunchOutcome::Cancelled) => LaunchResult::Cancelled,
        Err(err) => LaunchResult::Failure(err.to_string()),
    });
    Ok(launch_context)
}

fn outcome(launch_context: &LaunchContext) -> Result<&LaunchResult, StepError> {
    launch_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing outcome")))
}

#[then("the launch succeeds for instance \"{instance_id}\"")]
fn launch_succeeds(launch_context: &LaunchContext, instance_id: String) -> Result<(), StepError> {
    match outcome(launch_context)? {
        LaunchResult::Launched(report) if report.instance_id.as_str() == instance_id => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected launch of {instance_id}, got {other:?}"
        ))),
    }
}

#[then("the connect command is \"{command}\"")]
fn connect_command_is(launch_context: &LaunchContext, command: String) -> Result<(), StepError> {
    let LaunchResult::Launched(report) = outcome(launch_context)? else {
        return Err(StepError::Assertion(String::from("expected a launch")));
    };
    let actual = report.endpoint.command();
    if actual == command {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected `{command}`, got `{actual}`"
        )))
    }
}

#[then("the launch fails mentioning \"{needle}\"")]
fn launch_fails(launch_context: &LaunchContext, needle: String) -> Result<(), StepError> {
    match outcome(launch_context)? {
        LaunchResult::Failure(message) if message.contains(&needle) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure mentioning {needle}, got {other:?}"
        ))),
    }
}

#[then("the launch is cancelled")]
fn launch_cancelled(launch_context: &LaunchContext) -> Result<(), StepError> {
    match outcome(launch_context)? {
        LaunchResult::Cancelled => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected cancellation, got {other:?}"
        ))),
    }
}

fn expect_calls(
    launch_context: &LaunchContext,
    prefix: &[&str],
    expected: usize,
) -> Result<(), StepError> {
    let actual = launch_context.runner.count_calls(prefix);
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected} `{}` calls, got {actual}",
            prefix.join(" ")
        )))
    }
}

#[then("the connection URI was requested {count:usize} times")]
fn uri_requested(launch_context: &LaunchContext, count: usize) -> Result<(), StepError> {
    expect_calls(launch_context, &["ssh-url"], count)
}

#[then("instance \"{instance_id}\" was destroyed exactly once")]
fn destroyed_once(launch_context: &LaunchContext, instance_id: String) -> Result<(), StepError> {
    expect_calls(launch_context, &["destroy", "instance", instance_id.as_str()], 1)
}

#[then("no destroy command was issued")]
fn no_destroy(launch_context: &LaunchContext) -> Result<(), StepError> {
    expect_calls(launch_context, &["destroy"], 0)
}

#[then("no instance was created")]
fn no_create(launch_context: &LaunchContext) -> Result<(), StepError> {
    expect_calls(launch_context, &["create"], 0)
}
