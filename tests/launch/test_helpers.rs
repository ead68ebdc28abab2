//! Shared fixtures for launch BDD scenarios.

use std::time::Duration;

use rstest::fixture;
use vastlaunch::config::LaunchConfig;
use vastlaunch::marketplace::{DEFAULT_VASTAI_BIN, Marketplace};
use vastlaunch::provision::{LaunchReport, URI_MAX_ATTEMPTS};
use vastlaunch::retry::RetryPolicy;
use vastlaunch::test_support::ScriptedRunner;
use vastlaunch::workflow::LaunchWorkflow;

/// Key path that never exists, so the key step is skipped.
pub const MISSING_KEY_PATH: &str = "/nonexistent/vastlaunch/id_ed25519.pub";

#[derive(Clone, Debug)]
pub enum LaunchResult {
    Launched(LaunchReport),
    Cancelled,
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct LaunchContext {
    pub runner: ScriptedRunner,
    pub ssh_key_path: String,
    pub outcome: Option<LaunchResult>,
}

#[fixture]
pub fn launch_context() -> LaunchContext {
    LaunchContext {
        runner: ScriptedRunner::new(),
        ssh_key_path: String::from(MISSING_KEY_PATH),
        outcome: None,
    }
}

pub fn build_workflow(context: &LaunchContext) -> LaunchWorkflow<ScriptedRunner> {
    let config = LaunchConfig {
        vastai_bin: String::from(DEFAULT_VASTAI_BIN),
        gpu_name: String::from("RTX_3060"),
        num_gpus: 1,
        min_cpu_ram: 16,
        disk_storage: 16,
        max_dph: 0.2,
        min_cuda_version: 12.8,
        template: String::from("vastai/pytorch:cuda-12.8.1-auto"),
        ssh_key_path: context.ssh_key_path.clone(),
        num_ports: 1,
        timeout_secs: 240,
        tag: String::from("Launched_GPU_Instance"),
    };

    LaunchWorkflow::new(
        config,
        Marketplace::new(DEFAULT_VASTAI_BIN, context.runner.clone()),
    )
    .with_retry_policies(
        RetryPolicy::attempts(URI_MAX_ATTEMPTS, Duration::ZERO),
        RetryPolicy::attempts(3, Duration::ZERO),
    )
}
