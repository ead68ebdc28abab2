//! Binary entry point for the `vastlaunch` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use vastlaunch::config::{ConfigError, LaunchConfig, LaunchOverrides};
use vastlaunch::logging::{LoggingError, init_logging};
use vastlaunch::marketplace::Marketplace;
use vastlaunch::workflow::{LaunchOutcome, LaunchWorkflow, WorkflowError};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("launch failed: {0}")]
    Workflow(#[from] WorkflowError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let (log_level, overrides) = split_cli(cli);
    init_logging(log_level.as_deref())?;

    let config = LaunchConfig::load_without_cli_args()?.with_overrides(overrides);
    let marketplace = Marketplace::with_process_runner(config.vastai_bin.clone());
    let workflow = LaunchWorkflow::new(config, marketplace);

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    match workflow.run(&mut input, &mut output).await? {
        LaunchOutcome::Launched(report) => {
            tracing::info!(instance = %report.instance_id, "launch complete");
        }
        LaunchOutcome::Cancelled => tracing::info!("launch cancelled by operator"),
    }
    Ok(())
}

fn split_cli(cli: Cli) -> (Option<String>, LaunchOverrides) {
    let overrides = LaunchOverrides {
        gpu_name: cli.gpu_name,
        num_gpus: cli.num_gpus,
        min_cpu_ram: cli.min_cpu_ram,
        disk_storage: cli.disk_storage,
        max_dph: cli.max_dph,
        min_cuda_version: cli.min_cuda_version,
        template: cli.template,
        ssh_key_path: cli.ssh_key_path,
        num_ports: cli.num_ports,
        timeout_secs: cli.timeout_secs,
        tag: cli.tag,
        vastai_bin: cli.vastai_bin,
    };
    (cli.log_level, overrides)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "Error: {err}").ok();
}
