//! Mosh connector for instances started by `vastlaunch`.
//!
//! Starts `mosh-server` on the instance over SSH, then replaces this process
//! with `mosh-client` so the terminal belongs to the session.

use std::io::{self, Write};
use std::process::{self, Command};

use clap::Parser;
use thiserror::Error;

use vastlaunch::config::{ConfigError, ConnectConfig};
use vastlaunch::logging::{LoggingError, init_logging};
use vastlaunch::marketplace::InstanceId;
use vastlaunch::mosh::{ConnectError, MoshConnector};
use vastlaunch::runner::ProcessCommandRunner;

#[derive(Debug, Parser)]
#[command(
    name = "vastlaunch-mosh",
    about = "Open a Mosh session on a running Vast.ai instance"
)]
struct Cli {
    /// Instance to connect to.
    #[arg(long, value_name = "ID")]
    instance_id: String,
    /// Container UDP port for `mosh-server`; defaults to the configured port.
    #[arg(long, value_name = "PORT")]
    port_udp: Option<u16>,
    /// Path to the `vastai` executable.
    #[arg(long, value_name = "PATH")]
    vastai_bin: Option<String>,
    /// Log filter, for example `debug`.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid instance id '{0}'")]
    InstanceId(String),
    #[error("{0}")]
    Connect(#[from] ConnectError),
    #[error("failed to run mosh-client: {0}")]
    Client(#[source] io::Error),
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match connect(cli) {
        Ok(code) => code,
        Err(err) => {
            writeln!(io::stderr(), "Error: {err}").ok();
            1
        }
    };
    process::exit(exit_code);
}

fn connect(cli: Cli) -> Result<i32, CliError> {
    init_logging(cli.log_level.as_deref())?;

    let mut config = ConnectConfig::load_without_cli_args()?;
    if let Some(bin) = cli.vastai_bin {
        config.vastai_bin = bin;
    }
    let udp_port = cli.port_udp.unwrap_or(config.udp_port);
    config.udp_port = udp_port;
    config.validate()?;

    let instance_id =
        InstanceId::parse(&cli.instance_id).ok_or_else(|| CliError::InstanceId(cli.instance_id))?;
    let connector = MoshConnector::new(config, ProcessCommandRunner);
    let invocation = connector.prepare(&instance_id, udp_port)?;

    tracing::info!(command = %invocation.display(), "connecting with mosh-client");
    run_client(&mut invocation.command())
}

#[cfg(unix)]
fn run_client(command: &mut Command) -> Result<i32, CliError> {
    use std::os::unix::process::CommandExt as _;

    // `exec` only returns on failure.
    Err(CliError::Client(command.exec()))
}

#[cfg(not(unix))]
fn run_client(command: &mut Command) -> Result<i32, CliError> {
    let status = command.status().map_err(CliError::Client)?;
    Ok(status.code().unwrap_or(1))
}
