//! Attach a Mosh session to an existing instance.
//!
//! The connector looks up the instance's public networking, starts
//! `mosh-server` over a one-shot SSH session, and returns the `mosh-client`
//! invocation that completes the connection. There is no retry: a missing
//! binding or session key is reported straight away.

use std::borrow::Cow;
use std::ffi::OsString;
use std::process::Command;

use shell_escape::unix::escape;
use thiserror::Error;

use crate::config::ConnectConfig;
use crate::marketplace::{InstanceId, Marketplace, MarketplaceError};
use crate::runner::{CommandRunner, ExitPolicy, RunnerError};

/// Locale passed to `mosh-server` so the remote shell renders UTF-8.
pub const MOSH_LOCALE: &str = "LANG=en_US.UTF-8";

/// Environment variable `mosh-client` reads the session key from.
pub const MOSH_KEY_ENV: &str = "MOSH_KEY";

const CONNECT_MARKER: &str = "MOSH CONNECT";

/// Errors raised while preparing a Mosh session.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConnectError {
    /// Looking up the instance failed.
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    /// The marketplace has no record of the instance.
    #[error("instance {0} was not found")]
    InstanceNotFound(InstanceId),
    /// A required networking detail is absent.
    #[error("instance {instance_id} has no {what}")]
    MissingNetworking {
        /// Instance being connected to.
        instance_id: InstanceId,
        /// Description of the missing detail.
        what: String,
    },
    /// Starting `mosh-server` over SSH failed.
    #[error("failed to start mosh-server: {0}")]
    Server(#[source] RunnerError),
    /// `mosh-server` did not print a session key.
    #[error("mosh-server did not report a session key")]
    MissingSessionKey,
}

/// Ready-to-run `mosh-client` invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MoshClientInvocation {
    /// Client binary.
    pub program: String,
    /// Public IP of the instance.
    pub host: String,
    /// Host-side UDP port mapped to the server's port.
    pub port: u16,
    /// Session key printed by `mosh-server`.
    pub key: String,
}

impl MoshClientInvocation {
    /// Builds the client command with the session key in its environment.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .env(MOSH_KEY_ENV, &self.key)
            .arg(&self.host)
            .arg(self.port.to_string());
        command
    }

    /// Shell rendering of the invocation without the session key.
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{} {} {}",
            escape(Cow::Borrowed(self.program.as_str())),
            escape(Cow::Borrowed(self.host.as_str())),
            self.port
        )
    }
}

/// Prepares Mosh sessions using the configured SSH client.
#[derive(Debug)]
pub struct MoshConnector<R: CommandRunner> {
    config: ConnectConfig,
    marketplace: Marketplace<R>,
    runner: R,
}

impl<R: CommandRunner + Clone> MoshConnector<R> {
    /// Creates a connector that uses `runner` for both `vastai` and `ssh`.
    #[must_use]
    pub fn new(config: ConnectConfig, runner: R) -> Self {
        let marketplace = Marketplace::new(config.vastai_bin.clone(), runner.clone());
        Self {
            config,
            marketplace,
            runner,
        }
    }
}

impl<R: CommandRunner> MoshConnector<R> {
    /// Starts `mosh-server` for `instance_id` and returns the client
    /// invocation for the host port mapped to container port `udp_port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the instance lacks public networking,
    /// SSH fails, or the server prints no session key.
    pub fn prepare(
        &self,
        instance_id: &InstanceId,
        udp_port: u16,
    ) -> Result<MoshClientInvocation, ConnectError> {
        let details = self
            .marketplace
            .show_instance(instance_id)?
            .ok_or_else(|| ConnectError::InstanceNotFound(instance_id.clone()))?;

        let missing = |what: &str| ConnectError::MissingNetworking {
            instance_id: instance_id.clone(),
            what: what.to_owned(),
        };
        let public_ip = details.public_ip().ok_or_else(|| missing("public IP"))?;
        if details.ports.is_empty() {
            return Err(missing("port mappings"));
        }
        let ssh_port = details
            .ssh_host_port()
            .ok_or_else(|| missing("host port for 22/tcp"))?;
        let udp_key = format!("{udp_port}/udp");
        let mosh_port = details
            .host_port(&udp_key)
            .ok_or_else(|| missing(&format!("host port for {udp_key}")))?;

        tracing::info!(
            instance = %instance_id,
            host = public_ip,
            ssh_port,
            mosh_port,
            "starting mosh-server"
        );
        let args = self.build_ssh_args(public_ip, ssh_port, udp_port);
        let stdout = self
            .runner
            .capture(&self.config.ssh_bin, &args, ExitPolicy::Checked)
            .map_err(ConnectError::Server)?;
        let key = parse_session_key(&stdout).ok_or(ConnectError::MissingSessionKey)?;

        Ok(MoshClientInvocation {
            program: self.config.mosh_client_bin.clone(),
            host: public_ip.to_owned(),
            port: mosh_port,
            key: key.to_owned(),
        })
    }

    fn build_ssh_args(&self, public_ip: &str, ssh_port: u16, udp_port: u16) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(ssh_port.to_string())];

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from(format!(
            "{}@{public_ip}",
            self.config.ssh_user
        )));
        args.push(OsString::from(server_command(udp_port)));
        args
    }
}

fn server_command(udp_port: u16) -> String {
    let port = udp_port.to_string();
    ["mosh-server", "new", "-s", "-l", MOSH_LOCALE, "-p", &port]
        .into_iter()
        .map(|part| escape(Cow::Borrowed(part)).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the key from the `MOSH CONNECT <port> <key>` line.
#[must_use]
pub fn parse_session_key(stdout: &str) -> Option<&str> {
    stdout.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(CONNECT_MARKER)?;
        let mut fields = rest.split_whitespace();
        fields.next()?.parse::<u16>().ok()?;
        let key = fields.next()?;
        fields.next().is_none().then_some(key)
    })
}
