//! Connection descriptors derived from the marketplace responses.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Local port forwarded to the notebook server in rendered SSH commands.
pub const NOTEBOOK_FORWARD: &str = "8080:localhost:8080";

static SSH_URI: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^ssh://([^@\s]+)@([^:\s]+):([0-9]+)$"));

/// Errors raised while deriving connection details.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConnectionError {
    /// Raised when the connection URI does not match `ssh://user@host:port`.
    #[error("could not parse SSH URI '{0}' (expected ssh://user@host:port)")]
    MalformedUri(String),
    /// Raised when the URI port is outside the valid TCP range.
    #[error("SSH URI port {0} is out of range")]
    PortOutOfRange(String),
    /// Raised when the URI pattern itself failed to compile.
    #[error("SSH URI pattern unavailable: {0}")]
    Pattern(String),
}

/// SSH target parsed from the URI issued by `vastai ssh-url`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshEndpoint {
    /// Login user.
    pub user: String,
    /// Proxy or direct host name.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl SshEndpoint {
    /// Parses `ssh://<user>@<host>:<port>`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MalformedUri`] when the text does not have
    /// exactly that shape, and [`ConnectionError::PortOutOfRange`] for ports
    /// above 65535.
    pub fn parse(uri: &str) -> Result<Self, ConnectionError> {
        let pattern = SSH_URI
            .as_ref()
            .map_err(|err| ConnectionError::Pattern(err.to_string()))?;
        let trimmed = uri.trim();
        let captures = pattern
            .captures(trimmed)
            .ok_or_else(|| ConnectionError::MalformedUri(trimmed.to_owned()))?;

        let group = |index: usize| {
            captures
                .get(index)
                .map(|found| found.as_str().to_owned())
                .ok_or_else(|| ConnectionError::MalformedUri(trimmed.to_owned()))
        };
        let user = group(1)?;
        let host = group(2)?;
        let port_text = group(3)?;
        let port = port_text
            .parse()
            .map_err(|_| ConnectionError::PortOutOfRange(port_text.clone()))?;

        Ok(Self { user, host, port })
    }

    /// Renders the `ssh` invocation, forwarding the notebook port.
    #[must_use]
    pub fn command(&self) -> String {
        ssh_command(&self.user, &self.host, self.port)
    }
}

impl fmt::Display for SshEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssh://{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Public IP and mapped SSH port read from the instance's port table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirectEndpoint {
    /// Public IP address of the host machine.
    pub public_ip: String,
    /// Host-side port bound to the container's `22/tcp`.
    pub ssh_port: u16,
}

impl DirectEndpoint {
    /// Renders the `ssh` invocation for `user`.
    #[must_use]
    pub fn command(&self, user: &str) -> String {
        ssh_command(user, &self.public_ip, self.ssh_port)
    }
}

fn ssh_command(user: &str, host: &str, port: u16) -> String {
    format!("ssh -p {port} {user}@{host} -L {NOTEBOOK_FORWARD}")
}
