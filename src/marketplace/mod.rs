//! Thin client for the Vast.ai marketplace CLI.
//!
//! Each method maps onto exactly one `vastai` subcommand. Commands that must
//! succeed are run with [`ExitPolicy::Checked`]; commands whose failure the
//! caller tolerates (`ssh-url` while booting, `attach ssh`, `destroy`) return
//! the raw output instead.

use std::ffi::OsString;

use thiserror::Error;

use crate::manifest::{EnvironmentManifest, ONSTART_SCRIPT};
use crate::runner::{CommandOutput, CommandRunner, ExitPolicy, ProcessCommandRunner, RunnerError};

mod query;
mod types;

pub use query::OfferQuery;
pub use types::{InstanceDetails, InstanceId, NULL_SENTINEL, Offer, PortBinding};

use types::CreateResponse;

/// Default `vastai` binary name.
pub const DEFAULT_VASTAI_BIN: &str = "vastai";

/// Errors returned by the marketplace client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MarketplaceError {
    /// Raised when search constraints are unusable.
    #[error("invalid offer query: {0}")]
    InvalidQuery(String),
    /// Raised when the search returns nothing usable.
    #[error("no suitable offer found matching all criteria for {gpu_name}")]
    NoOffers {
        /// GPU model that was searched for.
        gpu_name: String,
    },
    /// Raised when `create instance` does not yield a contract id.
    #[error("instance ID was not returned by vastai create (got {raw})")]
    MissingInstanceId {
        /// Raw `new_contract` value, or `null`.
        raw: String,
    },
    /// Raised when JSON output from the CLI cannot be parsed.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Subcommand whose output was being parsed.
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the CLI cannot be run or exits with a failure.
    #[error(transparent)]
    Command(#[from] RunnerError),
}

/// Parameters for `vastai create instance`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateRequest {
    /// Offer to rent.
    pub offer_id: u64,
    /// Docker image or template tag.
    pub image: String,
    /// Disk size in GB.
    pub disk_gb: u32,
    /// Environment and port manifest.
    pub manifest: EnvironmentManifest,
    /// Shell script run on boot.
    pub onstart: String,
    /// Label shown in the Vast.ai console.
    pub label: String,
}

impl CreateRequest {
    /// Builds a request using the standard manifest and start script.
    #[must_use]
    pub fn standard(
        offer_id: u64,
        image: impl Into<String>,
        disk_gb: u32,
        udp_ports: u16,
        label: impl Into<String>,
    ) -> Self {
        Self {
            offer_id,
            image: image.into(),
            disk_gb,
            manifest: EnvironmentManifest::standard(udp_ports),
            onstart: ONSTART_SCRIPT.to_owned(),
            label: label.into(),
        }
    }
}

/// Marketplace client that shells out to `vastai`.
#[derive(Clone, Debug)]
pub struct Marketplace<R: CommandRunner> {
    vastai_bin: String,
    runner: R,
}

impl Marketplace<ProcessCommandRunner> {
    /// Creates a client wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(vastai_bin: impl Into<String>) -> Self {
        Self::new(vastai_bin, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> Marketplace<R> {
    /// Creates a client using the provided binary path and runner.
    #[must_use]
    pub fn new(vastai_bin: impl Into<String>, runner: R) -> Self {
        Self {
            vastai_bin: vastai_bin.into(),
            runner,
        }
    }

    /// Returns the configured `vastai` binary.
    #[must_use]
    pub fn vastai_bin(&self) -> &str {
        &self.vastai_bin
    }

    /// Searches for offers matching `query`, cheapest first.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::NoOffers`] when the list is empty or the
    /// cheapest record lacks an id, [`MarketplaceError::Parse`] for malformed
    /// JSON, and [`MarketplaceError::Command`] when the CLI fails.
    pub fn search_offers(&self, query: &OfferQuery) -> Result<Vec<Offer>, MarketplaceError> {
        query.validate()?;
        let args = os_args([
            "search",
            "offers",
            &query.filter_expression(),
            "--order",
            "dph_total",
            "--raw",
        ]);
        let stdout = self.capture_checked(&args)?;
        let offers: Vec<Offer> = parse_json(&stdout, "search offers")?;

        if offers.first().and_then(|offer| offer.id).is_none() {
            return Err(MarketplaceError::NoOffers {
                gpu_name: query.gpu_name.clone(),
            });
        }
        Ok(offers)
    }

    /// Rents `request.offer_id` and returns the new instance id.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::MissingInstanceId`] when the response
    /// carries no usable contract id.
    pub fn create_instance(&self, request: &CreateRequest) -> Result<InstanceId, MarketplaceError> {
        let args = os_args([
            "create",
            "instance",
            &request.offer_id.to_string(),
            "--image",
            &request.image,
            "--disk",
            &request.disk_gb.to_string(),
            "--env",
            &request.manifest.render(),
            "--onstart-cmd",
            &request.onstart,
            "--jupyter",
            "--ssh",
            "--direct",
            "--label",
            &request.label,
            "--raw",
        ]);
        let stdout = self.capture_checked(&args)?;
        let response: CreateResponse = parse_json(&stdout, "create instance")?;
        let raw = response.new_contract.unwrap_or_default();

        InstanceId::parse(&raw).ok_or_else(|| MarketplaceError::MissingInstanceId {
            raw: if raw.is_empty() {
                NULL_SENTINEL.to_owned()
            } else {
                raw
            },
        })
    }

    /// Fetches instance details; `None` when the CLI reports no record.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Command`] or [`MarketplaceError::Parse`].
    pub fn show_instance(&self, id: &InstanceId) -> Result<Option<InstanceDetails>, MarketplaceError> {
        let args = os_args(["show", "instance", id.as_str(), "--raw"]);
        let stdout = self.capture_checked(&args)?;
        let value: serde_json::Value = parse_json(&stdout, "show instance")?;

        let is_empty = match &value {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if is_empty {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| MarketplaceError::Parse {
                resource: String::from("show instance"),
                message: err.to_string(),
            })
    }

    /// Asks for the SSH connection URI. Returns `None` while it is not yet
    /// issued; a failing exit status counts as "not yet issued".
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Command`] only when `vastai` cannot be
    /// spawned.
    pub fn ssh_url(&self, id: &InstanceId) -> Result<Option<String>, MarketplaceError> {
        let args = os_args(["ssh-url", id.as_str(), "--raw"]);
        let output = self.runner.run_with(&self.vastai_bin, &args, ExitPolicy::Unchecked)?;
        if !output.is_success() {
            tracing::debug!(
                instance = %id,
                status = %output.status_text(),
                stderr = output.stderr.trim(),
                "ssh-url not ready"
            );
            return Ok(None);
        }

        let uri = output.trimmed_stdout().trim_matches('"');
        Ok((!uri.is_empty()).then(|| uri.to_owned()))
    }

    /// Registers `public_key` on the instance. The exit status is left to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Command`] when `vastai` cannot be spawned.
    pub fn attach_ssh_key(
        &self,
        id: &InstanceId,
        public_key: &str,
    ) -> Result<CommandOutput, MarketplaceError> {
        let args = os_args(["attach", "ssh", id.as_str(), public_key]);
        Ok(self
            .runner
            .run_with(&self.vastai_bin, &args, ExitPolicy::Unchecked)?)
    }

    /// Destroys the instance. The exit status is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Command`] when `vastai` cannot be spawned.
    pub fn destroy_instance(&self, id: &InstanceId) -> Result<CommandOutput, MarketplaceError> {
        let args = os_args(["destroy", "instance", id.as_str()]);
        Ok(self
            .runner
            .run_with(&self.vastai_bin, &args, ExitPolicy::Unchecked)?)
    }

    fn capture_checked(&self, args: &[OsString]) -> Result<String, MarketplaceError> {
        Ok(self
            .runner
            .capture(&self.vastai_bin, args, ExitPolicy::Checked)?)
    }
}

fn os_args<const N: usize>(parts: [&str; N]) -> Vec<OsString> {
    parts.into_iter().map(OsString::from).collect()
}

fn parse_json<T>(stdout: &str, resource: &str) -> Result<T, MarketplaceError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(stdout).map_err(|err| MarketplaceError::Parse {
        resource: resource.to_owned(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests;
