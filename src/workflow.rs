//! Interactive launch session: search, pick, then provision.
//!
//! [`LaunchWorkflow`] owns everything a launch needs, so a session carries no
//! module-level state between runs.

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::config::{ConfigError, LaunchConfig};
use crate::marketplace::{Marketplace, MarketplaceError, Offer};
use crate::picker::OfferPicker;
use crate::provision::{
    KeyAttachment, LaunchError, LaunchReport, NETWORK_POLL_INTERVAL, Provisioner,
    URI_MAX_ATTEMPTS, URI_RETRY_INTERVAL,
};
use crate::retry::RetryPolicy;
use crate::runner::CommandRunner;

/// Terminal result of a launch session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LaunchOutcome {
    /// An instance is running and reachable.
    Launched(LaunchReport),
    /// The operator declined every offer.
    Cancelled,
}

/// Errors surfaced by [`LaunchWorkflow::run`].
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Searching for offers failed or returned nothing.
    #[error(transparent)]
    Search(MarketplaceError),
    /// Reading the operator's choice or writing the summary failed.
    #[error("terminal I/O failed: {0}")]
    Terminal(#[from] io::Error),
    /// Provisioning the chosen offer failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Launch session bound to one configuration and marketplace client.
#[derive(Debug)]
pub struct LaunchWorkflow<R: CommandRunner> {
    config: LaunchConfig,
    marketplace: Marketplace<R>,
    uri_policy: RetryPolicy,
    network_policy: RetryPolicy,
}

impl<R: CommandRunner> LaunchWorkflow<R> {
    /// Creates a session with retry budgets taken from `config`.
    #[must_use]
    pub fn new(config: LaunchConfig, marketplace: Marketplace<R>) -> Self {
        let network_policy = RetryPolicy::deadline(config.network_timeout(), NETWORK_POLL_INTERVAL);
        Self {
            config,
            marketplace,
            uri_policy: RetryPolicy::attempts(URI_MAX_ATTEMPTS, URI_RETRY_INTERVAL),
            network_policy,
        }
    }

    /// Overrides both retry policies.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_retry_policies(mut self, uri: RetryPolicy, network: RetryPolicy) -> Self {
        self.uri_policy = uri;
        self.network_policy = network;
        self
    }

    /// Configuration this session runs with.
    #[must_use]
    pub const fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Runs the session, reading decisions from `input` and writing offers
    /// and the final summary to `output`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when validation, search, terminal I/O or
    /// provisioning fails. A failed provision has already been cleaned up.
    pub async fn run(
        &self,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<LaunchOutcome, WorkflowError> {
        self.config.validate()?;

        let query = self.config.offer_query();
        tracing::info!(filter = %query.filter_expression(), "searching for offers");
        let offers: Vec<Offer> = self
            .marketplace
            .search_offers(&query)
            .map_err(WorkflowError::Search)?
            .into_iter()
            .filter(|offer| offer.id.is_some())
            .collect();
        tracing::info!(count = offers.len(), "offers found");

        let chosen = match OfferPicker::new(&offers) {
            Some(picker) => picker.pick(input, output)?,
            None => None,
        };
        let Some(offer_id) = chosen.and_then(|offer| offer.id) else {
            writeln!(output, "Operation cancelled.")?;
            tracing::info!("no offer selected, exiting");
            return Ok(LaunchOutcome::Cancelled);
        };

        let provisioner = Provisioner::new(&self.marketplace)
            .with_uri_policy(self.uri_policy)
            .with_network_policy(self.network_policy);
        let report = provisioner
            .launch(&self.config.launch_plan(offer_id))
            .await?;

        render_launch_report(output, &report)?;
        Ok(LaunchOutcome::Launched(report))
    }
}

/// Writes connection commands and key status for a launched instance.
///
/// # Errors
///
/// Propagates write failures on `out`.
pub fn render_launch_report(out: &mut impl Write, report: &LaunchReport) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Instance {} is running.", report.instance_id)?;
    writeln!(out, "Connect with:")?;
    writeln!(out, "   {}", report.endpoint.command())?;
    writeln!(out, "Or directly via the public IP:")?;
    writeln!(out, "   {}", report.direct.command(&report.endpoint.user))?;

    match &report.key {
        KeyAttachment::Attached => {}
        KeyAttachment::Rejected { stderr } => writeln!(
            out,
            "Warning: the SSH key was not attached ({stderr}); add it manually in the console."
        )?,
        KeyAttachment::KeyMissing { path } => writeln!(
            out,
            "Warning: no public key at {path}; make sure your key is on your Vast.ai account."
        )?,
        KeyAttachment::Unavailable { path, message } => writeln!(
            out,
            "Warning: could not use the public key at {path}: {message}"
        )?,
    }

    writeln!(out, "Setup complete.")?;
    Ok(())
}
