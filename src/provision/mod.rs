//! Provision-and-verify lifecycle for a single instance.
//!
//! The provisioner creates the instance, waits for the marketplace to issue a
//! connection URI, attaches the operator's public key, and waits for the
//! instance's own network details. Once an instance id exists, every terminal
//! failure destroys the instance before the error is returned. Key attachment
//! is best-effort and never changes the outcome.

use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::cleanup::{CleanupOutcome, cleanup_instance};
use crate::connection::{ConnectionError, DirectEndpoint, SshEndpoint};
use crate::marketplace::{CreateRequest, InstanceId, Marketplace, MarketplaceError};
use crate::retry::{RetryExhausted, RetryPolicy, poll};
use crate::runner::CommandRunner;

/// Attempts made while waiting for the connection URI.
pub const URI_MAX_ATTEMPTS: u32 = 6;
/// Delay between connection URI attempts.
pub const URI_RETRY_INTERVAL: Duration = Duration::from_secs(15);
/// Default overall budget for the public IP and SSH port to appear.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(240);
/// Delay between network detail attempts.
pub const NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Everything needed to launch one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchPlan {
    /// Create request sent to the marketplace.
    pub request: CreateRequest,
    /// Local public key to attach, already tilde-expanded.
    pub ssh_key_path: Utf8PathBuf,
}

/// What happened to the operator's public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyAttachment {
    /// The key was registered on the instance.
    Attached,
    /// The CLI refused the key.
    Rejected {
        /// Trimmed stderr from `vastai attach ssh`.
        stderr: String,
    },
    /// No key file exists at the configured path.
    KeyMissing {
        /// Configured key path.
        path: Utf8PathBuf,
    },
    /// The key file exists but could not be read, or the CLI could not run.
    Unavailable {
        /// Configured key path.
        path: Utf8PathBuf,
        /// Underlying failure.
        message: String,
    },
}

/// Connection details for a running instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchReport {
    /// Identifier of the new instance.
    pub instance_id: InstanceId,
    /// Endpoint parsed from the connection URI.
    pub endpoint: SshEndpoint,
    /// Alternate endpoint on the instance's public IP.
    pub direct: DirectEndpoint,
    /// Outcome of the public-key step.
    pub key: KeyAttachment,
}

/// Failures after the instance exists; each one triggers cleanup.
#[derive(Debug, Error)]
pub enum StepFailure {
    /// The connection URI never became available.
    #[error("failed to retrieve SSH connection info within the timeout period: {0}")]
    ConnectionInfoTimeout(#[source] RetryExhausted),
    /// The connection URI could not be parsed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Public IP or SSH port never appeared.
    #[error("could not retrieve public IP or SSH port after {} s: {source}", timeout.as_secs())]
    NetworkTimeout {
        /// Budget that was exhausted.
        timeout: Duration,
        /// Retry bookkeeping.
        #[source]
        source: RetryExhausted,
    },
}

/// Errors returned by [`Provisioner::launch`].
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Instance creation failed; nothing needs cleaning up.
    #[error("failed to create instance: {0}")]
    Create(#[source] MarketplaceError),
    /// A later step failed and the instance was torn down.
    #[error("launch of instance {instance_id} failed: {source} ({cleanup})")]
    Aborted {
        /// Instance that was created.
        instance_id: InstanceId,
        /// Result of the compensating destroy.
        cleanup: CleanupOutcome,
        /// Step that failed.
        #[source]
        source: StepFailure,
    },
}

/// Creates and verifies instances using a marketplace client.
#[derive(Debug)]
pub struct Provisioner<'m, R: CommandRunner> {
    marketplace: &'m Marketplace<R>,
    uri_policy: RetryPolicy,
    network_policy: RetryPolicy,
}

impl<'m, R: CommandRunner> Provisioner<'m, R> {
    /// Creates a provisioner with the standard retry budgets.
    #[must_use]
    pub const fn new(marketplace: &'m Marketplace<R>) -> Self {
        Self {
            marketplace,
            uri_policy: RetryPolicy::attempts(URI_MAX_ATTEMPTS, URI_RETRY_INTERVAL),
            network_policy: RetryPolicy::deadline(NETWORK_TIMEOUT, NETWORK_POLL_INTERVAL),
        }
    }

    /// Overrides the connection URI retry policy.
    #[must_use]
    pub const fn with_uri_policy(mut self, policy: RetryPolicy) -> Self {
        self.uri_policy = policy;
        self
    }

    /// Overrides the network detail retry policy.
    #[must_use]
    pub const fn with_network_policy(mut self, policy: RetryPolicy) -> Self {
        self.network_policy = policy;
        self
    }

    /// Launches `plan` and returns connection details.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Create`] when creation fails, or
    /// [`LaunchError::Aborted`] after destroying the instance when any later
    /// step fails.
    pub async fn launch(&self, plan: &LaunchPlan) -> Result<LaunchReport, LaunchError> {
        tracing::info!(offer = plan.request.offer_id, "creating instance");
        let instance_id = self
            .marketplace
            .create_instance(&plan.request)
            .map_err(LaunchError::Create)?;
        tracing::info!(instance = %instance_id, "instance created, waiting for it to start");

        match self.verify(&instance_id, plan).await {
            Ok(report) => Ok(report),
            Err(source) => {
                tracing::error!(instance = %instance_id, error = %source, "launch failed");
                let cleanup = cleanup_instance(self.marketplace, Some(instance_id.as_str()));
                Err(LaunchError::Aborted {
                    instance_id,
                    cleanup,
                    source,
                })
            }
        }
    }

    async fn verify(
        &self,
        instance_id: &InstanceId,
        plan: &LaunchPlan,
    ) -> Result<LaunchReport, StepFailure> {
        let uri = self.wait_for_connection_uri(instance_id).await?;
        let endpoint = SshEndpoint::parse(&uri)?;
        tracing::info!(%endpoint, "retrieved SSH connection URI");

        let key = self.attach_key(instance_id, &plan.ssh_key_path);
        let direct = self.wait_for_network(instance_id).await?;

        Ok(LaunchReport {
            instance_id: instance_id.clone(),
            endpoint,
            direct,
            key,
        })
    }

    async fn wait_for_connection_uri(&self, instance_id: &InstanceId) -> Result<String, StepFailure> {
        let max = self.uri_policy.max_attempts.unwrap_or(u32::MAX);
        poll(&self.uri_policy, |attempt| {
            match self.marketplace.ssh_url(instance_id) {
                Ok(Some(uri)) => return Some(uri),
                Ok(None) => {}
                Err(err) => tracing::debug!(error = %err, "ssh-url attempt failed"),
            }
            tracing::info!("attempt {attempt}/{max}: connection info not ready yet");
            None
        })
        .await
        .map_err(StepFailure::ConnectionInfoTimeout)
    }

    async fn wait_for_network(&self, instance_id: &InstanceId) -> Result<DirectEndpoint, StepFailure> {
        tracing::info!("waiting for the public IP and SSH port");
        poll(&self.network_policy, |attempt| {
            match self.marketplace.show_instance(instance_id) {
                Ok(Some(details)) => {
                    if let (Some(ip), Some(port)) = (details.public_ip(), details.ssh_host_port()) {
                        return Some(DirectEndpoint {
                            public_ip: ip.to_owned(),
                            ssh_port: port,
                        });
                    }
                    tracing::info!(
                        attempt,
                        status = details.actual_status.as_deref().unwrap_or("unknown"),
                        "network details not assigned yet"
                    );
                }
                Ok(None) => tracing::info!(attempt, "instance record not available yet"),
                Err(err) => tracing::warn!(attempt, error = %err, "status check failed"),
            }
            None
        })
        .await
        .map_err(|source| StepFailure::NetworkTimeout {
            timeout: self.network_policy.deadline.unwrap_or_default(),
            source,
        })
    }

    fn attach_key(&self, instance_id: &InstanceId, path: &Utf8Path) -> KeyAttachment {
        let key = match read_public_key(path) {
            Ok(Some(key)) if key.is_empty() => {
                tracing::warn!(%path, "SSH public key file is empty, skipping key addition");
                return KeyAttachment::Unavailable {
                    path: path.to_path_buf(),
                    message: String::from("key file is empty"),
                };
            }
            Ok(Some(key)) => key,
            Ok(None) => {
                tracing::warn!(
                    %path,
                    "SSH public key not found, skipping key addition; ensure the key is on your Vast.ai account"
                );
                return KeyAttachment::KeyMissing {
                    path: path.to_path_buf(),
                };
            }
            Err(err) => {
                tracing::warn!(%path, error = %err, "could not read SSH public key");
                return KeyAttachment::Unavailable {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                };
            }
        };

        match self.marketplace.attach_ssh_key(instance_id, &key) {
            Ok(output) if output.is_success() => {
                tracing::info!("SSH public key added to the instance");
                KeyAttachment::Attached
            }
            Ok(output) => {
                let stderr = output.stderr.trim().to_owned();
                tracing::warn!(%stderr, "failed to attach SSH public key");
                KeyAttachment::Rejected { stderr }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to attach SSH public key");
                KeyAttachment::Unavailable {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
            }
        }
    }
}

/// Reads and trims a public key file; `Ok(None)` when it does not exist.
///
/// # Errors
///
/// Returns I/O errors other than "not found".
pub fn read_public_key(path: &Utf8Path) -> io::Result<Option<String>> {
    let Some(file_name) = path.file_name() else {
        return Ok(None);
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    let contents = Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.read_to_string(file_name));
    match contents {
        Ok(text) => Ok(Some(text.trim().to_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
