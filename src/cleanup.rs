//! Compensating cleanup for half-provisioned instances.
//!
//! Cleanup is safe to call from any failure path: it never returns an error,
//! only an outcome describing what happened.

use std::fmt;

use crate::marketplace::{InstanceId, Marketplace};
use crate::runner::CommandRunner;

/// Result of a cleanup attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CleanupOutcome {
    /// No instance id was available, so no destroy call was made.
    NothingToDestroy,
    /// The destroy request succeeded.
    Destroyed(InstanceId),
    /// The marketplace reported the instance as already gone.
    AlreadyGone(InstanceId),
    /// The destroy request failed; the instance may still be billing.
    Failed {
        /// Instance that could not be destroyed.
        instance_id: InstanceId,
        /// Reason reported by the CLI or the runner.
        reason: String,
    },
}

impl CleanupOutcome {
    /// Returns `true` when the instance is known not to exist any more.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToDestroy => f.write_str("no instance was created, nothing to clean up"),
            Self::Destroyed(id) => write!(f, "instance {id} terminated"),
            Self::AlreadyGone(id) => write!(f, "instance {id} terminated (was already destroyed)"),
            Self::Failed {
                instance_id,
                reason,
            } => write!(
                f,
                "failed to destroy instance {instance_id}, check the Vast.ai console: {reason}"
            ),
        }
    }
}

/// Destroys `instance_id` if it names a real instance.
///
/// `None`, empty strings and the `null` sentinel are no-ops. A "not found"
/// failure counts as success.
pub fn cleanup_instance<R: CommandRunner>(
    marketplace: &Marketplace<R>,
    instance_id: Option<&str>,
) -> CleanupOutcome {
    let Some(id) = instance_id.and_then(InstanceId::parse) else {
        tracing::info!("script failed before instance creation, no cleanup needed");
        return CleanupOutcome::NothingToDestroy;
    };

    tracing::warn!(instance = %id, "terminating instance after failure");
    let outcome = match marketplace.destroy_instance(&id) {
        Ok(output) if output.is_success() => CleanupOutcome::Destroyed(id),
        Ok(output) if output.stderr.to_lowercase().contains("not found") => {
            CleanupOutcome::AlreadyGone(id)
        }
        Ok(output) => CleanupOutcome::Failed {
            instance_id: id,
            reason: format!(
                "exit status {}: {}",
                output.status_text(),
                output.stderr.trim()
            ),
        },
        Err(err) => CleanupOutcome::Failed {
            instance_id: id,
            reason: err.to_string(),
        },
    };

    if outcome.is_clean() {
        tracing::info!("{outcome}");
    } else {
        tracing::warn!("{outcome}");
    }
    outcome
}
