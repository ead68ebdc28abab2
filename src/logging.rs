//! Diagnostic logging setup.
//!
//! Progress, retries and cleanup are reported as `tracing` events on stderr so
//! stdout stays reserved for offers, prompts and the final summary.

use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter, ParseError};
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The requested level is not a valid filter directive.
    #[error("invalid log level '{level}': {message}")]
    InvalidLevel {
        /// Level as supplied.
        level: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber is already installed.
    #[error("failed to install logger: {0}")]
    Install(String),
}

/// Builds the filter: `level` when given, otherwise `RUST_LOG`, otherwise
/// `info`.
///
/// # Errors
///
/// Returns [`LoggingError::InvalidLevel`] when `level` does not parse.
pub fn build_filter(level: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let Some(requested) = level else {
        return Ok(EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy());
    };

    EnvFilter::try_new(requested).map_err(|err: ParseError| LoggingError::InvalidLevel {
        level: requested.to_owned(),
        message: err.to_string(),
    })
}

/// Installs a compact stderr subscriber for the process.
///
/// # Errors
///
/// Returns [`LoggingError`] when the level is invalid or a subscriber is
/// already set.
pub fn init_logging(level: Option<&str>) -> Result<(), LoggingError> {
    let filter = build_filter(level)?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("debug")]
    #[case("vastlaunch=trace,warn")]
    fn valid_levels_build_filters(#[case] level: &str) {
        assert!(build_filter(Some(level)).is_ok());
    }

    #[rstest]
    fn invalid_levels_are_rejected() {
        let err = build_filter(Some("vastlaunch=loud")).expect_err("should fail");
        assert!(err.to_string().contains("vastlaunch=loud"), "{err}");
    }
}
