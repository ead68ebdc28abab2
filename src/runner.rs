//! External command execution.
//!
//! Every interaction with `vastai`, `ssh` and friends goes through a
//! [`CommandRunner`] so the workflow can be driven by scripted fakes in tests.
//! The runner itself never retries and never times out; callers that poll
//! implement their own budget on top.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Returns standard output with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim()
    }

    /// Human readable exit status (`unknown` when killed by a signal).
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Whether a non-zero exit status is turned into an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitPolicy {
    /// Non-zero exits become [`RunnerError::NonZeroExit`].
    Checked,
    /// Non-zero exits are returned as ordinary output for the caller to
    /// inspect.
    Unchecked,
}

/// Errors raised while running external commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunnerError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a checked command completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    NonZeroExit {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process, trimmed.
        stderr: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError>;

    /// Runs `program` and applies `policy` to its exit status.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Spawn`] when the command cannot be started, or
    /// [`RunnerError::NonZeroExit`] when `policy` is [`ExitPolicy::Checked`]
    /// and the command fails.
    fn run_with(
        &self,
        program: &str,
        args: &[OsString],
        policy: ExitPolicy,
    ) -> Result<CommandOutput, RunnerError> {
        let output = self.run(program, args)?;
        if policy == ExitPolicy::Unchecked || output.is_success() {
            return Ok(output);
        }

        Err(RunnerError::NonZeroExit {
            program: program.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }

    /// Runs `program` and returns its trimmed standard output.
    ///
    /// # Errors
    ///
    /// Same as [`CommandRunner::run_with`].
    fn capture(
        &self,
        program: &str,
        args: &[OsString],
        policy: ExitPolicy,
    ) -> Result<String, RunnerError> {
        self.run_with(program, args, policy)
            .map(|output| output.trimmed_stdout().to_owned())
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError> {
        tracing::debug!(program, ?args, "running external command");
        let output = off_runtime(|| Command::new(program).args(args).output()).map_err(|err| {
            RunnerError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            }
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs a blocking call, moving it off the async worker when called from a
/// multi-threaded runtime so timers keep firing while the command runs.
fn off_runtime<T>(call: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(call)
        }
        _ => call(),
    }
}
