//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;

use tokio::sync::{Mutex, MutexGuard};

use crate::runner::{CommandOutput, CommandRunner, RunnerError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// When the queue runs dry the runner reports a spawn failure, which the
/// polling loops treat like any other transient error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns `true` when the arguments start with `prefix`.
    #[must_use]
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.args.len()
            && self
                .args
                .iter()
                .zip(prefix)
                .all(|(arg, expected)| arg.to_string_lossy() == *expected)
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Counts recorded invocations whose arguments start with `prefix`.
    #[must_use]
    pub fn count_calls(&self, prefix: &[&str]) -> usize {
        self.invocations
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RunnerError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| RunnerError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Produces a minimal offer record matching `vastai search offers --raw`.
#[must_use]
pub fn json_offer(id: u64, gpu_name: &str, dph_total: f64) -> String {
    format!(
        concat!(
            "{{\"id\":{id},\"gpu_name\":\"{gpu}\",\"num_gpus\":1,",
            "\"gpu_ram\":12288,\"cpu_ram\":16384,\"cpu_name\":\"AMD EPYC 7B12\",",
            "\"dph_total\":{dph},\"disk_space\":32.0,\"reliability\":0.9981,",
            "\"dlperf\":12.5,\"cuda_max_good\":12.8,\"geolocation\":\"Sweden, SE\",",
            "\"inet_up\":400,\"inet_down\":800}}"
        ),
        id = id,
        gpu = gpu_name,
        dph = dph_total,
    )
}

/// Produces a JSON array of offers as returned by `vastai search offers --raw`.
#[must_use]
pub fn json_offers(offers: &[(u64, &str, f64)]) -> String {
    let items = offers
        .iter()
        .map(|(id, gpu, dph)| json_offer(*id, gpu, *dph))
        .collect::<Vec<_>>()
        .join(",");
    format!("[{items}]")
}

/// Produces a `vastai show instance --raw` payload with the given networking.
///
/// `ssh_port` and `udp` become host-port bindings for `22/tcp` and
/// `<udp.0>/udp` respectively.
#[must_use]
pub fn json_instance(
    public_ip: Option<&str>,
    ssh_port: Option<u16>,
    udp: Option<(u16, u16)>,
) -> String {
    let ip = public_ip.map_or_else(|| String::from("null"), |ip| format!("\"{ip}\""));
    let mut bindings = Vec::new();
    if let Some(port) = ssh_port {
        bindings.push(format!(
            "\"22/tcp\":[{{\"HostIp\":\"0.0.0.0\",\"HostPort\":\"{port}\"}}]"
        ));
    }
    if let Some((container, host)) = udp {
        bindings.push(format!(
            "\"{container}/udp\":[{{\"HostIp\":\"0.0.0.0\",\"HostPort\":\"{host}\"}}]"
        ));
    }
    format!(
        "{{\"id\":789,\"actual_status\":\"running\",\"public_ipaddr\":{ip},\"ports\":{{{}}}}}",
        bindings.join(",")
    )
}
