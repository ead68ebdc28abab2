//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `vastlaunch.toml`, and `VASTLAUNCH_*` environment
//! variables. Command-line flags are applied afterwards through
//! [`LaunchOverrides`].

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::manifest::{MAX_UDP_PORTS, MOSH_UDP_BASE_PORT};
use crate::marketplace::{CreateRequest, OfferQuery};
use crate::provision::LaunchPlan;

/// Launch defaults: search constraints, image and key settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq)]
#[ortho_config(
    prefix = "VASTLAUNCH",
    discovery(
        app_name = "vastlaunch",
        env_var = "VASTLAUNCH_CONFIG_PATH",
        config_file_name = "vastlaunch.toml",
        dotfile_name = ".vastlaunch.toml",
        project_file_name = "vastlaunch.toml"
    )
)]
pub struct LaunchConfig {
    /// Path to the `vastai` executable.
    #[ortho_config(default = "vastai".to_owned())]
    pub vastai_bin: String,
    /// GPU model to search for (for example `RTX_4090`).
    #[ortho_config(default = "RTX_3060".to_owned())]
    pub gpu_name: String,
    /// Number of GPUs to rent.
    #[ortho_config(default = 1)]
    pub num_gpus: u32,
    /// Minimum host memory in GB.
    #[ortho_config(default = 16)]
    pub min_cpu_ram: u32,
    /// Disk size in GB, also used as the minimum disk filter.
    #[ortho_config(default = 16)]
    pub disk_storage: u32,
    /// Price ceiling in dollars per hour.
    #[ortho_config(default = 0.2)]
    pub max_dph: f64,
    /// Minimum CUDA version supported by the host driver.
    #[ortho_config(default = 12.8)]
    pub min_cuda_version: f64,
    /// Image template for the instance.
    #[ortho_config(default = "vastai/pytorch:cuda-12.8.1-auto".to_owned())]
    pub template: String,
    /// Public key attached to the instance. Supports `~/`.
    #[ortho_config(default = "~/.ssh/id_ed25519.pub".to_owned())]
    pub ssh_key_path: String,
    /// Number of UDP ports opened for Mosh.
    #[ortho_config(default = 1)]
    pub num_ports: u16,
    /// Budget in seconds for the public IP and SSH port to appear.
    #[ortho_config(default = 240)]
    pub timeout_secs: u64,
    /// Label attached to the instance.
    #[ortho_config(default = "Launched_GPU_Instance".to_owned())]
    pub tag: String,
}

/// Settings for attaching a Mosh session to an existing instance.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VASTLAUNCH_CONNECT",
    discovery(
        app_name = "vastlaunch",
        env_var = "VASTLAUNCH_CONFIG_PATH",
        config_file_name = "vastlaunch.toml",
        dotfile_name = ".vastlaunch.toml",
        project_file_name = "vastlaunch.toml"
    )
)]
pub struct ConnectConfig {
    /// Path to the `vastai` executable.
    #[ortho_config(default = "vastai".to_owned())]
    pub vastai_bin: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user for the bootstrap SSH session.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Path to the `mosh-client` executable.
    #[ortho_config(default = "mosh-client".to_owned())]
    pub mosh_client_bin: String,
    /// Container UDP port `mosh-server` binds to.
    #[ortho_config(default = 60001)]
    pub udp_port: u16,
    /// Whether to enforce host key checking; rented hosts change keys often.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

fn require_field(value: &str, prefix: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "{field} is empty: set {prefix}_{} or add {field} to vastlaunch.toml",
            field.to_uppercase()
        )));
    }
    Ok(())
}

/// Command-line values that take precedence over loaded configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaunchOverrides {
    /// GPU model.
    pub gpu_name: Option<String>,
    /// GPU count.
    pub num_gpus: Option<u32>,
    /// Minimum host memory in GB.
    pub min_cpu_ram: Option<u32>,
    /// Disk size in GB.
    pub disk_storage: Option<u32>,
    /// Price ceiling.
    pub max_dph: Option<f64>,
    /// Minimum CUDA version.
    pub min_cuda_version: Option<f64>,
    /// Image template.
    pub template: Option<String>,
    /// Public key path.
    pub ssh_key_path: Option<String>,
    /// UDP port count.
    pub num_ports: Option<u16>,
    /// Network timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Instance label.
    pub tag: Option<String>,
    /// `vastai` binary.
    pub vastai_bin: Option<String>,
}

impl LaunchConfig {
    const ENV_PREFIX: &'static str = "VASTLAUNCH";

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vastlaunch")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns a copy with every `Some` override applied.
    #[must_use]
    pub fn with_overrides(self, overrides: LaunchOverrides) -> Self {
        Self {
            vastai_bin: overrides.vastai_bin.unwrap_or(self.vastai_bin),
            gpu_name: overrides.gpu_name.unwrap_or(self.gpu_name),
            num_gpus: overrides.num_gpus.unwrap_or(self.num_gpus),
            min_cpu_ram: overrides.min_cpu_ram.unwrap_or(self.min_cpu_ram),
            disk_storage: overrides.disk_storage.unwrap_or(self.disk_storage),
            max_dph: overrides.max_dph.unwrap_or(self.max_dph),
            min_cuda_version: overrides.min_cuda_version.unwrap_or(self.min_cuda_version),
            template: overrides.template.unwrap_or(self.template),
            ssh_key_path: overrides.ssh_key_path.unwrap_or(self.ssh_key_path),
            num_ports: overrides.num_ports.unwrap_or(self.num_ports),
            timeout_secs: overrides.timeout_secs.unwrap_or(self.timeout_secs),
            tag: overrides.tag.unwrap_or(self.tag),
        }
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank strings and
    /// [`ConfigError::Invalid`] for out-of-range numbers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (&self.vastai_bin, "vastai_bin"),
            (&self.gpu_name, "gpu_name"),
            (&self.template, "template"),
            (&self.ssh_key_path, "ssh_key_path"),
            (&self.tag, "tag"),
        ] {
            require_field(value, Self::ENV_PREFIX, field)?;
        }
        if self.num_gpus == 0 {
            return Err(ConfigError::Invalid(String::from(
                "num_gpus must be at least 1",
            )));
        }
        if self.disk_storage == 0 {
            return Err(ConfigError::Invalid(String::from(
                "disk_storage must be at least 1 GB",
            )));
        }
        if !self.max_dph.is_finite() || self.max_dph <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_dph must be a positive price, got {}",
                self.max_dph
            )));
        }
        if !(1..=MAX_UDP_PORTS).contains(&self.num_ports) {
            return Err(ConfigError::Invalid(format!(
                "num_ports must be between 1 and {MAX_UDP_PORTS}, got {}",
                self.num_ports
            )));
        }
        Ok(())
    }

    /// Search constraints derived from this configuration.
    #[must_use]
    pub fn offer_query(&self) -> OfferQuery {
        OfferQuery {
            gpu_name: self.gpu_name.trim().to_owned(),
            num_gpus: self.num_gpus,
            min_cpu_ram_gb: self.min_cpu_ram,
            max_dph: self.max_dph,
            min_cuda_version: self.min_cuda_version,
            min_disk_gb: self.disk_storage,
        }
    }

    /// Launch plan for `offer_id`.
    #[must_use]
    pub fn launch_plan(&self, offer_id: u64) -> LaunchPlan {
        LaunchPlan {
            request: CreateRequest::standard(
                offer_id,
                self.template.trim(),
                self.disk_storage,
                self.num_ports,
                self.tag.trim(),
            ),
            ssh_key_path: resolve_home(self.ssh_key_path.trim()),
        }
    }

    /// Budget for the network-readiness poll.
    #[must_use]
    pub const fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ConnectConfig {
    const ENV_PREFIX: &'static str = "VASTLAUNCH_CONNECT";

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vastlaunch-mosh")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures binaries and user are set and the UDP port is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] or [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (&self.vastai_bin, "vastai_bin"),
            (&self.ssh_bin, "ssh_bin"),
            (&self.ssh_user, "ssh_user"),
            (&self.mosh_client_bin, "mosh_client_bin"),
        ] {
            require_field(value, Self::ENV_PREFIX, field)?;
        }
        if self.udp_port == 0 {
            return Err(ConfigError::Invalid(format!(
                "udp_port must be non-zero (Mosh ports start at {MOSH_UDP_BASE_PORT})"
            )));
        }
        Ok(())
    }
}

/// Resolves `~` and `~/...` against `HOME`; other paths pass through.
fn resolve_home(path: &str) -> Utf8PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    let home = std::env::var_os("HOME")
        .and_then(|home| Utf8PathBuf::from_path_buf(home.into()).ok());
    match (rest, home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => Utf8PathBuf::from(path),
    }
}
