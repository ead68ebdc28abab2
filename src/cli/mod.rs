//! Command-line interface definitions for the `vastlaunch` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `vastlaunch` binary.
///
/// Every flag is optional; omitted values come from `vastlaunch.toml` and
/// `VASTLAUNCH_*` environment variables.
#[derive(Debug, Parser)]
#[command(
    name = "vastlaunch",
    about = "Rent the cheapest matching Vast.ai GPU instance and print how to connect",
    version
)]
pub(crate) struct Cli {
    /// GPU model to search for, for example `RTX_4090`.
    #[arg(long, value_name = "MODEL")]
    pub(crate) gpu_name: Option<String>,
    /// Number of GPUs to rent.
    #[arg(long, value_name = "COUNT")]
    pub(crate) num_gpus: Option<u32>,
    /// Minimum host memory in GB.
    #[arg(long, value_name = "GB")]
    pub(crate) min_cpu_ram: Option<u32>,
    /// Disk size in GB.
    #[arg(long, value_name = "GB")]
    pub(crate) disk_storage: Option<u32>,
    /// Highest acceptable price in dollars per hour.
    #[arg(long, value_name = "USD")]
    pub(crate) max_dph: Option<f64>,
    /// Minimum CUDA version supported by the host driver.
    #[arg(long, value_name = "VERSION")]
    pub(crate) min_cuda_version: Option<f64>,
    /// Image template for the instance.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) template: Option<String>,
    /// Public key to attach to the instance.
    #[arg(long, value_name = "PATH")]
    pub(crate) ssh_key_path: Option<String>,
    /// Number of UDP ports to open for Mosh (1-16).
    #[arg(long, value_name = "COUNT")]
    pub(crate) num_ports: Option<u16>,
    /// Seconds to wait for the public IP and SSH port.
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub(crate) timeout_secs: Option<u64>,
    /// Label shown in the Vast.ai console.
    #[arg(long, value_name = "LABEL")]
    pub(crate) tag: Option<String>,
    /// Path to the `vastai` executable.
    #[arg(long, value_name = "PATH")]
    pub(crate) vastai_bin: Option<String>,
    /// Log filter, for example `debug` or `vastlaunch=trace`.
    ///
    /// Defaults to `RUST_LOG`, then `info`.
    #[arg(long, value_name = "FILTER")]
    pub(crate) log_level: Option<String>,
}
