//! Records exchanged with the `vastai` CLI.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// Literal the CLI prints when an instance identifier is absent.
pub const NULL_SENTINEL: &str = "null";

/// A priced hardware configuration returned by `vastai search offers`.
///
/// Memory figures are reported in megabytes and bandwidth in kilobits per
/// second; see [`crate::display`] for the human units.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Offer {
    /// Offer (ask contract) identifier passed to `create instance`.
    #[serde(default)]
    pub id: Option<u64>,
    /// GPU model, for example `RTX_3060`.
    #[serde(default)]
    pub gpu_name: Option<String>,
    /// Number of GPUs in the offer.
    #[serde(default, deserialize_with = "nullable_number")]
    pub num_gpus: u32,
    /// Per-GPU memory in MB.
    #[serde(default, deserialize_with = "nullable_number")]
    pub gpu_ram: f64,
    /// Host memory in MB.
    #[serde(default, deserialize_with = "nullable_number")]
    pub cpu_ram: f64,
    /// Host CPU model.
    #[serde(default)]
    pub cpu_name: Option<String>,
    /// Effective CPU cores allotted to the rental.
    #[serde(default, deserialize_with = "nullable_number")]
    pub cpu_cores_effective: f64,
    /// Total price in dollars per hour.
    #[serde(default, deserialize_with = "nullable_number")]
    pub dph_total: f64,
    /// Disk space available in GB.
    #[serde(default, deserialize_with = "nullable_number")]
    pub disk_space: f64,
    /// Host reliability score in `[0, 1]`.
    #[serde(default, deserialize_with = "nullable_number")]
    pub reliability: f64,
    /// Deep-learning performance score.
    #[serde(default, deserialize_with = "nullable_number")]
    pub dlperf: f64,
    /// Highest CUDA version supported by the host driver.
    #[serde(default, deserialize_with = "nullable_number")]
    pub cuda_max_good: f64,
    /// Free-form location string.
    #[serde(default)]
    pub geolocation: Option<String>,
    /// Upload bandwidth in Kbit/s.
    #[serde(default, deserialize_with = "nullable_number")]
    pub inet_up: f64,
    /// Download bandwidth in Kbit/s.
    #[serde(default, deserialize_with = "nullable_number")]
    pub inet_down: f64,
}

/// Reads a numeric field the marketplace may report as `null`, treating it as
/// zero like an absent key.
fn nullable_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifier of a provisioned instance.
///
/// The CLI prints `null` when creation did not produce a contract; such values
/// never become an `InstanceId`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct InstanceId(String);

impl InstanceId {
    /// Parses a raw identifier, rejecting empty values and the `null` sentinel.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == NULL_SENTINEL {
            return None;
        }
        Some(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as passed to the CLI.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response of `vastai create instance --raw`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct CreateResponse {
    #[serde(default, deserialize_with = "contract_id")]
    pub(crate) new_contract: Option<String>,
}

fn contract_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// One host-side binding of a container port.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct PortBinding {
    /// Host interface the port is bound to.
    #[serde(rename = "HostIp", default)]
    pub host_ip: Option<String>,
    /// Externally reachable port, as a decimal string.
    #[serde(rename = "HostPort")]
    pub host_port: String,
}

/// Subset of `vastai show instance --raw` used for connecting.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct InstanceDetails {
    /// Public IP address once assigned.
    #[serde(default)]
    pub public_ipaddr: Option<String>,
    /// Map from `"<port>/<proto>"` to host bindings.
    #[serde(default, deserialize_with = "nullable_ports")]
    pub ports: BTreeMap<String, Vec<PortBinding>>,
    /// Provider status such as `loading` or `running`.
    #[serde(default)]
    pub actual_status: Option<String>,
}

fn nullable_ports<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<PortBinding>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, Vec<PortBinding>>>::deserialize(deserializer)?.unwrap_or_default())
}

impl InstanceDetails {
    /// Returns the public IP when the provider has assigned one.
    #[must_use]
    pub fn public_ip(&self) -> Option<&str> {
        self.public_ipaddr
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }

    /// Returns the first external port bound to `key` (for example `22/tcp`).
    #[must_use]
    pub fn host_port(&self, key: &str) -> Option<u16> {
        self.ports
            .get(key)
            .and_then(|bindings| bindings.first())
            .and_then(|binding| binding.host_port.trim().parse().ok())
    }

    /// Returns the external SSH port.
    #[must_use]
    pub fn ssh_host_port(&self) -> Option<u16> {
        self.host_port("22/tcp")
    }
}
