//! Offer search filter expressions.

use super::MarketplaceError;

/// Constraints used to rank offers with `vastai search offers`.
#[derive(Clone, Debug, PartialEq)]
pub struct OfferQuery {
    /// GPU model matched by the marketplace (for example `RTX_4090`).
    pub gpu_name: String,
    /// Exact GPU count.
    pub num_gpus: u32,
    /// Minimum host memory in GB.
    pub min_cpu_ram_gb: u32,
    /// Price ceiling in dollars per hour (exclusive).
    pub max_dph: f64,
    /// Minimum CUDA version supported by the host driver.
    pub min_cuda_version: f64,
    /// Minimum disk space in GB.
    pub min_disk_gb: u32,
}

impl OfferQuery {
    /// Checks the constraints before they reach the CLI.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidQuery`] when the GPU name is blank,
    /// the GPU count is zero, or the price ceiling is not positive.
    pub fn validate(&self) -> Result<(), MarketplaceError> {
        if self.gpu_name.trim().is_empty() {
            return Err(MarketplaceError::InvalidQuery(String::from(
                "gpu_name must not be empty",
            )));
        }
        if self.gpu_name.contains(char::is_whitespace) {
            return Err(MarketplaceError::InvalidQuery(format!(
                "gpu_name '{}' must not contain whitespace (use underscores, e.g. RTX_4090)",
                self.gpu_name
            )));
        }
        if self.num_gpus == 0 {
            return Err(MarketplaceError::InvalidQuery(String::from(
                "num_gpus must be at least 1",
            )));
        }
        if self.max_dph.is_nan() || self.max_dph <= 0.0 {
            return Err(MarketplaceError::InvalidQuery(format!(
                "max_dph must be positive, got {}",
                self.max_dph
            )));
        }
        Ok(())
    }

    /// Renders the conjunctive filter expression passed to the CLI.
    #[must_use]
    pub fn filter_expression(&self) -> String {
        format!(
            "gpu_name={} num_gpus={} cpu_ram>={} dph_total<{} cuda_vers>={} disk_space>={}",
            self.gpu_name.trim(),
            self.num_gpus,
            self.min_cpu_ram_gb,
            self.max_dph,
            self.min_cuda_version,
            self.min_disk_gb,
        )
    }
}
