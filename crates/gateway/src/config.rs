//! Configuration loading and validation for the gateway.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base address of the Vault server, e.g. `https://vault:8200`. **Required.**
    pub vault_addr: String,

    /// Vault token sent with every transit request. **Required.**
    pub vault_token: String,

    /// Mount point of the transit secrets engine.
    #[serde(default = "default_transit_mount")]
    pub vault_transit_mount: String,

    /// Vault Enterprise namespace, if any.
    #[serde(default)]
    pub vault_namespace: Option<String>,

    /// Path of the YAML file declaring per-collection policies. **Required.**
    pub policy_file: String,

    /// How often (seconds) to reload the policy file.
    #[serde(default = "default_policy_refresh_interval")]
    pub policy_refresh_interval_secs: u64,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// OTLP endpoint of the collector. Span export is disabled when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_transit_mount() -> String {
    fle::transit::vault::DEFAULT_MOUNT.into()
}
fn default_policy_refresh_interval() -> u64 {
    300
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.vault_addr, "VAULT_ADDR")?;
        ensure_non_empty(&self.vault_token, "VAULT_TOKEN")?;
        ensure_non_empty(&self.vault_transit_mount, "VAULT_TRANSIT_MOUNT")?;
        ensure_non_empty(&self.policy_file, "POLICY_FILE")?;

        if !self.vault_addr.starts_with("http://") && !self.vault_addr.starts_with("https://") {
            anyhow::bail!("VAULT_ADDR must be an http:// or https:// URL");
        }
        if self.policy_refresh_interval_secs == 0 {
            anyhow::bail!("POLICY_REFRESH_INTERVAL_SECS must be > 0");
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
