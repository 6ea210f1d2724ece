//! Configuration management for the transaction coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable pointing at the configuration file
pub const CONFIG_PATH_ENV: &str = "LEDGER_COORDINATOR_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Queue, retry and gas policy for the single dispatch worker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Attempts per transaction, including the first one
    pub max_attempts: u32,
    /// Fixed pause between a retryable failure and the next attempt
    pub retry_delay_ms: u64,
    /// Safety margin applied to gas estimates (20 = 20%)
    pub gas_limit_buffer_percent: u64,
    /// Gas limit used when the estimator fails for a non-revert reason
    pub fallback_gas_limit: u64,
    /// Bound on queued (not yet dispatched) submissions
    pub queue_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 500,
            gas_limit_buffer_percent: 20,
            fallback_gas_limit: 500_000,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_gas_price_strategy")]
    pub gas_price_strategy: GasPriceStrategy,
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    /// Blocks (inclusion block counted) before a receipt is reported
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Bound on every other RPC request (nonce, estimate, fees, polling)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "COORDINATOR_PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,ledger_tx_coordinator=debug,hyper=warn".to_string(),
            json: false,
        }
    }
}

fn default_gas_price_strategy() -> GasPriceStrategy {
    GasPriceStrategy::Eip1559
}

fn default_max_gas_price_gwei() -> u64 {
    500
}

fn default_confirmations() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Settings {
    /// Load settings from the file named by `LEDGER_COORDINATOR_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.chain_id == 0 {
            anyhow::bail!("Chain {} has no chain id configured", self.chain.name);
        }
        if self.chain.rpc_urls.iter().all(|url| url.trim().is_empty()) {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }
        if self.coordinator.max_attempts == 0 {
            anyhow::bail!("coordinator.max_attempts must be at least 1");
        }
        if self.coordinator.queue_capacity == 0 {
            anyhow::bail!("coordinator.queue_capacity must be at least 1");
        }
        if self.coordinator.gas_limit_buffer_percent > 100 {
            anyhow::bail!("coordinator.gas_limit_buffer_percent must not exceed 100");
        }
        if self.chain.request_timeout_secs == 0
            || self.chain.send_timeout_secs == 0
            || self.chain.receipt_timeout_secs == 0
        {
            anyhow::bail!("Chain {} timeouts must be at least 1 second", self.chain.name);
        }
        if self.coordinator.fallback_gas_limit == 0 {
            tracing::warn!("coordinator.fallback_gas_limit is 0; estimator faults will fail dispatch");
        }

        Ok(())
    }
}

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [chain]
        chain_id = 11155111
        name = "sepolia"
        rpc_urls = ["https://rpc.example.com"]
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("LEDGER_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${LEDGER_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_toml_str(MINIMAL).unwrap();

        assert_eq!(settings.coordinator.max_attempts, 3);
        assert_eq!(settings.coordinator.retry_delay_ms, 500);
        assert_eq!(settings.coordinator.gas_limit_buffer_percent, 20);
        assert_eq!(settings.chain.gas_price_strategy, GasPriceStrategy::Eip1559);
        assert_eq!(settings.chain.confirmations, 1);
        assert_eq!(settings.chain.request_timeout_secs, 15);
        assert_eq!(settings.wallet.private_key_env, "COORDINATOR_PRIVATE_KEY");
        assert!(!settings.logging.json);
    }

    #[test]
    fn test_rejects_missing_rpc_urls() {
        let raw = r#"
            [chain]
            chain_id = 1
            name = "mainnet"
            rpc_urls = []
        "#;
        let err = Settings::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("no RPC URLs"));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let raw = format!("{}\n[coordinator]\nmax_attempts = 0\n", MINIMAL);
        assert!(Settings::from_toml_str(&raw).is_err());
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let raw = format!("{}request_timeout_secs = 0\n", MINIMAL);
        let err = Settings::from_toml_str(&raw).unwrap_err();
        assert!(err.to_string().contains("timeouts"));
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("LEDGER_TEST_RPC", "https://node.example.org");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [coordinator]
            retry_delay_ms = 250
            fallback_gas_limit = 750000

            [chain]
            chain_id = 137
            name = "polygon"
            rpc_urls = ["${{LEDGER_TEST_RPC}}"]
            gas_price_strategy = "legacy"
            confirmations = 4

            [logging]
            json = true
            "#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.chain.rpc_urls, vec!["https://node.example.org"]);
        assert_eq!(settings.chain.gas_price_strategy, GasPriceStrategy::Legacy);
        assert_eq!(settings.chain.confirmations, 4);
        assert_eq!(settings.coordinator.retry_delay_ms, 250);
        assert_eq!(settings.coordinator.fallback_gas_limit, 750_000);
        assert_eq!(settings.coordinator.max_attempts, 3);
        assert!(settings.logging.json);
    }
}
