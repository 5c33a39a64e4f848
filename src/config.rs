//! Configuration for icrc-vault

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::VaultError;
use crate::principal;
use crate::store::records::{DEFAULT_MAX_ITERATION_COUNT, DEFAULT_MAX_RESULTS, KNOWN_CANISTERS};

pub const MAX_RESULTS_RANGE: std::ops::RangeInclusive<u64> = 1..=10_000;
pub const MAX_ITERATION_COUNT_RANGE: std::ops::RangeInclusive<u64> = 1..=1_000;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("icrc-vault")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub init: InitArgs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Directory holding the sled database and config.toml
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Ledger-visible principal of the vault account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_principal: Option<String>,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Most recent transactions listed by `status`
    #[serde(default = "default_status_tx_limit")]
    pub status_tx_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Gateway that forwards canister calls as JSON
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Serve ledger calls from an in-memory log instead of the gateway
    #[serde(default)]
    pub mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Periodic sync interval in seconds (0 = only on request)
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
}

/// Initialization parameters, applied when the store is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitArgs {
    /// Admin override; the deploying identity otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_principal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iteration_count: Option<u64>,

    #[serde(default)]
    pub test_mode_enabled: bool,

    #[serde(default)]
    pub canisters: Vec<CanisterBinding>,
}

/// `(name, principal)` pair binding a canister role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanisterBinding {
    pub name: String,
    pub principal: String,
}

fn default_http_port() -> u16 {
    8095
}

fn default_status_tx_limit() -> usize {
    100
}

fn default_gateway_url() -> String {
    "http://localhost:4943".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_sync_interval() -> u64 {
    60
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vault_principal: None,
            http_port: default_http_port(),
            status_tx_limit: default_status_tx_limit(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            request_timeout_secs: default_request_timeout(),
            mock: false,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
        }
    }
}

impl InitArgs {
    /// Check ranges, canister roles and principals.
    pub fn validate(&self) -> Result<(), VaultError> {
        let max_results = self.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        if !MAX_RESULTS_RANGE.contains(&max_results) {
            return Err(VaultError::InvalidArgument(format!(
                "max_results {} outside {:?}",
                max_results, MAX_RESULTS_RANGE
            )));
        }

        let max_iteration_count = self
            .max_iteration_count
            .unwrap_or(DEFAULT_MAX_ITERATION_COUNT);
        if !MAX_ITERATION_COUNT_RANGE.contains(&max_iteration_count) {
            return Err(VaultError::InvalidArgument(format!(
                "max_iteration_count {} outside {:?}",
                max_iteration_count, MAX_ITERATION_COUNT_RANGE
            )));
        }

        if let Some(admin) = &self.admin_principal {
            principal::parse(admin)?;
        }

        for binding in &self.canisters {
            if !KNOWN_CANISTERS.contains(&binding.name.as_str()) {
                return Err(VaultError::InvalidArgument(format!(
                    "unknown canister '{}', expected one of {:?}",
                    binding.name, KNOWN_CANISTERS
                )));
            }
            principal::parse(&binding.principal)?;
        }

        Ok(())
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Validate everything the daemon needs before opening the store.
    pub fn validate(&self) -> Result<(), VaultError> {
        match &self.vault.vault_principal {
            Some(p) => {
                principal::parse(p)?;
            }
            None => {
                return Err(VaultError::InvalidArgument(
                    "vault_principal is not configured".into(),
                ))
            }
        }
        if self.vault.status_tx_limit == 0 {
            return Err(VaultError::InvalidArgument(
                "status_tx_limit must be at least 1".into(),
            ));
        }
        self.init.validate()
    }

    /// Get sled database path
    pub fn store_path(&self) -> PathBuf {
        self.vault.data_dir.join("vault.sled")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.vault.data_dir.join("config.toml")
    }
}
