//! Storage configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use thiserror::Error;
use walletdb_types::wallet::DEFAULT_GAP_LIMIT;
use walletdb_utils::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid TOML: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Which storage medium backs the wallet indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Everything lives in process memory and is lost on exit.
    Memory,
    /// LMDB environment under `data_dir`.
    #[default]
    Lmdb,
}

/// Configuration for a wallet store.
///
/// Can be loaded from a TOML file via [`StorageConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Directory holding the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of named LMDB databases.
    #[serde(default = "default_max_dbs")]
    pub max_dbs: u32,

    /// Blocks a block-reward output stays height-locked.
    #[serde(default = "default_reward_lock")]
    pub reward_lock: u64,

    /// Gap limit applied to a fresh wallet using gap-limit scanning.
    #[serde(default = "default_gap_limit")]
    pub gap_limit: u32,

    /// Default reservation lifetime for UTXOs picked as inputs.
    #[serde(default = "default_utxo_selection_ttl_secs")]
    pub utxo_selection_ttl_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./walletdb_data")
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_max_dbs() -> u32 {
    20
}

fn default_reward_lock() -> u64 {
    300
}

fn default_gap_limit() -> u32 {
    DEFAULT_GAP_LIMIT
}

fn default_utxo_selection_ttl_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl StorageConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map_size == 0 {
            return Err(ConfigError::Invalid {
                field: "map_size",
                reason: "must be non-zero".into(),
            });
        }
        if self.gap_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "gap_limit",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            max_dbs: default_max_dbs(),
            reward_lock: default_reward_lock(),
            gap_limit: default_gap_limit(),
            utxo_selection_ttl_secs: default_utxo_selection_ttl_secs(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}
