//! Configuration loading
//!
//! Layers, later wins: built-in defaults, TOML file, `MAMAR_*` environment
//! variables (`__` separates nesting, e.g. `MAMAR_BANK__LOAN_LIMIT=5`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::bank::{OverdraftPolicy, Policy};
use crate::entities::account::ACCOUNT_NUMBER_OFFSET;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "mamar-bank.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Business rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankSettings {
    /// Initial kill-switch value, used only until the flag is stored once
    #[serde(default)]
    pub bankrupt: bool,
    #[serde(default = "default_loan_limit")]
    pub loan_limit: u32,
    #[serde(default)]
    pub overdraft: OverdraftPolicy,
    #[serde(default = "default_account_number_offset")]
    pub account_number_offset: i64,
}

fn default_loan_limit() -> u32 {
    3
}

fn default_account_number_offset() -> i64 {
    ACCOUNT_NUMBER_OFFSET
}

impl BankSettings {
    pub fn policy(&self) -> Policy {
        Policy {
            loan_limit: self.loan_limit,
            overdraft: self.overdraft,
            account_number_offset: self.account_number_offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub bank: BankSettings,
}

impl Default for BankConfig {
    fn default() -> Self {
        BankConfig {
            database: DatabaseConfig {
                path: PathBuf::from("mamar-bank.db"),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            telemetry: TelemetryConfig {
                log_level: default_log_level(),
                json: false,
            },
            bank: BankSettings {
                bankrupt: false,
                loan_limit: default_loan_limit(),
                overdraft: OverdraftPolicy::default(),
                account_number_offset: default_account_number_offset(),
            },
        }
    }
}

impl BankConfig {
    /// Load defaults + TOML file (if present) + environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let figment = Self::figment()
            .merge(Toml::file(file))
            .merge(Env::prefixed("MAMAR_").split("__"));

        Self::from_figment(figment)
    }

    /// Defaults only; callers merge their own providers on top
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(BankConfig::default()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        Ok(figment.extract()?)
    }

    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
