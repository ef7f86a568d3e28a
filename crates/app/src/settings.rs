//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` and overridden by `SAFESPEND__*` environment
//! variables (`SAFESPEND__LEDGER__DAILY_LIMIT_WINDOW_DAYS=15`).
//!
//! See `settings.example.toml` for every key.
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use engine::{CacheTtls, LedgerSettings, ReservePercentage};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("safespend.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Ledger {
    pub default_reserve_percentage: f64,
    pub daily_limit_window_days: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        let defaults = LedgerSettings::default();
        Self {
            default_reserve_percentage: 30.0,
            daily_limit_window_days: defaults.daily_limit_window_days,
        }
    }
}

impl Ledger {
    pub fn to_engine(&self) -> Result<LedgerSettings, Box<dyn std::error::Error + Send + Sync>> {
        let percent = Decimal::try_from(self.default_reserve_percentage)?;
        Ok(LedgerSettings {
            default_reserve_percentage: ReservePercentage::new(percent)?,
            daily_limit_window_days: self.daily_limit_window_days,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
    pub daily_limit_ttl_secs: u64,
    pub spending_history_ttl_secs: u64,
    pub transactions_ttl_secs: u64,
}

impl Default for Cache {
    fn default() -> Self {
        let ttls = CacheTtls::default();
        Self {
            daily_limit_ttl_secs: ttls.daily_limit.as_secs(),
            spending_history_ttl_secs: ttls.spending_history.as_secs(),
            transactions_ttl_secs: ttls.transactions.as_secs(),
        }
    }
}

impl Cache {
    pub fn to_engine(&self) -> CacheTtls {
        CacheTtls {
            daily_limit: Duration::from_secs(self.daily_limit_ttl_secs),
            spending_history: Duration::from_secs(self.spending_history_ttl_secs),
            transactions: Duration::from_secs(self.transactions_ttl_secs),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub ledger: Ledger,
    pub cache: Cache,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("SAFESPEND").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
