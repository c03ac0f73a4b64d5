use std::path::Path;

use chrono::NaiveDate;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::strategy::{BuyAndHoldParams, ShortOnlyParams, StrategyConfig};
use crate::Result;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Dow Jones constituents the classifier was trained on
pub const DEFAULT_TICKERS: [&str; 28] = [
    "AAPL", "AXP", "BA", "CAT", "CSCO", "CVX", "DD", "DIS", "GE", "HD", "IBM", "INTC", "JNJ",
    "JPM", "KO", "MCD", "MMM", "MRK", "MSFT", "NKE", "PFE", "PG", "TRV", "UNH", "UTX", "VZ",
    "WMT", "XOM",
];

/// Backtest settings
///
/// Read from `config/default.toml` (optional) and overridden by
/// `TRENDBOT__*` environment variables, e.g. `TRENDBOT__TARGET__KIND=long_only`
/// or `TRENDBOT__TICKERS=AAPL,MSFT`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model: String,
    pub feature_set: String,
    pub tickers: Vec<String>,
    /// Skip classifier results reported before this date
    pub start_date: Option<NaiveDate>,
    /// Capital the trade-log replay starts from
    pub initial_capital: f64,
    pub target: StrategyConfig,
    pub benchmark: StrategyConfig,
    /// Write every run's trades to the `trade_log` table
    pub persist_trades: bool,
    /// Expiry of cached feeds in Redis, none keeps them forever
    pub cache_ttl_secs: Option<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "CNNv0".to_string(),
            feature_set: "processed technical indicators (20 days)".to_string(),
            tickers: DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect(),
            start_date: None,
            initial_capital: 10000.0,
            target: StrategyConfig::ShortOnly(ShortOnlyParams::default()),
            benchmark: StrategyConfig::BuyAndHold(BuyAndHoldParams::default()),
            persist_trades: false,
            cache_ttl_secs: None,
        }
    }
}

impl AppConfig {
    /// Load from a TOML file (missing file is fine) plus the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("TRENDBOT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("tickers"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse settings from TOML text, without the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tickers.is_empty() {
            return Err(BacktestError::InvalidInput("no tickers configured".to_string()));
        }
        if self.initial_capital <= 0.0 {
            return Err(BacktestError::InvalidInput(format!(
                "initial capital must be positive, got {}",
                self.initial_capital
            )));
        }
        Ok(())
    }
}

/// Connection settings taken from the process environment (`.env` included)
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `DATABASE_URL` wins; otherwise the URL is assembled from
    /// `DB_USER`, `DB_PASSWORD`, `DB_HOST`, `DB_NAME` and `DB_PORT` (default 5432).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let redis_url = lookup("REDIS_URL").filter(|url| !url.is_empty());

        if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            return Ok(Self {
                database_url: url,
                redis_url,
            });
        }

        let require = |name: &str| {
            lookup(name).ok_or_else(|| {
                BacktestError::InvalidInput(format!("{} or DATABASE_URL must be set", name))
            })
        };

        let user = require("DB_USER")?;
        let password = lookup("DB_PASSWORD").unwrap_or_default();
        let host = require("DB_HOST")?;
        let name = require("DB_NAME")?;
        let port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());

        let credentials = if password.is_empty() {
            user
        } else {
            format!("{}:{}", user, password)
        };

        Ok(Self {
            database_url: format!("postgres://{}@{}:{}/{}", credentials, host, port, name),
            redis_url,
        })
    }
}
