use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, RunMode};

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub run_mode: RunMode,

    // Alpaca market data credentials
    pub alpaca_api_key: String,
    pub alpaca_secret: String,
    /// Stream feed name: "iex" (free) or "sip".
    pub alpaca_feed: String,

    // Dashboard
    pub dashboard_token: String,
    pub dashboard_port: u16,
    pub dashboard_lookback_mins: i64,

    // Database
    pub database_url: String,

    // Strategy config file path
    pub strategy_config_path: String,

    // Streaming loop
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub buffer_capacity: usize,
    pub initial_lookback_mins: i64,
    pub fetch_overlap_mins: i64,

    // Batch mode
    pub history_days: i64,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        // .env is optional
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map. `from_env` delegates here.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let env = Env(vars);

        let run_mode = match env.optional("RUN_MODE").map(|v| v.to_lowercase()).as_deref() {
            None | Some("live") => RunMode::Live,
            Some("batch") => RunMode::Batch,
            Some(other) => {
                return Err(Error::Config(format!(
                    "RUN_MODE must be 'live' or 'batch', got: '{other}'"
                )))
            }
        };

        let cfg = Config {
            run_mode,
            alpaca_api_key: env.required("ALPACA_API_KEY")?,
            alpaca_secret: env.required("ALPACA_SECRET_KEY")?,
            alpaca_feed: env.optional("ALPACA_FEED").unwrap_or_else(|| "iex".to_string()),
            dashboard_token: env.required("DASHBOARD_TOKEN")?,
            dashboard_port: env.parsed("DASHBOARD_PORT", 8050)?,
            dashboard_lookback_mins: env.positive("DASHBOARD_LOOKBACK_MINS", 60)?,
            database_url: env
                .optional("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://sigwatch.db?mode=rwc".to_string()),
            strategy_config_path: env
                .optional("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
            poll_interval: Duration::from_secs(env.positive("POLL_INTERVAL_SECS", 60)?),
            fetch_timeout: Duration::from_secs(env.positive("FETCH_TIMEOUT_SECS", 10)?),
            buffer_capacity: env.positive("BUFFER_CAPACITY", 100)?,
            initial_lookback_mins: env.positive("INITIAL_LOOKBACK_MINS", 120)?,
            fetch_overlap_mins: env.parsed("FETCH_OVERLAP_MINS", 5)?,
            history_days: env.positive("HISTORY_DAYS", 5)?,
        };

        if cfg.fetch_overlap_mins < 0 {
            return Err(Error::Config("FETCH_OVERLAP_MINS must not be negative".into()));
        }
        Ok(cfg)
    }
}

struct Env(HashMap<String, String>);

impl Env {
    fn optional(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| {
            Error::Config(format!(
                "Required environment variable '{key}' is not set. Check your .env file."
            ))
        })
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("{key} is not a valid number: '{raw}'"))),
        }
    }

    fn positive<T: FromStr + PartialOrd + Default>(&self, key: &str, default: T) -> Result<T> {
        let value = self.parsed(key, default)?;
        if value <= T::default() {
            return Err(Error::Config(format!("{key} must be greater than zero")));
        }
        Ok(value)
    }
}
