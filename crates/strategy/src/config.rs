use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::{Error, Result};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// type = "momentum"
/// name = "AAPL momentum 10"
/// symbol = "AAPL"
///
/// [strategy.params]
/// window = 10
///
/// [[strategy]]
/// type = "arbitrage"
/// name = "AAPL vs SPY"
/// symbol = "AAPL"
/// hedge = "SPY"
///
/// [strategy.params]
/// threshold = 0.005
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy type identifier: "momentum", "mean_reversion" or "arbitrage".
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Human-readable name shown in logs and dashboard.
    pub name: String,
    /// Symbol the strategy watches; leg A for arbitrage.
    pub symbol: String,
    /// Leg B of an arbitrage pair. Ignored by single-symbol strategies.
    #[serde(default)]
    pub hedge: Option<String>,
    /// Strategy-specific parameters.
    #[serde(default)]
    pub params: HashMap<String, toml::Value>,
}

impl StrategyFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

impl StrategyConfig {
    pub(crate) fn param_usize(&self, key: &str, default: usize) -> Result<usize> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| {
                    Error::invalid_strategy(
                        &self.name,
                        format!("param '{key}' must be a non-negative integer, got {v}"),
                    )
                }),
        }
    }

    /// Floats and integers are both accepted (`std_dev = 2`).
    pub(crate) fn param_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.params.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_float()
                .or_else(|| v.as_integer().map(|i| i as f64))
                .ok_or_else(|| {
                    Error::invalid_strategy(&self.name, format!("param '{key}' must be a number, got {v}"))
                }),
        }
    }
}
