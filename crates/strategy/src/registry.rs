use std::collections::HashSet;

use tracing::info;

use common::{Bar, Error, Result, SignalSeries};

use crate::config::{StrategyConfig, StrategyFileConfig};
use crate::{ArbitrageStrategy, MeanReversionStrategy, MomentumStrategy, Strategy};

/// All configured strategy instances. Built once at startup and shared
/// read-only between the streaming loop and the dashboard API.
pub struct StrategySet {
    single: Vec<Box<dyn Strategy>>,
    pairs: Vec<ArbitrageStrategy>,
}

impl StrategySet {
    pub fn new(single: Vec<Box<dyn Strategy>>, pairs: Vec<ArbitrageStrategy>) -> Self {
        Self { single, pairs }
    }

    /// Build from config, failing on the first unknown type or invalid
    /// parameter.
    pub fn from_config(file_cfg: &StrategyFileConfig) -> Result<Self> {
        let mut single: Vec<Box<dyn Strategy>> = Vec::new();
        let mut pairs = Vec::new();
        let mut names = HashSet::new();

        for cfg in &file_cfg.strategies {
            if !names.insert(cfg.name.as_str()) {
                return Err(Error::invalid_strategy(&cfg.name, "duplicate strategy name"));
            }
            match build_strategy(cfg)? {
                Built::Single(strategy) => {
                    info!(name = %strategy.name(), symbol = %strategy.symbol(), "Registered strategy");
                    single.push(strategy);
                }
                Built::Pair(arb) => {
                    let (a, b) = arb.legs();
                    info!(name = %arb.name(), a = %a, b = %b, "Registered arbitrage pair");
                    pairs.push(arb);
                }
            }
        }

        Ok(Self { single, pairs })
    }

    /// Every symbol referenced by any strategy, in first-seen order.
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let single = self.single.iter().map(|s| s.symbol());
        let legs = self.pairs.iter().flat_map(|p| {
            let (a, b) = p.legs();
            [a, b]
        });
        single
            .chain(legs)
            .filter(|s| seen.insert(*s))
            .map(str::to_string)
            .collect()
    }

    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a dyn Strategy> + 'a {
        self.single
            .iter()
            .filter(move |s| s.symbol() == symbol)
            .map(|s| -> &'a dyn Strategy { &**s })
    }

    /// Longest warm-up among the single-symbol strategies on `symbol`.
    /// A pair leg needs one bar.
    pub fn warmup_bars(&self, symbol: &str) -> usize {
        self.for_symbol(symbol)
            .map(|s| s.warmup_bars())
            .max()
            .unwrap_or(1)
            .max(1)
    }

    pub fn pairs(&self) -> &[ArbitrageStrategy] {
        &self.pairs
    }

    /// Pairs whose reference leg (B) is `symbol`. The tick task of leg B
    /// evaluates these once leg A has data.
    pub fn pairs_with_reference<'a>(
        &'a self,
        symbol: &'a str,
    ) -> impl Iterator<Item = &'a ArbitrageStrategy> + 'a {
        self.pairs.iter().filter(move |p| p.legs().1 == symbol)
    }

    /// Run every single-symbol strategy for `symbol` over `bars`.
    pub fn run_for_symbol(&self, symbol: &str, bars: &[Bar]) -> Vec<SignalSeries> {
        self.for_symbol(symbol)
            .map(|s| s.generate_signals(bars))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.single.len() + self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Strategy builders ────────────────────────────────────────────────────────

enum Built {
    Single(Box<dyn Strategy>),
    Pair(ArbitrageStrategy),
}

fn build_strategy(cfg: &StrategyConfig) -> Result<Built> {
    match cfg.strategy_type.as_str() {
        "momentum" => {
            let window = cfg.param_usize("window", MomentumStrategy::DEFAULT_WINDOW)?;
            Ok(Built::Single(Box::new(MomentumStrategy::new(
                &cfg.name,
                &cfg.symbol,
                window,
            )?)))
        }
        "mean_reversion" => {
            let window = cfg.param_usize("window", MeanReversionStrategy::DEFAULT_WINDOW)?;
            let std_dev = cfg.param_f64("std_dev", MeanReversionStrategy::DEFAULT_STD_DEV)?;
            Ok(Built::Single(Box::new(MeanReversionStrategy::new(
                &cfg.name,
                &cfg.symbol,
                window,
                std_dev,
            )?)))
        }
        "arbitrage" => {
            let hedge = cfg.hedge.as_deref().ok_or_else(|| {
                Error::invalid_strategy(&cfg.name, "arbitrage requires a 'hedge' symbol")
            })?;
            let threshold = cfg.param_f64("threshold", ArbitrageStrategy::DEFAULT_THRESHOLD)?;
            Ok(Built::Pair(ArbitrageStrategy::new(
                &cfg.name,
                &cfg.symbol,
                hedge,
                threshold,
            )?))
        }
        other => Err(Error::invalid_strategy(
            &cfg.name,
            format!("unknown type '{other}'"),
        )),
    }
}
