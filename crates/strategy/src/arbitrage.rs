use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use common::{Bar, Error, Indicator, Result, SignalPoint, SignalSeries, SignalValue};

use crate::indicators::finite;

/// Relative-value strategy over two symbols.
///
/// Bars are inner-joined on exactly equal timestamps; timestamps present on
/// only one side are dropped without notice. For each joined row
/// `spread = (close_a - close_b) / close_b`:
/// - `spread >  threshold` → `Buy`  (buy A, sell B)
/// - `spread < -threshold` → `Sell` (sell A, buy B)
#[derive(Debug, Clone)]
pub struct ArbitrageStrategy {
    name: String,
    symbol_a: String,
    symbol_b: String,
    threshold: f64,
}

impl ArbitrageStrategy {
    pub const DEFAULT_THRESHOLD: f64 = 0.02;

    pub fn new(
        name: impl Into<String>,
        symbol_a: impl Into<String>,
        symbol_b: impl Into<String>,
        threshold: f64,
    ) -> Result<Self> {
        let name = name.into();
        let symbol_a = symbol_a.into();
        let symbol_b = symbol_b.into();
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(Error::invalid_strategy(
                name,
                format!("threshold must be a positive number, got {threshold}"),
            ));
        }
        if symbol_a == symbol_b {
            return Err(Error::invalid_strategy(
                name,
                format!("both legs are '{symbol_a}'"),
            ));
        }
        Ok(Self {
            name,
            symbol_a,
            symbol_b,
            threshold,
        })
    }

    /// The same pair seen from the other leg: symbols swapped, threshold negated.
    ///
    /// Every non-hold signal of `mirrored().generate_signals(b, a)` is the
    /// inverse of the matching signal of `generate_signals(a, b)`.
    pub fn mirrored(&self) -> Self {
        Self {
            name: format!("{} (mirrored)", self.name),
            symbol_a: self.symbol_b.clone(),
            symbol_b: self.symbol_a.clone(),
            threshold: -self.threshold,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `(A, B)`: the traded leg and the reference leg.
    pub fn legs(&self) -> (&str, &str) {
        (&self.symbol_a, &self.symbol_b)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Join `bars_a` and `bars_b` on time and score each joined row.
    /// The result follows the order of `bars_a`; no common timestamps gives
    /// an empty series.
    pub fn generate_signals(&self, bars_a: &[Bar], bars_b: &[Bar]) -> SignalSeries {
        let by_time: HashMap<DateTime<Utc>, f64> =
            bars_b.iter().map(|b| (b.time, b.close)).collect();

        let points: Vec<SignalPoint> = bars_a
            .iter()
            .filter_map(|a| {
                let close_b = *by_time.get(&a.time)?;
                let spread = if close_b == 0.0 {
                    None
                } else {
                    finite((a.close - close_b) / close_b)
                };
                Some(SignalPoint {
                    time: a.time,
                    close: a.close,
                    indicator: Indicator::Spread {
                        close_a: a.close,
                        close_b,
                        spread,
                    },
                    signal: spread_signal(spread, self.threshold),
                })
            })
            .collect();

        debug!(
            strategy = %self.name,
            a = %self.symbol_a,
            b = %self.symbol_b,
            threshold = self.threshold,
            joined = points.len(),
            "Generated arbitrage signals"
        );
        SignalSeries::new(&self.name, points)
    }
}

/// Sell is tested first so it wins when both bands overlap, which only
/// happens with a negative (mirrored) threshold.
fn spread_signal(spread: Option<f64>, threshold: f64) -> SignalValue {
    match spread {
        Some(s) if s < -threshold => SignalValue::Sell,
        Some(s) if s > threshold => SignalValue::Buy,
        _ => SignalValue::Hold,
    }
}
