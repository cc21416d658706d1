use tracing::debug;

use common::{Bar, Error, Indicator, Result, SignalPoint, SignalSeries, SignalValue};

use crate::indicators::BollingerBands;
use crate::{closes, Strategy};

/// Bollinger-band mean reversion: buy below the lower band (oversold),
/// sell above the upper band (overbought). Touching a band is not a cross.
#[derive(Debug, Clone)]
pub struct MeanReversionStrategy {
    name: String,
    symbol: String,
    bands: BollingerBands,
}

impl MeanReversionStrategy {
    pub const DEFAULT_WINDOW: usize = 20;
    pub const DEFAULT_STD_DEV: f64 = 2.0;

    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        window: usize,
        std_dev: f64,
    ) -> Result<Self> {
        let name = name.into();
        if window == 0 {
            return Err(Error::invalid_strategy(name, "mean-reversion window must be at least 1"));
        }
        if !(std_dev.is_finite() && std_dev > 0.0) {
            return Err(Error::invalid_strategy(
                name,
                format!("std_dev must be a positive number, got {std_dev}"),
            ));
        }
        Ok(Self {
            name,
            symbol: symbol.into(),
            bands: BollingerBands::new(window, std_dev),
        })
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn warmup_bars(&self) -> usize {
        self.bands.window
    }

    fn generate_signals(&self, bars: &[Bar]) -> SignalSeries {
        let rows = self.bands.compute(&closes(bars));

        let points = bars
            .iter()
            .zip(rows)
            .map(|(bar, row)| {
                let signal = match (row.lower, row.upper) {
                    (Some(lower), _) if bar.close < lower => SignalValue::Buy,
                    (_, Some(upper)) if bar.close > upper => SignalValue::Sell,
                    _ => SignalValue::Hold,
                };
                SignalPoint {
                    time: bar.time,
                    close: bar.close,
                    indicator: Indicator::Bands {
                        sma: row.sma,
                        std: row.std,
                        upper_band: row.upper,
                        lower_band: row.lower,
                    },
                    signal,
                }
            })
            .collect();

        debug!(strategy = %self.name, window = self.bands.window, bars = bars.len(), "Generated mean-reversion signals");
        SignalSeries::new(&self.name, points)
    }
}
