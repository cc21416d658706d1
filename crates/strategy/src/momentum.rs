use tracing::debug;

use common::{Bar, Error, Indicator, Result, SignalPoint, SignalSeries, SignalValue};

use crate::indicators::MomentumIndicator;
use crate::{closes, Strategy};

/// Buys on positive momentum over `window` bars, sells on negative.
#[derive(Debug, Clone)]
pub struct MomentumStrategy {
    name: String,
    symbol: String,
    indicator: MomentumIndicator,
}

impl MomentumStrategy {
    pub const DEFAULT_WINDOW: usize = 10;

    pub fn new(name: impl Into<String>, symbol: impl Into<String>, window: usize) -> Result<Self> {
        let name = name.into();
        if window == 0 {
            return Err(Error::invalid_strategy(name, "momentum window must be at least 1"));
        }
        Ok(Self {
            name,
            symbol: symbol.into(),
            indicator: MomentumIndicator::new(window),
        })
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn warmup_bars(&self) -> usize {
        self.indicator.window + 1
    }

    fn generate_signals(&self, bars: &[Bar]) -> SignalSeries {
        let momentum = self.indicator.compute(&closes(bars));

        let points = bars
            .iter()
            .zip(momentum)
            .map(|(bar, momentum)| SignalPoint {
                time: bar.time,
                close: bar.close,
                indicator: Indicator::Momentum { momentum },
                signal: SignalValue::from_sign(momentum),
            })
            .collect();

        debug!(strategy = %self.name, window = self.indicator.window, bars = bars.len(), "Generated momentum signals");
        SignalSeries::new(&self.name, points)
    }
}
