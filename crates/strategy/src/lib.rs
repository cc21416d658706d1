pub mod arbitrage;
pub mod config;
pub mod indicators;
pub mod mean_reversion;
pub mod momentum;
pub mod registry;

pub use arbitrage::ArbitrageStrategy;
pub use config::{StrategyConfig, StrategyFileConfig};
pub use mean_reversion::MeanReversionStrategy;
pub use momentum::MomentumStrategy;
pub use registry::StrategySet;

use common::{Bar, SignalSeries};

/// A strategy over a single symbol's bar sequence.
///
/// Implementations hold only immutable parameters, so `generate_signals`
/// may be called repeatedly and from several tasks at once.
pub trait Strategy: Send + Sync {
    /// Human-readable name of this strategy instance.
    fn name(&self) -> &str;

    /// The symbol this strategy watches (e.g. "AAPL").
    fn symbol(&self) -> &str;

    /// Bars required before a signal other than `Hold` is possible.
    fn warmup_bars(&self) -> usize;

    /// Map bars (ascending by time, no duplicate timestamps) to a series
    /// with exactly one point per bar.
    fn generate_signals(&self, bars: &[Bar]) -> SignalSeries;
}

pub(crate) fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
