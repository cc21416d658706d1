pub mod bollinger;
pub mod momentum;

pub use bollinger::{BandPoint, BollingerBands};
pub use momentum::MomentumIndicator;

/// `Some(v)` only for finite values; NaN and infinities become missing.
pub(crate) fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
