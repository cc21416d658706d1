use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV observation for a single symbol.
///
/// `low <= {open, close} <= high` is expected from upstream data but never
/// enforced; nothing downstream relies on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    /// Bar start time. Unique per symbol within any ordered sequence.
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Bar with every price set to `close`. Handy for indicator inputs where
    /// only the close matters.
    pub fn flat(symbol: impl Into<String>, time: DateTime<Utc>, close: f64) -> Self {
        Self {
            symbol: symbol.into(),
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }
}

/// Ternary trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum SignalValue {
    Sell,
    #[default]
    Hold,
    Buy,
}

impl SignalValue {
    /// `Buy` for positive values, `Sell` for negative, `Hold` for zero or
    /// a missing value.
    pub fn from_sign(value: Option<f64>) -> Self {
        match value {
            Some(v) if v > 0.0 => SignalValue::Buy,
            Some(v) if v < 0.0 => SignalValue::Sell,
            _ => SignalValue::Hold,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            SignalValue::Sell => -1,
            SignalValue::Hold => 0,
            SignalValue::Buy => 1,
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            SignalValue::Sell => SignalValue::Buy,
            SignalValue::Hold => SignalValue::Hold,
            SignalValue::Buy => SignalValue::Sell,
        }
    }
}

impl From<SignalValue> for i8 {
    fn from(value: SignalValue) -> Self {
        value.as_i8()
    }
}

impl TryFrom<i8> for SignalValue {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(SignalValue::Sell),
            0 => Ok(SignalValue::Hold),
            1 => Ok(SignalValue::Buy),
            other => Err(format!("signal must be -1, 0 or 1, got {other}")),
        }
    }
}

impl std::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalValue::Sell => write!(f, "SELL"),
            SignalValue::Hold => write!(f, "HOLD"),
            SignalValue::Buy => write!(f, "BUY"),
        }
    }
}

/// Strategy-specific indicator values attached to one row of a series.
/// `None` marks a value that is undefined (warm-up rows, degenerate inputs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Indicator {
    Momentum {
        momentum: Option<f64>,
    },
    Bands {
        sma: Option<f64>,
        std: Option<f64>,
        upper_band: Option<f64>,
        lower_band: Option<f64>,
    },
    Spread {
        close_a: f64,
        close_b: f64,
        spread: Option<f64>,
    },
}

/// One row of a [`SignalSeries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub time: DateTime<Utc>,
    pub close: f64,
    pub indicator: Indicator,
    pub signal: SignalValue,
}

/// Output of a strategy: one point per input bar (or per joined row for
/// pair strategies), in the same time order as the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    pub strategy: String,
    pub points: Vec<SignalPoint>,
}

impl SignalSeries {
    pub fn new(strategy: impl Into<String>, points: Vec<SignalPoint>) -> Self {
        Self {
            strategy: strategy.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&SignalPoint> {
        self.points.last()
    }

    pub fn signals(&self) -> Vec<SignalValue> {
        self.points.iter().map(|p| p.signal).collect()
    }

    /// Last `n` rows, oldest first.
    pub fn tail(&self, n: usize) -> &[SignalPoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }
}

/// Latest signal of one strategy, emitted by the streaming loop after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    pub symbol: String,
    pub strategy: String,
    pub time: DateTime<Utc>,
    pub signal: SignalValue,
    pub indicator: Indicator,
}

impl SignalUpdate {
    pub fn from_point(symbol: impl Into<String>, strategy: impl Into<String>, point: &SignalPoint) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
            time: point.time,
            signal: point.signal,
            indicator: point.indicator.clone(),
        }
    }
}

/// How the process runs after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Backfill history, compute signals once, exit.
    Batch,
    /// Stream bars and recompute signals on a fixed period.
    Live,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Batch => write!(f, "batch"),
            RunMode::Live => write!(f, "live"),
        }
    }
}
