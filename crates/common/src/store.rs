use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Bar, Result};

/// Range-query + append access to persisted bars.
///
/// `SqliteBarStore` backs production runs; `MemoryBarStore` backs tests.
/// Both live in `crates/engine`.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Bars for `symbol` with `time >= start`, ascending by time.
    ///
    /// Returns `None` on any failure (connectivity, malformed rows) and when
    /// nothing matched. Callers treat `None` as "no new data this cycle".
    async fn query(&self, symbol: &str, start: DateTime<Utc>) -> Option<Vec<Bar>>;

    /// Persist bars. A bar with the same `(symbol, time)` as a stored one
    /// replaces it.
    async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<()>;
}
