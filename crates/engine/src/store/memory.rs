use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{Bar, BarStore, Result};

/// In-process `BarStore`. Same upsert and range semantics as
/// `SqliteBarStore`, without a database.
#[derive(Default)]
pub struct MemoryBarStore {
    bars: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, Bar>>>,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bars held for `symbol`.
    pub async fn count(&self, symbol: &str) -> usize {
        self.bars.read().await.get(symbol).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn query(&self, symbol: &str, start: DateTime<Utc>) -> Option<Vec<Bar>> {
        let bars = self.bars.read().await;
        let found: Vec<Bar> = bars
            .get(symbol)?
            .range(start..)
            .map(|(_, bar)| bar.clone())
            .collect();
        (!found.is_empty()).then_some(found)
    }

    async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<()> {
        let mut all = self.bars.write().await;
        let series = all.entry(symbol.to_string()).or_default();
        for bar in bars {
            series.insert(bar.time, bar.clone());
        }
        Ok(())
    }
}
