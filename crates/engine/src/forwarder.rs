use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::{Bar, BarStore, MarketDataFeed};

const APPEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives live bars for one symbol and persists each one to the store.
///
/// Persistence is fire-and-forget: a failed append is logged and the next
/// bar is still forwarded.
pub struct BarForwarder {
    symbol: String,
    bar_rx: mpsc::Receiver<Bar>,
    store: Arc<dyn BarStore>,
}

impl BarForwarder {
    pub fn new(symbol: impl Into<String>, bar_rx: mpsc::Receiver<Bar>, store: Arc<dyn BarStore>) -> Self {
        Self {
            symbol: symbol.into(),
            bar_rx,
            store,
        }
    }

    /// Run the forwarding loop. Call from `tokio::spawn`. Returns the number
    /// of bars persisted once the feed side closes.
    pub async fn run(mut self) -> usize {
        info!(symbol = %self.symbol, "BarForwarder running");
        let mut persisted = 0;
        while let Some(bar) = self.bar_rx.recv().await {
            let append = self.store.append(&self.symbol, std::slice::from_ref(&bar));
            match tokio::time::timeout(APPEND_TIMEOUT, append).await {
                Ok(Ok(())) => persisted += 1,
                Ok(Err(e)) => error!(symbol = %self.symbol, time = %bar.time, error = %e, "Failed to persist bar"),
                Err(_) => error!(symbol = %self.symbol, time = %bar.time, "Bar append timed out"),
            }
        }
        warn!(symbol = %self.symbol, "BarForwarder: feed channel closed");
        persisted
    }
}

/// Subscribe `feed` to `symbol` and forward every bar into `store`.
/// Spawns two tasks; the forwarder ends when the feed stops.
pub fn spawn_live_ingest(
    symbol: String,
    feed: Arc<dyn MarketDataFeed>,
    store: Arc<dyn BarStore>,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<usize>) {
    let (bar_tx, bar_rx) = mpsc::channel(256);
    let forwarder = BarForwarder::new(symbol.clone(), bar_rx, store);

    let feed_task = tokio::spawn(async move {
        if let Err(e) = feed.subscribe(&symbol, bar_tx).await {
            error!(symbol = %symbol, error = %e, "Market data feed stopped");
        }
    });
    let forward_task = tokio::spawn(forwarder.run());
    (feed_task, forward_task)
}
