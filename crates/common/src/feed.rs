use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Bar, Result};

/// Push-based live bar subscription.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Stream bars for `symbol` into `bar_tx` until the receiver is dropped.
    ///
    /// Implementations reconnect on their own; an `Err` means the feed gave
    /// up entirely.
    async fn subscribe(&self, symbol: &str, bar_tx: mpsc::Sender<Bar>) -> Result<()>;
}
