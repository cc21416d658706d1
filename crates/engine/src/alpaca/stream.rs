use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use common::{Bar, Error, MarketDataFeed, Result};

const STREAM_BASE: &str = "wss://stream.data.alpaca.markets/v2";
/// A session with no frame at all for this long is treated as dead.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// Bound on the handshake and on each outgoing control message.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Alpaca market-data WebSocket stream of one-minute bars.
///
/// Authenticates, subscribes to the requested symbol's bars and pushes each
/// bar into the caller's channel. Reconnects with exponential backoff.
pub struct AlpacaStream {
    api_key: String,
    secret: String,
    url: String,
    connect_timeout: Duration,
}

impl AlpacaStream {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, feed: &str) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            url: format!("{STREAM_BASE}/{feed}"),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Run `fut` under the connect timeout; elapsing is a feed error.
    async fn bounded<T, E, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.connect_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::Feed(format!("{what}: {e}"))),
            Err(_) => Err(Error::Feed(format!(
                "{what} timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }

    async fn connect_once(&self, symbol: &str, bar_tx: &mpsc::Sender<Bar>) -> Result<()> {
        let url = Url::parse(&self.url).map_err(|e| Error::Feed(e.to_string()))?;
        let (ws_stream, _) = self.bounded("connect", connect_async(url)).await?;
        let (mut write, mut read) = ws_stream.split();

        let auth = json!({ "action": "auth", "key": self.api_key, "secret": self.secret });
        self.bounded("auth", write.send(Message::Text(auth.to_string())))
            .await?;
        let subscribe = json!({ "action": "subscribe", "bars": [symbol] });
        self.bounded("subscribe", write.send(Message::Text(subscribe.to_string())))
            .await?;

        loop {
            let msg = match tokio::time::timeout(IDLE_TIMEOUT, read.next()).await {
                Ok(Some(msg)) => msg.map_err(|e| Error::Feed(e.to_string()))?,
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::Feed(format!(
                        "no frames for {}s, assuming a dead connection",
                        IDLE_TIMEOUT.as_secs()
                    )))
                }
            };
            let text = match msg {
                Message::Text(text) => text,
                Message::Ping(payload) => {
                    self.bounded("pong", write.send(Message::Pong(payload))).await?;
                    continue;
                }
                Message::Close(_) => break,
                _ => continue,
            };

            for event in parse_messages(&text)? {
                match event {
                    StreamEvent::Bar(bar) => {
                        debug!(symbol = %bar.symbol, close = bar.close, "Received bar");
                        if bar_tx.send(bar).await.is_err() {
                            return Ok(());
                        }
                    }
                    StreamEvent::Control(msg) => info!(symbol = %symbol, msg = %msg, "Alpaca stream"),
                    StreamEvent::Error { code, msg } => {
                        return Err(Error::Feed(format!("Alpaca error {code}: {msg}")));
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MarketDataFeed for AlpacaStream {
    /// Run until `bar_tx` is closed, reconnecting on failure.
    async fn subscribe(&self, symbol: &str, bar_tx: mpsc::Sender<Bar>) -> Result<()> {
        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(60);

        loop {
            info!(symbol = %symbol, "Connecting to Alpaca bar stream");
            match self.connect_once(symbol, &bar_tx).await {
                Ok(()) => {
                    if bar_tx.is_closed() {
                        info!(symbol = %symbol, "Bar receiver dropped, leaving stream");
                        return Ok(());
                    }
                    info!(symbol = %symbol, "Stream closed cleanly");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, backoff = ?backoff, "Stream error, reconnecting");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
            if bar_tx.is_closed() {
                return Ok(());
            }
        }
    }
}

// ─── Alpaca message parsing ──────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Bar(Bar),
    Control(String),
    Error { code: i64, msg: String },
}

#[derive(Deserialize)]
#[serde(tag = "T")]
enum RawMessage {
    #[serde(rename = "b")]
    Bar {
        #[serde(rename = "S")]
        symbol: String,
        #[serde(rename = "o")]
        open: f64,
        #[serde(rename = "h")]
        high: f64,
        #[serde(rename = "l")]
        low: f64,
        #[serde(rename = "c")]
        close: f64,
        #[serde(rename = "v")]
        volume: f64,
        #[serde(rename = "t")]
        time: DateTime<Utc>,
    },
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },
    #[serde(rename = "error")]
    Error { code: i64, msg: String },
    #[serde(other)]
    Other,
}

/// Alpaca sends a JSON array of messages per frame.
fn parse_messages(text: &str) -> Result<Vec<StreamEvent>> {
    let raw: Vec<RawMessage> = serde_json::from_str(text)?;
    Ok(raw
        .into_iter()
        .filter_map(|m| match m {
            RawMessage::Bar {
                symbol,
                open,
                high,
                low,
                close,
                volume,
                time,
            } => Some(StreamEvent::Bar(Bar {
                symbol,
                time,
                open,
                high,
                low,
                close,
                volume: volume_to_u64(volume),
            })),
            RawMessage::Success { msg } => Some(StreamEvent::Control(msg)),
            RawMessage::Subscription { bars } => {
                Some(StreamEvent::Control(format!("subscribed to bars {bars:?}")))
            }
            RawMessage::Error { code, msg } => Some(StreamEvent::Error { code, msg }),
            RawMessage::Other => None,
        })
        .collect())
}

/// Negative or non-finite volumes become zero; fractional shares are dropped.
pub(crate) fn volume_to_u64(volume: f64) -> u64 {
    if volume.is_finite() && volume > 0.0 {
        volume as u64
    } else {
        0
    }
}
