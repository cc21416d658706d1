use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use common::{Bar, Error, Result};

use super::stream::volume_to_u64;

const DATA_URL: &str = "https://data.alpaca.markets";
const PAGE_LIMIT: u32 = 10_000;

/// Alpaca REST client for historical one-minute bars. Used to seed the bar
/// store before signals are computed in batch mode.
pub struct AlpacaHistory {
    api_key: String,
    secret: String,
    /// Data feed to read history from ("iex" or "sip").
    feed: String,
    base_url: String,
    http: Client,
}

impl AlpacaHistory {
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        feed: impl Into<String>,
    ) -> Result<Self> {
        Self::with_base_url(api_key, secret, feed, DATA_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        feed: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            feed: feed.into(),
            base_url: base_url.into(),
            http,
        })
    }

    /// All one-minute bars for `symbol` from `start` until now, following
    /// pagination to the end.
    pub async fn fetch_bars(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Bar>> {
        info!(symbol = %symbol, since = %start, "Fetching historical bars");
        let url = format!("{}/v2/stocks/{symbol}/bars", self.base_url);
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let limit = PAGE_LIMIT.to_string();

        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let query = self.page_query(&start, &limit, page_token.as_deref());

            let resp = self
                .http
                .get(&url)
                .header("APCA-API-KEY-ID", &self.api_key)
                .header("APCA-API-SECRET-KEY", &self.secret)
                .query(&query)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;

            let status = resp.status();
            let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
            if !status.is_success() {
                return Err(Error::Http(format!("HTTP {status}: {body}")));
            }

            let page: BarsPage = serde_json::from_str(&body)?;
            debug!(symbol = %symbol, count = page.bars.len(), "Received bar page");
            bars.extend(page.bars.into_iter().map(|b| b.into_bar(symbol)));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(symbol = %symbol, count = bars.len(), "Historical bars fetched");
        Ok(bars)
    }

    fn page_query<'a>(
        &'a self,
        start: &'a str,
        limit: &'a str,
        page_token: Option<&'a str>,
    ) -> Vec<(&'static str, &'a str)> {
        let mut query = vec![
            ("timeframe", "1Min"),
            ("start", start),
            ("limit", limit),
            ("feed", self.feed.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token));
        }
        query
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct BarsPage {
    /// `null` when the range holds no bars.
    #[serde(default, deserialize_with = "null_as_empty")]
    bars: Vec<RestBar>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct RestBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl RestBar {
    fn into_bar(self, symbol: &str) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            time: self.t,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: volume_to_u64(self.v),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<RestBar>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<RestBar>>::deserialize(deserializer)?.unwrap_or_default())
}
