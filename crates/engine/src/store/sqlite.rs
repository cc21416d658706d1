use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, warn};

use common::{Bar, BarStore, Error, Result};

/// `BarStore` backed by a SQLite table keyed on `(symbol, time_ms)`.
#[derive(Clone)]
pub struct SqliteBarStore {
    db: SqlitePool,
}

impl SqliteBarStore {
    /// Connect and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = SqlitePool::connect(database_url).await?;
        Self::from_pool(db).await
    }

    /// Wrap an existing pool, running pending migrations on it.
    pub async fn from_pool(db: SqlitePool) -> Result<Self> {
        sqlx::migrate!("../../migrations").run(&db).await?;
        Ok(Self { db })
    }

    async fn fetch(&self, symbol: &str, start: DateTime<Utc>) -> Result<Vec<Bar>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, time_ms, open, high, low, close, volume
            FROM bars
            WHERE symbol = ?1 AND time_ms >= ?2
            ORDER BY time_ms ASC
            "#,
        )
        .bind(symbol)
        .bind(start.timestamp_millis())
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().filter_map(row_to_bar).collect())
    }
}

fn row_to_bar(row: &SqliteRow) -> Option<Bar> {
    match decode_row(row) {
        Ok(bar) => Some(bar),
        Err(e) => {
            warn!(error = %e, "Skipping malformed bar row");
            None
        }
    }
}

fn decode_row(row: &SqliteRow) -> Result<Bar> {
    let symbol: String = row.try_get("symbol")?;
    let time_ms: i64 = row.try_get("time_ms")?;
    let time = Utc
        .timestamp_millis_opt(time_ms)
        .single()
        .ok_or_else(|| Error::Other(format!("time_ms {time_ms} is out of range")))?;

    let raw_volume: i64 = row.try_get("volume")?;
    let volume = u64::try_from(raw_volume).unwrap_or_else(|_| {
        warn!(symbol = %symbol, time = %time, volume = raw_volume, "Negative volume stored, reading as 0");
        0
    });

    Ok(Bar {
        symbol,
        time,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume,
    })
}

#[async_trait]
impl BarStore for SqliteBarStore {
    async fn query(&self, symbol: &str, start: DateTime<Utc>) -> Option<Vec<Bar>> {
        match self.fetch(symbol, start).await {
            Ok(bars) if bars.is_empty() => {
                warn!(symbol = %symbol, since = %start, "No bars returned");
                None
            }
            Ok(bars) => {
                debug!(symbol = %symbol, count = bars.len(), "Queried bars");
                Some(bars)
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Bar query failed");
                None
            }
        }
    }

    async fn append(&self, symbol: &str, bars: &[Bar]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO bars (symbol, time_ms, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(symbol, time_ms) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(symbol)
            .bind(bar.time.timestamp_millis())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(i64::try_from(bar.volume).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(symbol = %symbol, count = bars.len(), "Appended bars");
        Ok(())
    }
}
