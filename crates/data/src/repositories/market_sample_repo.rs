//! Market sample repository.
//!
//! Append-only time series of price observations. Re-ingesting the same
//! sample is a no-op, so the collector can safely replay on restart.

use anyhow::Result;
use apex_trade_core::{MarketDataStore, MarketSample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct MarketSampleRepository {
    pool: PgPool,
}

impl MarketSampleRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketDataStore for MarketSampleRepository {
    async fn append(&self, sample: &MarketSample) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO market_samples (symbol, timestamp, price, volume, high, low, trade_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (symbol, timestamp) DO NOTHING
            ",
        )
        .bind(&sample.symbol)
        .bind(sample.timestamp)
        .bind(sample.price)
        .bind(sample.volume)
        .bind(sample.high)
        .bind(sample.low)
        .bind(sample.trade_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn since(&self, symbol: &str, since: DateTime<Utc>) -> Result<Vec<MarketSample>> {
        let rows = sqlx::query(
            r"
            SELECT symbol, timestamp, price, volume, high, low, trade_count
            FROM market_samples
            WHERE symbol = $1 AND timestamp >= $2
            ORDER BY timestamp ASC
            ",
        )
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(MarketSample {
                    symbol: row.try_get("symbol")?,
                    timestamp: row.try_get("timestamp")?,
                    price: row.try_get("price")?,
                    volume: row.try_get("volume")?,
                    high: row.try_get("high")?,
                    low: row.try_get("low")?,
                    trade_count: row.try_get("trade_count")?,
                })
            })
            .collect()
    }
}
