//! Risk event repository. Append-only audit trail of blocked trades and
//! stop-loss activations.

use anyhow::Result;
use apex_trade_core::{RiskEvent, RiskEventSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct RiskEventRepository {
    pool: PgPool,
}

impl RiskEventRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Events for `symbol` at or after `since`, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn since(&self, symbol: &str, since: DateTime<Utc>) -> Result<Vec<RiskEvent>> {
        let rows = sqlx::query(
            r"
            SELECT id, timestamp, symbol, event_type, detail, signal_id
            FROM risk_events
            WHERE symbol = $1 AND timestamp >= $2
            ORDER BY timestamp DESC
            ",
        )
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RiskEvent {
                    id: row.try_get("id")?,
                    timestamp: row.try_get("timestamp")?,
                    symbol: row.try_get("symbol")?,
                    event_type: row.try_get::<String, _>("event_type")?.parse()?,
                    detail: row.try_get("detail")?,
                    signal_id: row.try_get("signal_id")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RiskEventSink for RiskEventRepository {
    async fn record(&self, event: &RiskEvent) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO risk_events (id, timestamp, symbol, event_type, detail, signal_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(event.id)
        .bind(event.timestamp)
        .bind(&event.symbol)
        .bind(event.event_type.as_str())
        .bind(&event.detail)
        .bind(event.signal_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
