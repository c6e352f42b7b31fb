//! Signal repository. Signals are immutable once written; the newest one
//! per symbol drives the cooldown check.

use anyhow::Result;
use apex_trade_core::{Signal, SignalStore};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn signal_from_row(row: &PgRow) -> Result<Signal> {
    Ok(Signal {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        symbol: row.try_get("symbol")?,
        direction: row.try_get::<String, _>("direction")?.parse()?,
        confidence: row.try_get("confidence")?,
        rationale: row.try_get("rationale")?,
        model_name: row.try_get("model_name")?,
        confluence_score: row.try_get("confluence_score")?,
        snapshot: row.try_get("snapshot")?,
    })
}

#[async_trait]
impl SignalStore for SignalRepository {
    async fn insert(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO signals
                (id, timestamp, symbol, direction, confidence, rationale,
                 model_name, confluence_score, snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(signal.id)
        .bind(signal.timestamp)
        .bind(&signal.symbol)
        .bind(signal.direction.as_str())
        .bind(signal.confidence)
        .bind(&signal.rationale)
        .bind(&signal.model_name)
        .bind(signal.confluence_score)
        .bind(&signal.snapshot)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<Signal>> {
        let row = sqlx::query(
            r"
            SELECT id, timestamp, symbol, direction, confidence, rationale,
                   model_name, confluence_score, snapshot
            FROM signals
            WHERE symbol = $1
            ORDER BY timestamp DESC
            LIMIT 1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(signal_from_row).transpose()
    }
}
