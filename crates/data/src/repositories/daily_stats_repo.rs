//! Daily stats repository. One row per trading day; the halt flag on the
//! current day is what the risk gate reads.

use anyhow::{Context, Result};
use apex_trade_core::{DailyStats, DailyStatsStore};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct DailyStatsRepository {
    pool: PgPool,
}

impl DailyStatsRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyStatsStore for DailyStatsRepository {
    async fn get_or_create(
        &self,
        day: NaiveDate,
        starting_balance: Decimal,
    ) -> Result<DailyStats> {
        // A row created first by a halt command or an overnight order-sync
        // fill carries starting_balance 0; the first cycle repairs it here
        // so pnl fractions are measured against real capital.
        sqlx::query(
            r"
            INSERT INTO daily_stats (day, starting_balance)
            VALUES ($1, $2)
            ON CONFLICT (day) DO UPDATE
            SET starting_balance = EXCLUDED.starting_balance
            WHERE daily_stats.starting_balance = 0
            ",
        )
        .bind(day)
        .bind(starting_balance)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r"
            SELECT day, starting_balance, realized_pnl, trade_count,
                   is_halted, halt_reason, limit_overridden
            FROM daily_stats
            WHERE day = $1
            ",
        )
        .bind(day)
        .fetch_optional(&self.pool)
        .await?
        .context("daily stats row missing after upsert")?;

        Ok(DailyStats {
            day: row.try_get("day")?,
            starting_balance: row.try_get("starting_balance")?,
            realized_pnl: row.try_get("realized_pnl")?,
            trade_count: row.try_get("trade_count")?,
            is_halted: row.try_get("is_halted")?,
            halt_reason: row.try_get("halt_reason")?,
            limit_overridden: row.try_get("limit_overridden")?,
        })
    }

    async fn set_halted(&self, day: NaiveDate, halted: bool, reason: Option<&str>) -> Result<()> {
        // A resume marks the day's limit as overridden, so the gate does
        // not re-block on the breach the operator just cleared. The flag
        // stays set for the rest of the day.
        sqlx::query(
            r"
            INSERT INTO daily_stats (day, starting_balance, is_halted, halt_reason, limit_overridden)
            VALUES ($1, 0, $2, $3, NOT $2)
            ON CONFLICT (day) DO UPDATE
            SET is_halted = EXCLUDED.is_halted,
                halt_reason = EXCLUDED.halt_reason,
                limit_overridden = daily_stats.limit_overridden OR EXCLUDED.limit_overridden
            ",
        )
        .bind(day)
        .bind(halted)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
