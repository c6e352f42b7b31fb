//! Order repository.
//!
//! Status transitions guard against double-settlement in SQL: every update
//! matches `status = 'PENDING'`, so a terminal order can never change
//! again no matter how many times a reconciliation pass retries it.
//! `apply_fill` runs order, position, and daily-stats writes in one
//! transaction.

use anyhow::{bail, Result};
use apex_trade_core::{Fill, Order, OrderStore, Position};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        signal_id: row.try_get("signal_id")?,
        symbol: row.try_get("symbol")?,
        side: row.try_get::<String, _>("side")?.parse()?,
        order_type: row.try_get::<String, _>("order_type")?.parse()?,
        requested_amount: row.try_get("requested_amount")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        idempotency_key: row.try_get("idempotency_key")?,
        exchange_order_id: row.try_get("exchange_order_id")?,
        executed_price: row.try_get("executed_price")?,
        executed_amount: row.try_get("executed_amount")?,
        fee: row.try_get("fee")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        executed_at: row.try_get("executed_at")?,
    })
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO orders
                (id, signal_id, symbol, side, order_type, requested_amount,
                 status, idempotency_key, exchange_order_id, executed_price,
                 executed_amount, fee, error, created_at, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(order.id)
        .bind(order.signal_id)
        .bind(&order.symbol)
        .bind(order.side.as_str())
        .bind(order.order_type.as_str())
        .bind(order.requested_amount)
        .bind(order.status.as_str())
        .bind(&order.idempotency_key)
        .bind(&order.exchange_order_id)
        .bind(order.executed_price)
        .bind(order.executed_amount)
        .bind(order.fee)
        .bind(&order.error)
        .bind(order.created_at)
        .bind(order.executed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_exchange_order_id(&self, order_id: Uuid, exchange_order_id: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE orders SET exchange_order_id = $2
            WHERE id = $1 AND status = 'PENDING'
            ",
        )
        .bind(order_id)
        .bind(exchange_order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, order_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE orders SET status = 'FAILED', error = $2
            WHERE id = $1 AND status = 'PENDING'
            ",
        )
        .bind(order_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_cancelled(&self, order_id: Uuid) -> Result<()> {
        sqlx::query(
            r"
            UPDATE orders SET status = 'CANCELLED'
            WHERE id = $1 AND status = 'PENDING'
            ",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_fill(
        &self,
        order_id: Uuid,
        fill: &Fill,
        position: &Position,
        realized_pnl: Decimal,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE orders
            SET status = 'EXECUTED', executed_price = $2, executed_amount = $3,
                fee = $4, executed_at = $5
            WHERE id = $1 AND status = 'PENDING'
            ",
        )
        .bind(order_id)
        .bind(fill.price)
        .bind(fill.amount)
        .bind(fill.fee)
        .bind(fill.timestamp)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            bail!("order {order_id} is already in a terminal state");
        }

        sqlx::query(
            r"
            INSERT INTO positions (symbol, quantity, avg_buy_price, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (symbol) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                avg_buy_price = EXCLUDED.avg_buy_price,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&position.symbol)
        .bind(position.quantity)
        .bind(position.avg_buy_price)
        .bind(position.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO daily_stats (day, starting_balance, realized_pnl, trade_count)
            VALUES ($1, 0, $2, 1)
            ON CONFLICT (day) DO UPDATE
            SET realized_pnl = daily_stats.realized_pnl + EXCLUDED.realized_pnl,
                trade_count = daily_stats.trade_count + 1
            ",
        )
        .bind(Utc::now().date_naive())
        .bind(realized_pnl)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_pending(&self, symbol: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r"
            SELECT id, signal_id, symbol, side, order_type, requested_amount,
                   status, idempotency_key, exchange_order_id, executed_price,
                   executed_amount, fee, error, created_at, executed_at
            FROM orders
            WHERE symbol = $1 AND status = 'PENDING'
            ORDER BY created_at ASC
            ",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }
}
