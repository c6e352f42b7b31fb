//! Position repository. One row per symbol; writes happen only inside the
//! order fill transaction.

use anyhow::Result;
use apex_trade_core::{Position, PositionStore};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct PositionRepository {
    pool: PgPool,
}

impl PositionRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionStore for PositionRepository {
    async fn get(&self, symbol: &str) -> Result<Option<Position>> {
        let row = sqlx::query(
            r"
            SELECT symbol, quantity, avg_buy_price, updated_at
            FROM positions
            WHERE symbol = $1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Position {
                symbol: row.try_get("symbol")?,
                quantity: row.try_get("quantity")?,
                avg_buy_price: row.try_get("avg_buy_price")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }
}
