use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single mutable position record for a traded symbol.
///
/// Weighted-average update on BUY fills, proportional reduction on SELL
/// fills. The order executor is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_buy_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    #[must_use]
    pub fn open(symbol: &str, quantity: Decimal, price: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            avg_buy_price: price,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity <= Decimal::ZERO
    }

    /// Folds a BUY fill into the position, re-weighting the average entry
    /// price by quantity.
    pub fn apply_buy(&mut self, price: Decimal, quantity: Decimal, now: DateTime<Utc>) {
        let total_cost = self.avg_buy_price * self.quantity + price * quantity;
        self.quantity += quantity;
        if self.quantity > Decimal::ZERO {
            self.avg_buy_price = total_cost / self.quantity;
        }
        self.updated_at = now;
    }

    /// Reduces the position by a SELL fill and returns realized P&L net of
    /// the fee. Quantities beyond the held amount are ignored.
    pub fn apply_sell(
        &mut self,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Decimal {
        let closed = quantity.min(self.quantity);
        let pnl = (price - self.avg_buy_price) * closed - fee;
        self.quantity -= closed;
        self.updated_at = now;
        pnl
    }

    /// Drawdown from the average entry as a fraction of entry price.
    /// Positive when the position is under water.
    #[must_use]
    pub fn drawdown_fraction(&self, current_price: Decimal) -> f64 {
        if self.avg_buy_price <= Decimal::ZERO {
            return 0.0;
        }
        let dd = (self.avg_buy_price - current_price) / self.avg_buy_price;
        dd.try_into().unwrap_or(0.0)
    }
}
