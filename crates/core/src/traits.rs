//! Trait seams between the pipeline and its external collaborators.
//!
//! Exchange and inference calls carry typed [`AgentError`] so the retry
//! helper can classify failures; storage seams use `anyhow::Result` and are
//! implemented by the data crate (Postgres) and by in-memory fakes in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::AgentError;
use crate::position::Position;
use crate::types::{
    Balance, DailyStats, Fill, InferenceRequest, MarketSample, ModelVerdict, NotifyEvent, Order,
    OrderStatusReport, RiskEvent, Signal, SubmitOrderRequest, Ticker,
};

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, AgentError>;

    /// Submits an order and returns the exchange order id. The exchange
    /// deduplicates on the request's idempotency key.
    async fn submit_order(&self, request: &SubmitOrderRequest) -> Result<String, AgentError>;

    async fn get_order_status(
        &self,
        exchange_order_id: &str,
    ) -> Result<OrderStatusReport, AgentError>;

    async fn get_balance(&self) -> Result<Balance, AgentError>;
}

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn infer(&self, request: &InferenceRequest) -> Result<ModelVerdict, AgentError>;
}

/// Append-only store of market samples; safe for concurrent readers.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    async fn append(&self, sample: &MarketSample) -> Result<()>;

    /// Samples for `symbol` at or after `since`, oldest first.
    async fn since(&self, symbol: &str, since: DateTime<Utc>) -> Result<Vec<MarketSample>>;
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn insert(&self, signal: &Signal) -> Result<()>;

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<Signal>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Records the exchange-assigned id once submission is confirmed.
    async fn set_exchange_order_id(&self, order_id: Uuid, exchange_order_id: &str) -> Result<()>;

    /// PENDING → FAILED with the error retained for audit. Must be a no-op
    /// for orders already in a terminal state.
    async fn mark_failed(&self, order_id: Uuid, error: &str) -> Result<()>;

    /// PENDING → CANCELLED. Must be a no-op for terminal orders.
    async fn mark_cancelled(&self, order_id: Uuid) -> Result<()>;

    /// Atomically records a confirmed fill: order → EXECUTED, position
    /// replaced with `position`, realized P&L folded into the day's stats.
    async fn apply_fill(
        &self,
        order_id: Uuid,
        fill: &Fill,
        position: &Position,
        realized_pnl: Decimal,
    ) -> Result<()>;

    async fn list_pending(&self, symbol: &str) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get(&self, symbol: &str) -> Result<Option<Position>>;
}

#[async_trait]
pub trait DailyStatsStore: Send + Sync {
    /// The stats row for `day`, created with `starting_balance` if absent.
    async fn get_or_create(&self, day: NaiveDate, starting_balance: Decimal)
        -> Result<DailyStats>;

    async fn set_halted(&self, day: NaiveDate, halted: bool, reason: Option<&str>) -> Result<()>;
}

#[async_trait]
pub trait RiskEventSink: Send + Sync {
    async fn record(&self, event: &RiskEvent) -> Result<()>;
}

/// Runtime key-value overrides. Read-through at the start of each job run.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Fire-and-forget notification sink. Implementations must swallow their
/// own failures; delivery problems never affect trading logic.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotifyEvent);
}
