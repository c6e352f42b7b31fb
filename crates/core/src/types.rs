use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::position::Position;

/// A single periodic price/volume observation. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSample {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub trade_count: i64,
}

impl MarketSample {
    /// Checks the sample invariant: `high >= price >= low` and `volume >= 0`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.high >= self.price && self.price >= self.low && self.volume >= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Hold,
    Sell,
}

impl SignalDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for SignalDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "HOLD" => Ok(Self::Hold),
            "SELL" => Ok(Self::Sell),
            other => anyhow::bail!("unknown signal direction: {other}"),
        }
    }
}

/// A directional trading signal produced by the signal generator.
///
/// Immutable after creation; outcome annotation happens outside the core
/// write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub direction: SignalDirection,
    /// Model confidence, clamped to `[0, 1]` before persistence.
    pub confidence: f64,
    pub rationale: String,
    pub model_name: String,
    pub confluence_score: f64,
    /// Technical snapshot the model saw, kept for auditability.
    pub snapshot: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => anyhow::bail!("unknown order side: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(Self::Market),
            "LIMIT" => Ok(Self::Limit),
            other => anyhow::bail!("unknown order type: {other}"),
        }
    }
}

/// Order lifecycle states. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executed => "EXECUTED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "EXECUTED" => Ok(Self::Executed),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            other => anyhow::bail!("unknown order status: {other}"),
        }
    }
}

/// An exchange order owned by the order executor.
///
/// Status transitions are the only mutation path; terminal states are
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub signal_id: Option<Uuid>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    /// Quote amount for BUY, base quantity for SELL.
    pub requested_amount: Decimal,
    pub status: OrderStatus,
    pub idempotency_key: String,
    pub exchange_order_id: Option<String>,
    pub executed_price: Option<Decimal>,
    pub executed_amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    /// Failure detail retained for audit when status is FAILED.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// One record per trading day; read by the risk gate, mutated only on fills
/// and by explicit halt/resume commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub starting_balance: Decimal,
    pub realized_pnl: Decimal,
    pub trade_count: i32,
    pub is_halted: bool,
    pub halt_reason: Option<String>,
    /// Set by an explicit resume; disables the daily-limit stage for the
    /// rest of the day so the gate does not immediately re-block.
    pub limit_overridden: bool,
}

impl DailyStats {
    /// Absolute realized P&L as a fraction of the day's starting balance.
    ///
    /// The daily limit counts swings in either direction. A zero starting
    /// balance is treated as fully drawn down to keep the limit check
    /// conservative until the row carries real capital.
    #[must_use]
    pub fn pnl_fraction(&self) -> f64 {
        if self.realized_pnl == Decimal::ZERO {
            return 0.0;
        }
        if self.starting_balance <= Decimal::ZERO {
            return 1.0;
        }
        let ratio = self.realized_pnl.abs() / self.starting_balance;
        ratio.try_into().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskEventType {
    TradingDisabled,
    DailyLimitReached,
    HighVolatility,
    PositionSizeExceeded,
    StopLossTriggered,
}

impl RiskEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TradingDisabled => "TRADING_DISABLED",
            Self::DailyLimitReached => "DAILY_LIMIT_REACHED",
            Self::HighVolatility => "HIGH_VOLATILITY",
            Self::PositionSizeExceeded => "POSITION_SIZE_EXCEEDED",
            Self::StopLossTriggered => "STOP_LOSS_TRIGGERED",
        }
    }
}

impl std::str::FromStr for RiskEventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRADING_DISABLED" => Ok(Self::TradingDisabled),
            "DAILY_LIMIT_REACHED" => Ok(Self::DailyLimitReached),
            "HIGH_VOLATILITY" => Ok(Self::HighVolatility),
            "POSITION_SIZE_EXCEEDED" => Ok(Self::PositionSizeExceeded),
            "STOP_LOSS_TRIGGERED" => Ok(Self::StopLossTriggered),
            other => anyhow::bail!("unknown risk event type: {other}"),
        }
    }
}

/// Outcome of the risk gate for one proposed trade. Transient, not persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    /// Trade approved for execution at the given capital fraction.
    Approved {
        side: Side,
        size_fraction: f64,
        /// True when the stop-loss override forced this SELL regardless of
        /// the incoming signal.
        forced_by_stop_loss: bool,
    },
    /// HOLD signal: an intentional no-op, not a blocked trade.
    Hold,
    Blocked { reason: RiskEventType, detail: String },
}

impl RiskVerdict {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// A capital-protection event recorded for audit when the gate blocks a
/// trade or the stop-loss override fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub event_type: RiskEventType,
    pub detail: String,
    pub signal_id: Option<Uuid>,
}

impl RiskEvent {
    #[must_use]
    pub fn new(symbol: &str, event_type: RiskEventType, detail: String, signal_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            event_type,
            detail,
            signal_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub price: Decimal,
    pub volume: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

/// Account balances: `quote` is the cash asset, `base` the traded asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub quote: Decimal,
    pub base: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: Decimal,
    /// Exchange deduplicates on this key, making retried submissions safe.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeOrderState {
    Open,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub state: ExchangeOrderState,
    pub executed_price: Option<Decimal>,
    pub executed_amount: Option<Decimal>,
    pub fee: Option<Decimal>,
}

/// A confirmed fill derived from an exchange status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Structured request handed to an inference provider. Prompt-independent:
/// each provider renders this into its own wire format.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    pub symbol: String,
    pub current_price: Decimal,
    pub position: Option<Position>,
    pub confluence_score: f64,
    pub technical_summary: serde_json::Value,
}

/// Structured verdict returned by an inference provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelVerdict {
    pub direction: SignalDirection,
    pub confidence: f64,
    pub rationale: String,
}

/// Fire-and-forget notification payloads. Delivery failures never affect
/// trading logic.
#[derive(Debug, Clone, Serialize)]
pub enum NotifyEvent {
    SignalGenerated {
        symbol: String,
        direction: SignalDirection,
        confidence: f64,
    },
    OrderExecuted {
        symbol: String,
        side: Side,
        amount: Decimal,
        price: Decimal,
    },
    TradeBlocked {
        symbol: String,
        reason: RiskEventType,
    },
    TradingHalted {
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(price: Decimal, high: Decimal, low: Decimal) -> MarketSample {
        MarketSample {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            price,
            volume: dec!(10),
            high,
            low,
            trade_count: 42,
        }
    }

    #[test]
    fn sample_consistency_holds_for_valid_range() {
        assert!(sample(dec!(100), dec!(101), dec!(99)).is_consistent());
        assert!(sample(dec!(100), dec!(100), dec!(100)).is_consistent());
    }

    #[test]
    fn sample_consistency_rejects_inverted_range() {
        assert!(!sample(dec!(100), dec!(99), dec!(101)).is_consistent());
    }

    #[test]
    fn terminal_states_are_all_but_pending() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Executed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    fn day_stats(starting_balance: Decimal, realized_pnl: Decimal) -> DailyStats {
        DailyStats {
            day: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            starting_balance,
            realized_pnl,
            trade_count: 3,
            is_halted: false,
            halt_reason: None,
            limit_overridden: false,
        }
    }

    #[test]
    fn pnl_fraction_counts_both_directions() {
        assert!((day_stats(dec!(10000), dec!(-500)).pnl_fraction() - 0.05).abs() < 1e-9);
        assert!((day_stats(dec!(10000), dec!(500)).pnl_fraction() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn pnl_fraction_is_zero_for_a_flat_day() {
        assert!((day_stats(dec!(10000), Decimal::ZERO).pnl_fraction()).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_starting_balance_reads_as_full_drawdown() {
        // A row created before any cycle ran carries no balance yet; any
        // realized pnl on it must not read as a tiny fraction.
        assert!((day_stats(Decimal::ZERO, dec!(-1)).pnl_fraction() - 1.0).abs() < f64::EPSILON);
        assert!((day_stats(Decimal::ZERO, Decimal::ZERO).pnl_fraction()).abs() < f64::EPSILON);
    }
}
