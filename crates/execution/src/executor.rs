//! Order execution against the exchange seam.
//!
//! Submission is idempotent: every order carries a unique idempotency key
//! and retried submissions reuse it, so a retry after an ambiguous failure
//! can never open a duplicate position. After submission the executor polls
//! for a fill a bounded number of times; an order still open after the last
//! poll is left PENDING for the reconciliation job to settle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use apex_trade_core::{
    with_retry, AgentError, ExchangeClient, ExchangeConfig, ExchangeOrderState, Fill, Order,
    OrderStatus, OrderStatusReport, OrderStore, OrderType, Position, PositionStore, RetryPolicy,
    Side, Signal, SubmitOrderRequest,
};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug)]
pub enum ExecutionOutcome {
    Filled {
        order_id: Uuid,
        fill: Fill,
        realized_pnl: Decimal,
    },
    /// Submitted but unconfirmed after the poll budget; the order stays
    /// PENDING and the reconciliation job owns it from here.
    StillPending { order_id: Uuid },
    Cancelled { order_id: Uuid },
    Failed { order_id: Uuid, reason: String },
}

pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeClient>,
    orders: Arc<dyn OrderStore>,
    positions: Arc<dyn PositionStore>,
    retry: RetryPolicy,
    poll_attempts: u32,
    poll_interval: Duration,
    order_counter: AtomicU64,
}

impl OrderExecutor {
    #[must_use]
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        orders: Arc<dyn OrderStore>,
        positions: Arc<dyn PositionStore>,
        config: &ExchangeConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            exchange,
            orders,
            positions,
            retry,
            poll_attempts: config.order_poll_attempts,
            poll_interval: Duration::from_millis(config.order_poll_interval_ms),
            order_counter: AtomicU64::new(0),
        }
    }

    /// Executes one approved trade end to end.
    ///
    /// BUY sizes in quote currency as `total_capital * size_fraction`; SELL
    /// sizes in base quantity as a fraction of the open position.
    ///
    /// # Errors
    /// Returns an error only for invariant breaches (a SELL with no open
    /// position) or storage failures. Exchange failures surface as a
    /// `Failed` or `StillPending` outcome instead.
    pub async fn execute(
        &self,
        signal: &Signal,
        side: Side,
        size_fraction: f64,
        total_capital: Decimal,
    ) -> Result<ExecutionOutcome> {
        let fraction = Decimal::try_from(size_fraction)
            .context("size fraction is not representable")?;

        let amount = match side {
            Side::Buy => total_capital * fraction,
            Side::Sell => {
                let position = self
                    .positions
                    .get(&signal.symbol)
                    .await?
                    .filter(|p| !p.is_flat());
                match position {
                    Some(p) => p.quantity * fraction,
                    None => bail!("sell requested with no open position for {}", signal.symbol),
                }
            }
        };

        let sequence = self.order_counter.fetch_add(1, Ordering::SeqCst);
        let order = Order {
            id: Uuid::new_v4(),
            signal_id: Some(signal.id),
            symbol: signal.symbol.clone(),
            side,
            order_type: OrderType::Market,
            requested_amount: amount,
            status: OrderStatus::Pending,
            idempotency_key: format!("{}:{}:{sequence}", signal.id, side.as_str()),
            exchange_order_id: None,
            executed_price: None,
            executed_amount: None,
            fee: None,
            error: None,
            created_at: Utc::now(),
            executed_at: None,
        };
        self.orders.insert(&order).await?;

        if let Some(reason) = self.balance_shortfall(&order).await? {
            self.orders.mark_failed(order.id, &reason).await?;
            return Ok(ExecutionOutcome::Failed {
                order_id: order.id,
                reason,
            });
        }

        let request = SubmitOrderRequest {
            symbol: order.symbol.clone(),
            side,
            order_type: order.order_type,
            amount,
            idempotency_key: order.idempotency_key.clone(),
        };
        let exchange_order_id =
            match with_retry(self.retry, "submit_order", || {
                self.exchange.submit_order(&request)
            })
            .await
            {
                Ok(id) => id,
                Err(e) => {
                    let reason = format!("submission failed: {e}");
                    self.orders.mark_failed(order.id, &reason).await?;
                    return Ok(ExecutionOutcome::Failed {
                        order_id: order.id,
                        reason,
                    });
                }
            };
        self.orders
            .set_exchange_order_id(order.id, &exchange_order_id)
            .await?;

        self.poll_for_fill(&order, &exchange_order_id).await
    }

    /// Checks the account can cover the order. `None` means sufficient.
    async fn balance_shortfall(&self, order: &Order) -> Result<Option<String>> {
        let balance = match with_retry(self.retry, "get_balance", || self.exchange.get_balance())
            .await
        {
            Ok(b) => b,
            Err(e) => return Ok(Some(format!("balance check failed: {e}"))),
        };
        let available = match order.side {
            Side::Buy => balance.quote,
            Side::Sell => balance.base,
        };
        if available < order.requested_amount {
            return Ok(Some(
                AgentError::InsufficientBalance {
                    required: order.requested_amount,
                    available,
                }
                .to_string(),
            ));
        }
        Ok(None)
    }

    async fn poll_for_fill(
        &self,
        order: &Order,
        exchange_order_id: &str,
    ) -> Result<ExecutionOutcome> {
        for attempt in 0..self.poll_attempts {
            // First poll goes out immediately; no sleep after the last one.
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
            match self.exchange.get_order_status(exchange_order_id).await {
                Ok(report) => match report.state {
                    ExchangeOrderState::Filled => {
                        let (fill, realized_pnl) =
                            settle_fill(&*self.orders, &*self.positions, order, &report).await?;
                        return Ok(ExecutionOutcome::Filled {
                            order_id: order.id,
                            fill,
                            realized_pnl,
                        });
                    }
                    ExchangeOrderState::Cancelled => {
                        self.orders.mark_cancelled(order.id).await?;
                        return Ok(ExecutionOutcome::Cancelled { order_id: order.id });
                    }
                    ExchangeOrderState::Rejected => {
                        let reason = "rejected by exchange".to_string();
                        self.orders.mark_failed(order.id, &reason).await?;
                        return Ok(ExecutionOutcome::Failed {
                            order_id: order.id,
                            reason,
                        });
                    }
                    ExchangeOrderState::Open => {}
                },
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        attempt,
                        error = %e,
                        "order status poll failed"
                    );
                }
            }
        }

        tracing::warn!(
            order_id = %order.id,
            exchange_order_id,
            "fill unconfirmed after {} polls, leaving PENDING",
            self.poll_attempts
        );
        Ok(ExecutionOutcome::StillPending { order_id: order.id })
    }
}

/// Applies a filled status report: updates the position in memory, then
/// hands order, fill, position, and realized P&L to the store for one
/// atomic write.
pub(crate) async fn settle_fill(
    orders: &dyn OrderStore,
    positions: &dyn PositionStore,
    order: &Order,
    report: &OrderStatusReport,
) -> Result<(Fill, Decimal)> {
    let (Some(price), Some(amount)) = (report.executed_price, report.executed_amount) else {
        bail!("fill report for order {} is missing price or amount", order.id);
    };
    let fill = Fill {
        price,
        amount,
        fee: report.fee.unwrap_or(Decimal::ZERO),
        timestamp: Utc::now(),
    };

    let existing = positions.get(&order.symbol).await?;
    let (position, realized_pnl) = match order.side {
        Side::Buy => {
            let mut position = existing.unwrap_or_else(|| {
                Position::open(&order.symbol, Decimal::ZERO, fill.price, fill.timestamp)
            });
            position.apply_buy(fill.price, fill.amount, fill.timestamp);
            (position, Decimal::ZERO)
        }
        Side::Sell => {
            let Some(mut position) = existing else {
                bail!("sell fill for {} with no stored position", order.symbol);
            };
            let pnl = position.apply_sell(fill.price, fill.amount, fill.fee, fill.timestamp);
            (position, pnl)
        }
    };

    orders
        .apply_fill(order.id, &fill, &position, realized_pnl)
        .await?;
    Ok((fill, realized_pnl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_trade_core::{Balance, ExecutionMode, SignalDirection, Ticker};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryOrders {
        inner: Mutex<HashMap<Uuid, Order>>,
        fills: Mutex<Vec<(Uuid, Fill, Position, Decimal)>>,
    }

    #[async_trait]
    impl OrderStore for MemoryOrders {
        async fn insert(&self, order: &Order) -> Result<()> {
            self.inner.lock().unwrap().insert(order.id, order.clone());
            Ok(())
        }

        async fn set_exchange_order_id(
            &self,
            order_id: Uuid,
            exchange_order_id: &str,
        ) -> Result<()> {
            if let Some(order) = self.inner.lock().unwrap().get_mut(&order_id) {
                order.exchange_order_id = Some(exchange_order_id.to_string());
            }
            Ok(())
        }

        async fn mark_failed(&self, order_id: Uuid, error: &str) -> Result<()> {
            if let Some(order) = self.inner.lock().unwrap().get_mut(&order_id) {
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Failed;
                    order.error = Some(error.to_string());
                }
            }
            Ok(())
        }

        async fn mark_cancelled(&self, order_id: Uuid) -> Result<()> {
            if let Some(order) = self.inner.lock().unwrap().get_mut(&order_id) {
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Cancelled;
                }
            }
            Ok(())
        }

        async fn apply_fill(
            &self,
            order_id: Uuid,
            fill: &Fill,
            position: &Position,
            realized_pnl: Decimal,
        ) -> Result<()> {
            if let Some(order) = self.inner.lock().unwrap().get_mut(&order_id) {
                order.status = OrderStatus::Executed;
                order.executed_price = Some(fill.price);
                order.executed_amount = Some(fill.amount);
                order.fee = Some(fill.fee);
                order.executed_at = Some(fill.timestamp);
            }
            self.fills.lock().unwrap().push((
                order_id,
                fill.clone(),
                position.clone(),
                realized_pnl,
            ));
            Ok(())
        }

        async fn list_pending(&self, symbol: &str) -> Result<Vec<Order>> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .values()
                .filter(|o| o.symbol == symbol && o.status == OrderStatus::Pending)
                .cloned()
                .collect())
        }
    }

    impl MemoryOrders {
        fn status_of(&self, order_id: Uuid) -> OrderStatus {
            self.inner.lock().unwrap()[&order_id].status
        }
    }

    #[derive(Default)]
    struct MemoryPositions {
        inner: Mutex<Option<Position>>,
    }

    #[async_trait]
    impl PositionStore for MemoryPositions {
        async fn get(&self, _symbol: &str) -> Result<Option<Position>> {
            Ok(self.inner.lock().unwrap().clone())
        }
    }

    struct ScriptedExchange {
        submit_failures: AtomicU32,
        reject_submit: bool,
        submitted_keys: Mutex<Vec<String>>,
        reports: Mutex<VecDeque<OrderStatusReport>>,
        balance: Balance,
    }

    impl ScriptedExchange {
        fn new(balance_quote: Decimal, balance_base: Decimal) -> Self {
            Self {
                submit_failures: AtomicU32::new(0),
                reject_submit: false,
                submitted_keys: Mutex::new(Vec::new()),
                reports: Mutex::new(VecDeque::new()),
                balance: Balance {
                    quote: balance_quote,
                    base: balance_base,
                },
            }
        }

        fn script_report(&self, report: OrderStatusReport) {
            self.reports.lock().unwrap().push_back(report);
        }
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        async fn get_ticker(&self, _symbol: &str) -> Result<Ticker, AgentError> {
            Ok(Ticker {
                price: dec!(50000),
                volume: dec!(0),
                high: dec!(50000),
                low: dec!(50000),
            })
        }

        async fn submit_order(
            &self,
            request: &SubmitOrderRequest,
        ) -> Result<String, AgentError> {
            self.submitted_keys
                .lock()
                .unwrap()
                .push(request.idempotency_key.clone());
            if self.reject_submit {
                return Err(AgentError::OrderRejected("below minimum size".into()));
            }
            if self.submit_failures.load(Ordering::SeqCst) > 0 {
                self.submit_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(AgentError::Timeout("submit deadline".into()));
            }
            Ok("ex-1".to_string())
        }

        async fn get_order_status(
            &self,
            _exchange_order_id: &str,
        ) -> Result<OrderStatusReport, AgentError> {
            let report = self.reports.lock().unwrap().pop_front();
            Ok(report.unwrap_or(OrderStatusReport {
                state: ExchangeOrderState::Open,
                executed_price: None,
                executed_amount: None,
                fee: None,
            }))
        }

        async fn get_balance(&self) -> Result<Balance, AgentError> {
            Ok(self.balance.clone())
        }
    }

    fn test_config(poll_attempts: u32) -> ExchangeConfig {
        ExchangeConfig {
            api_url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            mode: ExecutionMode::Paper,
            request_timeout_secs: 10,
            requests_per_second: 20,
            order_poll_attempts: poll_attempts,
            order_poll_interval_ms: 1,
            paper_slippage_bps: 0.0,
            paper_commission_rate: 0.0,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), 2)
    }

    fn signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: "BTCUSDT".to_string(),
            direction: SignalDirection::Buy,
            confidence: 0.8,
            rationale: "strong momentum".to_string(),
            model_name: "test-model".to_string(),
            confluence_score: 0.7,
            snapshot: serde_json::json!({}),
        }
    }

    fn filled_report(price: Decimal, amount: Decimal, fee: Decimal) -> OrderStatusReport {
        OrderStatusReport {
            state: ExchangeOrderState::Filled,
            executed_price: Some(price),
            executed_amount: Some(amount),
            fee: Some(fee),
        }
    }

    fn executor(
        exchange: Arc<ScriptedExchange>,
        orders: Arc<MemoryOrders>,
        positions: Arc<MemoryPositions>,
        poll_attempts: u32,
    ) -> OrderExecutor {
        OrderExecutor::new(exchange, orders, positions, &test_config(poll_attempts), fast_retry())
    }

    #[tokio::test]
    async fn buy_fill_updates_order_and_position() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(10000), dec!(0)));
        exchange.script_report(filled_report(dec!(50000), dec!(0.05), dec!(2.5)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        let executor = executor(exchange, orders.clone(), positions, 5);

        let outcome = executor
            .execute(&signal(), Side::Buy, 0.25, dec!(10000))
            .await
            .unwrap();

        let ExecutionOutcome::Filled {
            order_id,
            realized_pnl,
            ..
        } = outcome
        else {
            panic!("expected fill");
        };
        assert_eq!(realized_pnl, Decimal::ZERO);
        assert_eq!(orders.status_of(order_id), OrderStatus::Executed);

        let fills = orders.fills.lock().unwrap();
        let (_, _, position, _) = &fills[0];
        assert_eq!(position.quantity, dec!(0.05));
        assert_eq!(position.avg_buy_price, dec!(50000));
    }

    #[tokio::test]
    async fn submit_retries_reuse_the_idempotency_key() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(10000), dec!(0)));
        exchange.submit_failures.store(2, Ordering::SeqCst);
        exchange.script_report(filled_report(dec!(50000), dec!(0.05), dec!(0)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        let executor = executor(exchange.clone(), orders, positions, 5);

        let outcome = executor
            .execute(&signal(), Side::Buy, 0.25, dec!(10000))
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Filled { .. }));

        let keys = exchange.submitted_keys.lock().unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k == &keys[0]));
    }

    #[tokio::test]
    async fn rejected_submission_marks_order_failed() {
        let mut scripted = ScriptedExchange::new(dec!(10000), dec!(0));
        scripted.reject_submit = true;
        let exchange = Arc::new(scripted);
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        let executor = executor(exchange.clone(), orders.clone(), positions, 5);

        let outcome = executor
            .execute(&signal(), Side::Buy, 0.25, dec!(10000))
            .await
            .unwrap();

        let ExecutionOutcome::Failed { order_id, reason } = outcome else {
            panic!("expected failure");
        };
        assert!(reason.contains("below minimum size"));
        assert_eq!(orders.status_of(order_id), OrderStatus::Failed);
        // Rejection is terminal, never retried.
        assert_eq!(exchange.submitted_keys.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_balance_fails_without_submitting() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(100), dec!(0)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        let executor = executor(exchange.clone(), orders.clone(), positions, 5);

        let outcome = executor
            .execute(&signal(), Side::Buy, 0.25, dec!(10000))
            .await
            .unwrap();

        let ExecutionOutcome::Failed { order_id, .. } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(orders.status_of(order_id), OrderStatus::Failed);
        assert!(exchange.submitted_keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfirmed_fill_leaves_order_pending() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(10000), dec!(0)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        let executor = executor(exchange, orders.clone(), positions, 3);

        let outcome = executor
            .execute(&signal(), Side::Buy, 0.25, dec!(10000))
            .await
            .unwrap();

        let ExecutionOutcome::StillPending { order_id } = outcome else {
            panic!("expected still-pending");
        };
        assert_eq!(orders.status_of(order_id), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn poll_exhaustion_does_not_sleep_after_the_last_attempt() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(10000), dec!(0)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        // One attempt and a 60s interval: any sleep would blow the timeout.
        let mut config = test_config(1);
        config.order_poll_interval_ms = 60_000;
        let executor = OrderExecutor::new(exchange, orders, positions, &config, fast_retry());

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            executor.execute(&signal(), Side::Buy, 0.25, dec!(10000)),
        )
        .await
        .expect("poll loop slept after its final attempt")
        .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::StillPending { .. }));
    }

    #[tokio::test]
    async fn sell_fill_realizes_pnl() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(0), dec!(1)));
        exchange.script_report(filled_report(dec!(110), dec!(1), dec!(1)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        *positions.inner.lock().unwrap() =
            Some(Position::open("BTCUSDT", dec!(1), dec!(100), Utc::now()));
        let executor = executor(exchange, orders.clone(), positions, 5);

        let outcome = executor
            .execute(&signal(), Side::Sell, 1.0, dec!(10000))
            .await
            .unwrap();

        let ExecutionOutcome::Filled { realized_pnl, .. } = outcome else {
            panic!("expected fill");
        };
        assert_eq!(realized_pnl, dec!(9));

        let fills = orders.fills.lock().unwrap();
        let (_, _, position, _) = &fills[0];
        assert!(position.is_flat());
    }

    #[tokio::test]
    async fn sell_with_no_position_is_an_invariant_breach() {
        let exchange = Arc::new(ScriptedExchange::new(dec!(0), dec!(1)));
        let orders = Arc::new(MemoryOrders::default());
        let positions = Arc::new(MemoryPositions::default());
        let executor = executor(exchange, orders, positions, 5);

        let result = executor.execute(&signal(), Side::Sell, 0.5, dec!(10000)).await;
        assert!(result.is_err());
    }
}
