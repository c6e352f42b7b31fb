//! Reconciliation of orders left PENDING by a crash or an exhausted poll
//! budget. Runs as a periodic job; each pass re-queries the exchange and
//! drives every pending order to its true state.

use std::sync::Arc;

use anyhow::Result;
use apex_trade_core::{ExchangeClient, ExchangeOrderState, OrderStore, PositionStore};

use crate::executor::settle_fill;

/// Settles all PENDING orders for `symbol` against the exchange.
///
/// Returns the number of orders moved to a terminal state. Orders that are
/// still open on the exchange are left alone; orders that never got an
/// exchange id are failed, since their submission was never confirmed.
///
/// # Errors
/// Returns storage errors only; per-order exchange failures are logged and
/// skipped so one unreachable order cannot stall the rest.
pub async fn sync_pending_orders(
    exchange: &Arc<dyn ExchangeClient>,
    orders: &Arc<dyn OrderStore>,
    positions: &Arc<dyn PositionStore>,
    symbol: &str,
) -> Result<usize> {
    let pending = orders.list_pending(symbol).await?;
    let mut settled = 0usize;

    for order in &pending {
        let Some(exchange_order_id) = order.exchange_order_id.as_deref() else {
            orders
                .mark_failed(order.id, "submission never confirmed")
                .await?;
            settled += 1;
            continue;
        };

        let report = match exchange.get_order_status(exchange_order_id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "order sync poll failed");
                continue;
            }
        };

        match report.state {
            ExchangeOrderState::Filled => {
                settle_fill(&**orders, &**positions, order, &report).await?;
                tracing::info!(order_id = %order.id, "reconciled fill");
                settled += 1;
            }
            ExchangeOrderState::Cancelled => {
                orders.mark_cancelled(order.id).await?;
                settled += 1;
            }
            ExchangeOrderState::Rejected => {
                orders.mark_failed(order.id, "rejected by exchange").await?;
                settled += 1;
            }
            ExchangeOrderState::Open => {}
        }
    }

    Ok(settled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use apex_trade_core::{
        AgentError, Balance, Fill, Order, OrderStatus, OrderStatusReport, OrderType, Position,
        Side, SubmitOrderRequest, Ticker,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct MemoryOrders {
        inner: Mutex<HashMap<Uuid, Order>>,
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
            _position: &Position,
            _realized_pnl: Decimal,
        ) -> Result<()> {
            if let Some(order) = self.inner.lock().unwrap().get_mut(&order_id) {
                order.status = OrderStatus::Executed;
                order.executed_price = Some(fill.price);
                order.executed_amount = Some(fill.amount);
            }
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

    #[derive(Default)]
    struct MemoryPositions;

    #[async_trait]
    impl PositionStore for MemoryPositions {
        async fn get(&self, _symbol: &str) -> Result<Option<Position>> {
            Ok(None)
        }
    }

    struct StatusByIdExchange {
        reports: HashMap<String, OrderStatusReport>,
    }

    #[async_trait]
    impl ExchangeClient for StatusByIdExchange {
        async fn get_ticker(&self, _symbol: &str) -> Result<Ticker, AgentError> {
            unimplemented!("not used by the sync job")
        }

        async fn submit_order(
            &self,
            _request: &SubmitOrderRequest,
        ) -> Result<String, AgentError> {
            unimplemented!("not used by the sync job")
        }

        async fn get_order_status(
            &self,
            exchange_order_id: &str,
        ) -> Result<OrderStatusReport, AgentError> {
            self.reports
                .get(exchange_order_id)
                .cloned()
                .ok_or(AgentError::Api {
                    status: 404,
                    message: "unknown order".to_string(),
                })
        }

        async fn get_balance(&self) -> Result<Balance, AgentError> {
            unimplemented!("not used by the sync job")
        }
    }

    fn pending_order(exchange_order_id: Option<&str>) -> Order {
        Order {
            id: Uuid::new_v4(),
            signal_id: None,
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            requested_amount: dec!(1000),
            status: OrderStatus::Pending,
            idempotency_key: Uuid::new_v4().to_string(),
            exchange_order_id: exchange_order_id.map(str::to_string),
            executed_price: None,
            executed_amount: None,
            fee: None,
            error: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }

    #[tokio::test]
    async fn sync_settles_filled_cancelled_and_orphaned_orders() {
        let filled = pending_order(Some("ex-filled"));
        let cancelled = pending_order(Some("ex-cancelled"));
        let still_open = pending_order(Some("ex-open"));
        let orphan = pending_order(None);

        let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrders::default());
        for order in [&filled, &cancelled, &still_open, &orphan] {
            orders.insert(order).await.unwrap();
        }

        let mut reports = HashMap::new();
        reports.insert(
            "ex-filled".to_string(),
            OrderStatusReport {
                state: ExchangeOrderState::Filled,
                executed_price: Some(dec!(50000)),
                executed_amount: Some(dec!(0.01)),
                fee: Some(dec!(0.5)),
            },
        );
        reports.insert(
            "ex-cancelled".to_string(),
            OrderStatusReport {
                state: ExchangeOrderState::Cancelled,
                executed_price: None,
                executed_amount: None,
                fee: None,
            },
        );
        reports.insert(
            "ex-open".to_string(),
            OrderStatusReport {
                state: ExchangeOrderState::Open,
                executed_price: None,
                executed_amount: None,
                fee: None,
            },
        );
        let exchange: Arc<dyn ExchangeClient> = Arc::new(StatusByIdExchange { reports });
        let positions: Arc<dyn PositionStore> = Arc::new(MemoryPositions);

        let settled = sync_pending_orders(&exchange, &orders, &positions, "BTCUSDT")
            .await
            .unwrap();
        assert_eq!(settled, 3);

        let remaining = orders.list_pending("BTCUSDT").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, still_open.id);
    }

    #[tokio::test]
    async fn unreachable_order_is_skipped_not_fatal() {
        let unknown = pending_order(Some("ex-unknown"));
        let orders: Arc<dyn OrderStore> = Arc::new(MemoryOrders::default());
        orders.insert(&unknown).await.unwrap();

        let exchange: Arc<dyn ExchangeClient> = Arc::new(StatusByIdExchange {
            reports: HashMap::new(),
        });
        let positions: Arc<dyn PositionStore> = Arc::new(MemoryPositions);

        let settled = sync_pending_orders(&exchange, &orders, &positions, "BTCUSDT")
            .await
            .unwrap();
        assert_eq!(settled, 0);
        assert_eq!(orders.list_pending("BTCUSDT").await.unwrap().len(), 1);
    }
}
