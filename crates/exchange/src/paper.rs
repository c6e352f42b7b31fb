//! In-memory paper-trading exchange.
//!
//! Orders fill instantly at the last set price plus configured slippage,
//! with a commission taken in the quote currency. Submissions are
//! deduplicated on the idempotency key so a retried submission returns the
//! original order id instead of opening a second position.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use apex_trade_core::{
    AgentError, Balance, ExchangeClient, ExchangeConfig, ExchangeOrderState, OrderStatusReport,
    Side, SubmitOrderRequest, Ticker,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

struct PaperOrder {
    report: OrderStatusReport,
}

struct PaperState {
    price: Decimal,
    quote: Decimal,
    base: Decimal,
    orders: HashMap<String, PaperOrder>,
    /// idempotency key -> exchange order id
    seen_keys: HashMap<String, String>,
}

pub struct PaperExchange {
    state: Mutex<PaperState>,
    slippage_bps: Decimal,
    commission_rate: Decimal,
    /// Optional real exchange used as a read-only price feed, so paper
    /// trading follows the live market.
    feed: Option<Arc<dyn ExchangeClient>>,
}

impl PaperExchange {
    #[must_use]
    pub fn new(config: &ExchangeConfig, starting_quote: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                price: Decimal::ZERO,
                quote: starting_quote,
                base: Decimal::ZERO,
                orders: HashMap::new(),
                seen_keys: HashMap::new(),
            }),
            slippage_bps: Decimal::try_from(config.paper_slippage_bps)
                .unwrap_or(Decimal::ZERO),
            commission_rate: Decimal::try_from(config.paper_commission_rate)
                .unwrap_or(Decimal::ZERO),
            feed: None,
        }
    }

    #[must_use]
    pub fn with_feed(mut self, feed: Arc<dyn ExchangeClient>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Sets the simulated market price used for tickers and fills.
    pub fn set_price(&self, price: Decimal) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.price = price;
    }

    fn fill_price(&self, side: Side, market: Decimal) -> Decimal {
        let adjustment = market * self.slippage_bps / Decimal::from(10_000);
        // Slippage always works against the trader.
        match side {
            Side::Buy => market + adjustment,
            Side::Sell => market - adjustment,
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, AgentError> {
        if let Some(feed) = &self.feed {
            let ticker = feed.get_ticker(symbol).await?;
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.price = ticker.price;
            return Ok(ticker);
        }
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Ticker {
            price: state.price,
            volume: Decimal::ZERO,
            high: state.price,
            low: state.price,
        })
    }

    async fn submit_order(&self, request: &SubmitOrderRequest) -> Result<String, AgentError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = state.seen_keys.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        if state.price <= Decimal::ZERO {
            return Err(AgentError::OrderRejected(
                "paper exchange has no market price".to_string(),
            ));
        }

        let price = self.fill_price(request.side, state.price);
        let (executed_amount, fee) = match request.side {
            Side::Buy => {
                // `amount` is the quote budget; fee comes off the top.
                if request.amount > state.quote {
                    return Err(AgentError::InsufficientBalance {
                        required: request.amount,
                        available: state.quote,
                    });
                }
                let fee = request.amount * self.commission_rate;
                let quantity = (request.amount - fee) / price;
                state.quote -= request.amount;
                state.base += quantity;
                (quantity, fee)
            }
            Side::Sell => {
                // `amount` is the base quantity.
                if request.amount > state.base {
                    return Err(AgentError::InsufficientBalance {
                        required: request.amount,
                        available: state.base,
                    });
                }
                let gross = request.amount * price;
                let fee = gross * self.commission_rate;
                state.base -= request.amount;
                state.quote += gross - fee;
                (request.amount, fee)
            }
        };

        let order_id = Uuid::new_v4().to_string();
        state.orders.insert(
            order_id.clone(),
            PaperOrder {
                report: OrderStatusReport {
                    state: ExchangeOrderState::Filled,
                    executed_price: Some(price),
                    executed_amount: Some(executed_amount),
                    fee: Some(fee),
                },
            },
        );
        state
            .seen_keys
            .insert(request.idempotency_key.clone(), order_id.clone());

        tracing::debug!(
            order_id = %order_id,
            side = request.side.as_str(),
            %price,
            at = %Utc::now(),
            "paper fill"
        );
        Ok(order_id)
    }

    async fn get_order_status(
        &self,
        exchange_order_id: &str,
    ) -> Result<OrderStatusReport, AgentError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .orders
            .get(exchange_order_id)
            .map(|o| o.report.clone())
            .ok_or_else(|| AgentError::Api {
                status: 404,
                message: format!("unknown order {exchange_order_id}"),
            })
    }

    async fn get_balance(&self) -> Result<Balance, AgentError> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Balance {
            quote: state.quote,
            base: state.base,
        })
    }
}
