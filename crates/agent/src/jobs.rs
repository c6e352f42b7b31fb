//! Background jobs wired into the scheduler by the CLI.

use std::sync::Arc;

use anyhow::Result;
use apex_trade_core::{
    ExchangeClient, MarketDataStore, MarketSample, OrderStore, PositionStore, RiskEvent,
    RiskEventSink, RiskEventType,
};
use apex_trade_execution::sync_pending_orders;
use apex_trade_scheduler::Job;
use async_trait::async_trait;
use chrono::Utc;

use crate::runner::{trailing_change_pct, TradingRunner};

/// Runs one full trading cycle per tick.
pub struct SignalJob {
    pub runner: Arc<TradingRunner>,
}

#[async_trait]
impl Job for SignalJob {
    fn name(&self) -> &str {
        "signal-generation"
    }

    async fn run(&self) -> Result<()> {
        self.runner.run_cycle().await
    }
}

/// Samples the ticker into the market data store. Everything downstream
/// (indicators, volatility) reads from this series.
pub struct CollectorJob {
    pub exchange: Arc<dyn ExchangeClient>,
    pub market_data: Arc<dyn MarketDataStore>,
    pub symbol: String,
}

#[async_trait]
impl Job for CollectorJob {
    fn name(&self) -> &str {
        "market-collector"
    }

    async fn run(&self) -> Result<()> {
        let ticker = self.exchange.get_ticker(&self.symbol).await?;
        let sample = MarketSample {
            symbol: self.symbol.clone(),
            timestamp: Utc::now(),
            price: ticker.price,
            volume: ticker.volume,
            high: ticker.high,
            low: ticker.low,
            trade_count: 0,
        };
        self.market_data.append(&sample).await
    }
}

/// Watches the trailing price change and records a risk event when it
/// crosses the threshold. The risk gate still makes its own determination
/// from inputs at decision time; this job exists for the audit trail.
pub struct VolatilityJob {
    pub exchange: Arc<dyn ExchangeClient>,
    pub market_data: Arc<dyn MarketDataStore>,
    pub risk_events: Arc<dyn RiskEventSink>,
    pub symbol: String,
    pub threshold_pct: f64,
}

#[async_trait]
impl Job for VolatilityJob {
    fn name(&self) -> &str {
        "volatility-check"
    }

    async fn run(&self) -> Result<()> {
        let ticker = self.exchange.get_ticker(&self.symbol).await?;
        let change = trailing_change_pct(&*self.market_data, &self.symbol, ticker.price).await?;

        if change.abs() > self.threshold_pct {
            tracing::warn!(
                symbol = %self.symbol,
                change_pct = change * 100.0,
                threshold_pct = self.threshold_pct * 100.0,
                "high volatility"
            );
            self.risk_events
                .record(&RiskEvent::new(
                    &self.symbol,
                    RiskEventType::HighVolatility,
                    format!(
                        "5m change {:.2}% exceeds threshold {:.2}%",
                        change * 100.0,
                        self.threshold_pct * 100.0
                    ),
                    None,
                ))
                .await?;
        }
        Ok(())
    }
}

/// Drives orders left PENDING by a crash or poll exhaustion to their true
/// state.
pub struct OrderSyncJob {
    pub exchange: Arc<dyn ExchangeClient>,
    pub orders: Arc<dyn OrderStore>,
    pub positions: Arc<dyn PositionStore>,
    pub symbol: String,
}

#[async_trait]
impl Job for OrderSyncJob {
    fn name(&self) -> &str {
        "order-sync"
    }

    async fn run(&self) -> Result<()> {
        let settled =
            sync_pending_orders(&self.exchange, &self.orders, &self.positions, &self.symbol)
                .await?;
        if settled > 0 {
            tracing::info!(settled, "reconciled pending orders");
        }
        Ok(())
    }
}
