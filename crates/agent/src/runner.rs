//! One end-to-end trading cycle: signal, risk verdict, execution.
//!
//! The runner takes its position/stats snapshot after the signal is
//! finalized, so the risk gate always sees state at least as fresh as the
//! signal. On a cooldown outcome the gate still runs against the reused
//! signal, but only a stop-loss override may trade; the previous signal's
//! own verdict was already acted on when it was fresh.

use std::sync::Arc;

use anyhow::Result;
use apex_trade_core::{
    AgentError, DailyStatsStore, ExchangeClient, MarketDataStore, Notifier, NotifyEvent,
    PositionStore, RiskEvent, RiskEventSink, RiskEventType, RiskVerdict, RuntimeFlags, Signal,
    TradingConfig,
};
use apex_trade_execution::{ExecutionOutcome, OrderExecutor};
use apex_trade_risk::{RiskGate, RiskInputs};
use apex_trade_signals::{SignalGenerator, SignalOutcome};
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Price change over this trailing window feeds the volatility check.
pub const TRAILING_WINDOW_MINUTES: i64 = 5;

pub struct TradingRunner {
    config: TradingConfig,
    generator: SignalGenerator,
    gate: RiskGate,
    executor: OrderExecutor,
    flags: RuntimeFlags,
    exchange: Arc<dyn ExchangeClient>,
    market_data: Arc<dyn MarketDataStore>,
    positions: Arc<dyn PositionStore>,
    daily_stats: Arc<dyn DailyStatsStore>,
    risk_events: Arc<dyn RiskEventSink>,
    notifier: Arc<dyn Notifier>,
}

impl TradingRunner {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: TradingConfig,
        generator: SignalGenerator,
        executor: OrderExecutor,
        flags: RuntimeFlags,
        exchange: Arc<dyn ExchangeClient>,
        market_data: Arc<dyn MarketDataStore>,
        positions: Arc<dyn PositionStore>,
        daily_stats: Arc<dyn DailyStatsStore>,
        risk_events: Arc<dyn RiskEventSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gate: RiskGate::new(config.clone()),
            config,
            generator,
            executor,
            flags,
            exchange,
            market_data,
            positions,
            daily_stats,
            risk_events,
            notifier,
        }
    }

    /// Runs one cycle. Total inference failure is a logged no-op, not an
    /// error: the next tick simply tries again.
    ///
    /// # Errors
    /// Returns storage and execution errors that leave the cycle unable to
    /// reach a decision.
    pub async fn run_cycle(&self) -> Result<()> {
        let (signal, fresh) = match self.generator.run().await {
            Ok(SignalOutcome::Fresh(signal)) => (signal, true),
            Ok(SignalOutcome::Cooldown(previous)) => (previous, false),
            Err(AgentError::SignalUnavailable(detail)) => {
                tracing::warn!(%detail, "all providers failed, skipping cycle");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if fresh {
            self.notifier
                .notify(&NotifyEvent::SignalGenerated {
                    symbol: signal.symbol.clone(),
                    direction: signal.direction,
                    confidence: signal.confidence,
                })
                .await;
        }

        let trading_enabled = self.flags.trading_enabled().await;
        let ticker = self.exchange.get_ticker(&self.config.symbol).await?;
        let trailing_change_pct = self.trailing_change_pct(ticker.price).await?;
        let position = self.positions.get(&self.config.symbol).await?;
        let stats = self
            .daily_stats
            .get_or_create(Utc::now().date_naive(), self.config.total_capital)
            .await?;

        let inputs = RiskInputs {
            position: position.as_ref(),
            daily_stats: &stats,
            current_price: ticker.price,
            trailing_change_pct,
            trading_enabled,
        };

        match self.gate.evaluate(&signal, &inputs) {
            // Stop-loss exits fire on cooldown ticks too: the position can
            // fall through the stop while the signal window is still open.
            RiskVerdict::Approved {
                side,
                size_fraction,
                forced_by_stop_loss: true,
            } => {
                self.risk_events
                    .record(&RiskEvent::new(
                        &signal.symbol,
                        RiskEventType::StopLossTriggered,
                        format!("forced exit at {}", ticker.price),
                        Some(signal.id),
                    ))
                    .await?;
                self.execute_approved(&signal, side, size_fraction).await
            }
            _ if !fresh => {
                tracing::debug!(id = %signal.id, "cooldown, nothing to do");
                Ok(())
            }
            RiskVerdict::Hold => {
                tracing::debug!(id = %signal.id, "verdict: hold");
                Ok(())
            }
            RiskVerdict::Blocked { reason, detail } => {
                tracing::warn!(id = %signal.id, reason = reason.as_str(), %detail, "trade blocked");
                self.risk_events
                    .record(&RiskEvent::new(
                        &signal.symbol,
                        reason,
                        detail,
                        Some(signal.id),
                    ))
                    .await?;
                self.notifier
                    .notify(&NotifyEvent::TradeBlocked {
                        symbol: signal.symbol.clone(),
                        reason,
                    })
                    .await;
                Ok(())
            }
            RiskVerdict::Approved {
                side,
                size_fraction,
                ..
            } => self.execute_approved(&signal, side, size_fraction).await,
        }
    }

    async fn execute_approved(
        &self,
        signal: &Signal,
        side: apex_trade_core::Side,
        size_fraction: f64,
    ) -> Result<()> {
        let outcome = self
            .executor
            .execute(signal, side, size_fraction, self.config.total_capital)
            .await?;

        match outcome {
            ExecutionOutcome::Filled {
                order_id,
                fill,
                realized_pnl,
            } => {
                tracing::info!(%order_id, price = %fill.price, %realized_pnl, "trade filled");
                self.notifier
                    .notify(&NotifyEvent::OrderExecuted {
                        symbol: signal.symbol.clone(),
                        side,
                        amount: fill.amount,
                        price: fill.price,
                    })
                    .await;
                // The limit counts swings in either direction, so every
                // realized pnl can breach it.
                if realized_pnl != Decimal::ZERO {
                    self.halt_if_limit_breached().await?;
                }
            }
            ExecutionOutcome::StillPending { order_id } => {
                tracing::warn!(%order_id, "fill unconfirmed, reconciliation job owns it");
            }
            ExecutionOutcome::Cancelled { order_id } => {
                tracing::warn!(%order_id, "order cancelled by exchange");
            }
            ExecutionOutcome::Failed { order_id, reason } => {
                tracing::error!(%order_id, %reason, "order failed");
            }
        }
        Ok(())
    }

    /// Realized P&L can cross the daily limit mid-day; the halt flag makes
    /// the breach sticky until an operator resumes, and a resume disables
    /// the check for the rest of the day.
    async fn halt_if_limit_breached(&self) -> Result<()> {
        let day = Utc::now().date_naive();
        let stats = self
            .daily_stats
            .get_or_create(day, self.config.total_capital)
            .await?;
        if stats.is_halted
            || stats.limit_overridden
            || stats.pnl_fraction() < self.config.daily_loss_limit_pct
        {
            return Ok(());
        }

        let reason = format!(
            "daily pnl limit reached ({:.2}% swing)",
            stats.pnl_fraction() * 100.0
        );
        self.daily_stats
            .set_halted(day, true, Some(&reason))
            .await?;
        self.risk_events
            .record(&RiskEvent::new(
                &self.config.symbol,
                RiskEventType::DailyLimitReached,
                reason.clone(),
                None,
            ))
            .await?;
        self.notifier
            .notify(&NotifyEvent::TradingHalted { reason })
            .await;
        Ok(())
    }

    async fn trailing_change_pct(&self, current_price: Decimal) -> Result<f64> {
        trailing_change_pct(
            &*self.market_data,
            &self.config.symbol,
            current_price,
        )
        .await
    }
}

/// Fractional price change from the oldest sample in the trailing window to
/// `current_price`. Returns 0.0 when the window has no samples.
pub async fn trailing_change_pct(
    market_data: &dyn MarketDataStore,
    symbol: &str,
    current_price: Decimal,
) -> Result<f64> {
    let since = Utc::now() - Duration::minutes(TRAILING_WINDOW_MINUTES);
    let samples = market_data.since(symbol, since).await?;
    let Some(oldest) = samples.first() else {
        return Ok(0.0);
    };
    if oldest.price <= Decimal::ZERO {
        return Ok(0.0);
    }
    let change = (current_price - oldest.price) / oldest.price;
    Ok(change.to_f64().unwrap_or(0.0))
}
