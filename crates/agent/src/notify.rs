//! Tracing-backed notifier. Notifications are observability, not control
//! flow; this implementation cannot fail and alternative sinks must swallow
//! their own delivery errors.

use apex_trade_core::{Notifier, NotifyEvent};
use async_trait::async_trait;
use tracing::{info, warn};

pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, event: &NotifyEvent) {
        match event {
            NotifyEvent::SignalGenerated {
                symbol,
                direction,
                confidence,
            } => {
                info!(%symbol, direction = direction.as_str(), confidence, "signal generated");
            }
            NotifyEvent::OrderExecuted {
                symbol,
                side,
                amount,
                price,
            } => {
                info!(%symbol, side = side.as_str(), %amount, %price, "order executed");
            }
            NotifyEvent::TradeBlocked { symbol, reason } => {
                warn!(%symbol, reason = reason.as_str(), "trade blocked");
            }
            NotifyEvent::TradingHalted { reason } => {
                warn!(%reason, "trading halted");
            }
        }
    }
}
