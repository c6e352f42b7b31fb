//! The risk gate: a strict, ordered pipeline of capital-protection checks.
//!
//! Stage order is part of the contract and must not be rearranged:
//! 1. trading disabled (kill switch or daily halt)
//! 2. daily loss limit
//! 3. trailing volatility
//! 4. stop-loss override (forces a SELL past the remaining stages)
//! 5. position size bound
//! 6. confidence-based sizing
//!
//! The gate is a pure function of its inputs: no clocks, no I/O, no hidden
//! state. Callers take the position/stats snapshot after the signal is
//! finalized so decisions always use fresh state.

use apex_trade_core::sizing::size_fraction;
use apex_trade_core::{
    DailyStats, Position, RiskEventType, RiskVerdict, Side, Signal, SignalDirection, TradingConfig,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Snapshot of everything the gate is allowed to look at.
#[derive(Debug, Clone)]
pub struct RiskInputs<'a> {
    pub position: Option<&'a Position>,
    pub daily_stats: &'a DailyStats,
    pub current_price: Decimal,
    /// Fractional price change over the trailing five minutes.
    pub trailing_change_pct: f64,
    /// Global kill switch resolved at the start of the run.
    pub trading_enabled: bool,
}

pub struct RiskGate {
    config: TradingConfig,
}

impl RiskGate {
    #[must_use]
    pub const fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    /// Evaluates one proposed trade. Deterministic for identical inputs.
    #[must_use]
    pub fn evaluate(&self, signal: &Signal, inputs: &RiskInputs<'_>) -> RiskVerdict {
        // 1. Kill switch / halt flag.
        if !inputs.trading_enabled {
            return RiskVerdict::Blocked {
                reason: RiskEventType::TradingDisabled,
                detail: "trading disabled by kill switch".to_string(),
            };
        }
        if inputs.daily_stats.is_halted {
            return RiskVerdict::Blocked {
                reason: RiskEventType::TradingDisabled,
                detail: format!(
                    "trading halted: {}",
                    inputs.daily_stats.halt_reason.as_deref().unwrap_or("manual")
                ),
            };
        }

        // 2. Daily limit on absolute realized pnl. An explicit resume sets
        // `limit_overridden`, which disables this stage for the day.
        if !inputs.daily_stats.limit_overridden {
            let pnl_fraction = inputs.daily_stats.pnl_fraction();
            if pnl_fraction >= self.config.daily_loss_limit_pct {
                return RiskVerdict::Blocked {
                    reason: RiskEventType::DailyLimitReached,
                    detail: format!(
                        "daily pnl swing {:.2}% >= limit {:.2}%",
                        pnl_fraction * 100.0,
                        self.config.daily_loss_limit_pct * 100.0
                    ),
                };
            }
        }

        // 3. Trailing volatility.
        if inputs.trailing_change_pct.abs() > self.config.volatility_threshold_pct {
            return RiskVerdict::Blocked {
                reason: RiskEventType::HighVolatility,
                detail: format!(
                    "5m change {:.2}% exceeds threshold {:.2}%",
                    inputs.trailing_change_pct * 100.0,
                    self.config.volatility_threshold_pct * 100.0
                ),
            };
        }

        // 4. Stop-loss override: capital protection beats the model.
        if let Some(position) = inputs.position.filter(|p| !p.is_flat()) {
            if position.drawdown_fraction(inputs.current_price) >= self.config.stop_loss_pct {
                return RiskVerdict::Approved {
                    side: Side::Sell,
                    size_fraction: 1.0,
                    forced_by_stop_loss: true,
                };
            }
        }

        match signal.direction {
            SignalDirection::Hold => RiskVerdict::Hold,
            SignalDirection::Buy => self.evaluate_buy(signal, inputs),
            SignalDirection::Sell => self.evaluate_sell(signal, inputs),
        }
    }

    fn evaluate_buy(&self, signal: &Signal, inputs: &RiskInputs<'_>) -> RiskVerdict {
        let Some(fraction) = size_fraction(
            signal.confidence,
            self.config.min_position_pct,
            self.config.max_position_pct,
        ) else {
            // Below the confidence floor a BUY is never approved; this is
            // an intentional no-op, not a capital-protection event.
            return RiskVerdict::Hold;
        };

        // 5. Exposure bound: existing position value plus the proposed
        // commitment, as a fraction of total capital.
        let current_exposure = inputs
            .position
            .map(|p| p.quantity * inputs.current_price)
            .unwrap_or(Decimal::ZERO);
        let current_exposure_pct = if self.config.total_capital > Decimal::ZERO {
            (current_exposure / self.config.total_capital)
                .to_f64()
                .unwrap_or(f64::MAX)
        } else {
            f64::MAX
        };

        let proposed = current_exposure_pct + fraction;
        if proposed > self.config.max_exposure_pct {
            return RiskVerdict::Blocked {
                reason: RiskEventType::PositionSizeExceeded,
                detail: format!(
                    "proposed exposure {:.2}% exceeds bound {:.2}%",
                    proposed * 100.0,
                    self.config.max_exposure_pct * 100.0
                ),
            };
        }

        RiskVerdict::Approved {
            side: Side::Buy,
            size_fraction: fraction,
            forced_by_stop_loss: false,
        }
    }

    fn evaluate_sell(&self, signal: &Signal, inputs: &RiskInputs<'_>) -> RiskVerdict {
        // Nothing to sell: treat as a no-op rather than an error.
        if inputs.position.is_none_or(Position::is_flat) {
            return RiskVerdict::Hold;
        }

        // SELL uses the same confidence interpolation, read as the fraction
        // of the position to close.
        match size_fraction(signal.confidence, self.config.min_position_pct, 1.0) {
            Some(fraction) => RiskVerdict::Approved {
                side: Side::Sell,
                size_fraction: fraction,
                forced_by_stop_loss: false,
            },
            None => RiskVerdict::Hold,
        }
    }
}
