//! The `signal-once` subcommand: one signal/risk pass with the verdict
//! printed, no order placed. Useful for dry-running a configuration.

use anyhow::Result;
use apex_trade_core::{DailyStatsStore, MarketDataStore, PositionStore, RiskVerdict};
use apex_trade_risk::{RiskGate, RiskInputs};
use apex_trade_signals::SignalOutcome;
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::wiring::{build_components, build_generator};

pub async fn signal_once(config_path: &str) -> Result<()> {
    let components = build_components(config_path).await?;
    let generator = build_generator(&components)?;

    let outcome = generator.run().await?;
    let signal = outcome.signal();
    match &outcome {
        SignalOutcome::Fresh(_) => println!("signal: fresh"),
        SignalOutcome::Cooldown(_) => println!("signal: previous (cooldown)"),
    }
    println!(
        "  {} {} confidence={:.2} confluence={:.2}",
        signal.symbol,
        signal.direction.as_str(),
        signal.confidence,
        signal.confluence_score
    );
    println!("  rationale: {}", signal.rationale);

    let trading_config = &components.config.trading;
    let trading_enabled = components.flags.trading_enabled().await;
    let ticker = components.exchange.get_ticker(&trading_config.symbol).await?;
    let position = components
        .repos
        .positions
        .get(&trading_config.symbol)
        .await?;
    let stats = components
        .repos
        .daily_stats
        .get_or_create(Utc::now().date_naive(), trading_config.total_capital)
        .await?;

    let since = Utc::now() - Duration::minutes(5);
    let samples = components
        .repos
        .market_samples
        .since(&trading_config.symbol, since)
        .await?;
    let trailing_change_pct = samples
        .first()
        .filter(|s| s.price > Decimal::ZERO)
        .and_then(|s| ((ticker.price - s.price) / s.price).to_f64())
        .unwrap_or(0.0);

    let gate = RiskGate::new(trading_config.clone());
    let verdict = gate.evaluate(
        signal,
        &RiskInputs {
            position: position.as_ref(),
            daily_stats: &stats,
            current_price: ticker.price,
            trailing_change_pct,
            trading_enabled,
        },
    );

    match verdict {
        RiskVerdict::Approved {
            side,
            size_fraction,
            forced_by_stop_loss,
        } => {
            println!(
                "verdict: APPROVED {} at {:.1}% of capital{}",
                side.as_str(),
                size_fraction * 100.0,
                if forced_by_stop_loss {
                    " (stop-loss override)"
                } else {
                    ""
                }
            );
        }
        RiskVerdict::Hold => println!("verdict: HOLD"),
        RiskVerdict::Blocked { reason, detail } => {
            println!("verdict: BLOCKED [{}] {detail}", reason.as_str());
        }
    }

    Ok(())
}
