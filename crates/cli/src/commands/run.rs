//! The `run` subcommand: the unattended trading daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use apex_trade_agent::{
    CollectorJob, OrderSyncJob, SignalJob, TracingNotifier, TradingRunner, VolatilityJob,
};
use apex_trade_scheduler::Scheduler;
use tokio::sync::watch;
use tracing::info;

use super::wiring::{build_components, build_executor, build_generator};

pub async fn run_daemon(config_path: &str) -> Result<()> {
    let components = build_components(config_path).await?;
    let config = &components.config;
    info!(
        symbol = %config.trading.symbol,
        mode = ?config.exchange.mode,
        "starting trading agent"
    );

    let generator = build_generator(&components)?;
    let executor = build_executor(&components);
    let runner = Arc::new(TradingRunner::new(
        config.trading.clone(),
        generator,
        executor,
        components.flags.clone(),
        components.exchange.clone(),
        Arc::new(components.repos.market_samples.clone()),
        Arc::new(components.repos.positions.clone()),
        Arc::new(components.repos.daily_stats.clone()),
        Arc::new(components.repos.risk_events.clone()),
        Arc::new(TracingNotifier),
    ));

    let mut scheduler = Scheduler::new();
    scheduler.add(
        Arc::new(CollectorJob {
            exchange: components.exchange.clone(),
            market_data: Arc::new(components.repos.market_samples.clone()),
            symbol: config.trading.symbol.clone(),
        }),
        Duration::from_secs(config.scheduler.sample_interval_secs),
    );
    scheduler.add(
        Arc::new(SignalJob { runner }),
        Duration::from_secs(config.scheduler.signal_interval_secs),
    );
    scheduler.add(
        Arc::new(VolatilityJob {
            exchange: components.exchange.clone(),
            market_data: Arc::new(components.repos.market_samples.clone()),
            risk_events: Arc::new(components.repos.risk_events.clone()),
            symbol: config.trading.symbol.clone(),
            threshold_pct: config.trading.volatility_threshold_pct,
        }),
        Duration::from_secs(config.scheduler.volatility_interval_secs),
    );
    scheduler.add(
        Arc::new(OrderSyncJob {
            exchange: components.exchange.clone(),
            orders: Arc::new(components.repos.orders.clone()),
            positions: Arc::new(components.repos.positions.clone()),
            symbol: config.trading.symbol.clone(),
        }),
        Duration::from_secs(config.scheduler.order_sync_interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown_tx.send(true)?;
    scheduler_handle.await??;
    info!("trading agent stopped");

    Ok(())
}
