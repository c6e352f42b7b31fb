//! Shared component wiring for the run and signal-once commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use apex_trade_core::{
    AppConfig, ConfigLoader, ExchangeClient, ExecutionMode, InferenceProvider, RetryPolicy,
    RuntimeFlags,
};
use apex_trade_data::{DatabaseClient, Repositories};
use apex_trade_exchange::{HttpExchange, PaperExchange};
use apex_trade_execution::OrderExecutor;
use apex_trade_signals::{OpenAiProvider, ProviderChain, SignalGenerator};

pub struct Components {
    pub config: AppConfig,
    pub repos: Repositories,
    pub exchange: Arc<dyn ExchangeClient>,
    pub flags: RuntimeFlags,
}

/// Loads config, validates it, connects the database, and builds the
/// exchange client for the configured mode.
pub async fn build_components(config_path: &str) -> Result<Components> {
    let config = ConfigLoader::load_from(AppConfig::default(), config_path)?;
    config.validate().context("invalid configuration")?;

    let db = DatabaseClient::new(&config.database)
        .await
        .context("database connection failed")?;
    db.migrate().await.context("schema migration failed")?;
    let repos = Repositories::new(db.pool());

    let exchange = build_exchange(&config)?;
    let flags = RuntimeFlags::new(Arc::new(repos.config.clone()));

    Ok(Components {
        config,
        repos,
        exchange,
        flags,
    })
}

fn build_exchange(config: &AppConfig) -> Result<Arc<dyn ExchangeClient>> {
    let http = Arc::new(HttpExchange::new(&config.exchange)?);
    match config.exchange.mode {
        ExecutionMode::Live => Ok(http),
        ExecutionMode::Paper => {
            // Paper fills against the live price feed, no orders sent out.
            let paper = PaperExchange::new(&config.exchange, config.trading.total_capital)
                .with_feed(http);
            Ok(Arc::new(paper))
        }
    }
}

pub fn build_provider_chain(config: &AppConfig) -> Result<ProviderChain> {
    let timeout = Duration::from_secs(config.ai.request_timeout_secs);
    let providers = config
        .ai
        .providers
        .iter()
        .map(|p| {
            OpenAiProvider::new(p, timeout).map(|p| Arc::new(p) as Arc<dyn InferenceProvider>)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ProviderChain::new(providers, RetryPolicy::standard()))
}

pub fn build_generator(components: &Components) -> Result<SignalGenerator> {
    let chain = build_provider_chain(&components.config)?;
    Ok(SignalGenerator::new(
        &components.config.trading,
        chain,
        Arc::new(components.repos.market_samples.clone()),
        Arc::new(components.repos.signals.clone()),
        Arc::new(components.repos.positions.clone()),
        components.exchange.clone(),
    ))
}

pub fn build_executor(components: &Components) -> OrderExecutor {
    OrderExecutor::new(
        components.exchange.clone(),
        Arc::new(components.repos.orders.clone()),
        Arc::new(components.repos.positions.clone()),
        &components.config.exchange,
        RetryPolicy::standard(),
    )
}
