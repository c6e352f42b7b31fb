pub mod config;
pub mod config_loader;
pub mod errors;
pub mod position;
pub mod retry;
pub mod runtime;
pub mod sizing;
pub mod traits;
pub mod types;

pub use config::{
    AiConfig, AiProviderConfig, AppConfig, DatabaseConfig, ExchangeConfig, ExecutionMode,
    SchedulerConfig, TradingConfig,
};
pub use config_loader::ConfigLoader;
pub use errors::AgentError;
pub use position::Position;
pub use retry::{with_retry, RetryPolicy};
pub use runtime::{RuntimeFlags, TRADING_ENABLED_KEY};
pub use sizing::size_fraction;
pub use traits::{
    ConfigStore, DailyStatsStore, ExchangeClient, InferenceProvider, MarketDataStore, Notifier,
    OrderStore, PositionStore, RiskEventSink, SignalStore,
};
pub use types::{
    Balance, DailyStats, ExchangeOrderState, Fill, InferenceRequest, MarketSample, ModelVerdict,
    NotifyEvent, Order, OrderStatus, OrderStatusReport, OrderType, RiskEvent, RiskEventType,
    RiskVerdict, Side, Signal, SignalDirection, SubmitOrderRequest, Ticker,
};
