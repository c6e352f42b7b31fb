pub mod jobs;
pub mod notify;
pub mod runner;

pub use jobs::{CollectorJob, OrderSyncJob, SignalJob, VolatilityJob};
pub use notify::TracingNotifier;
pub use runner::TradingRunner;
