//! Database repositories for the trading agent.
//!
//! Each repository provides typed access to one table and implements the
//! corresponding storage trait from the core crate.

pub mod config_kv_repo;
pub mod daily_stats_repo;
pub mod market_sample_repo;
pub mod order_repo;
pub mod position_repo;
pub mod risk_event_repo;
pub mod signal_repo;

pub use config_kv_repo::ConfigKvRepository;
pub use daily_stats_repo::DailyStatsRepository;
pub use market_sample_repo::MarketSampleRepository;
pub use order_repo::OrderRepository;
pub use position_repo::PositionRepository;
pub use risk_event_repo::RiskEventRepository;
pub use signal_repo::SignalRepository;

use sqlx::PgPool;

/// All repositories built from a single database pool.
pub struct Repositories {
    pub market_samples: MarketSampleRepository,
    pub signals: SignalRepository,
    pub orders: OrderRepository,
    pub positions: PositionRepository,
    pub daily_stats: DailyStatsRepository,
    pub risk_events: RiskEventRepository,
    pub config: ConfigKvRepository,
}

impl Repositories {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            market_samples: MarketSampleRepository::new(pool.clone()),
            signals: SignalRepository::new(pool.clone()),
            orders: OrderRepository::new(pool.clone()),
            positions: PositionRepository::new(pool.clone()),
            daily_stats: DailyStatsRepository::new(pool.clone()),
            risk_events: RiskEventRepository::new(pool.clone()),
            config: ConfigKvRepository::new(pool),
        }
    }
}
