pub mod database;
pub mod repositories;

pub use database::DatabaseClient;
pub use repositories::{
    ConfigKvRepository, DailyStatsRepository, MarketSampleRepository, OrderRepository,
    PositionRepository, Repositories, RiskEventRepository, SignalRepository,
};
