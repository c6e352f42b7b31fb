use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub exchange: ExchangeConfig,
    pub ai: AiConfig,
    pub trading: TradingConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Real orders against the exchange API.
    Live,
    /// Simulated fills, zero exchange calls.
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub mode: ExecutionMode,
    /// Per-request deadline for exchange calls.
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
    /// Bounded fill-detection polling after submission.
    pub order_poll_attempts: u32,
    pub order_poll_interval_ms: u64,
    /// Simulated slippage/commission, used in paper mode only.
    pub paper_slippage_bps: f64,
    pub paper_commission_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Providers in priority order; the first that answers wins.
    pub providers: Vec<AiProviderConfig>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    pub name: String,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub symbol: String,
    /// Capital committed to the agent, in quote currency.
    pub total_capital: Decimal,
    /// No new signal within this many minutes of the previous one.
    pub cooldown_minutes: i64,
    /// Sample history window loaded for technical analysis.
    pub history_days: i64,
    pub daily_loss_limit_pct: f64,
    /// Trailing 5-minute price change that counts as high volatility.
    pub volatility_threshold_pct: f64,
    pub stop_loss_pct: f64,
    pub min_position_pct: f64,
    pub max_position_pct: f64,
    /// Upper bound on total exposure as a fraction of capital.
    pub max_exposure_pct: f64,
    pub confluence_weights: ConfluenceWeights,
}

/// Per-timeframe weights for the confluence score. Re-normalized at use
/// over the timeframes that actually have enough data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfluenceWeights {
    pub h1: f64,
    pub h4: f64,
    pub d1: f64,
    pub w1: f64,
}

impl Default for ConfluenceWeights {
    fn default() -> Self {
        Self {
            h1: 0.20,
            h4: 0.25,
            d1: 0.30,
            w1: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub signal_interval_secs: u64,
    pub volatility_interval_secs: u64,
    pub order_sync_interval_secs: u64,
    pub sample_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/apex_trade".to_string(),
                max_connections: 10,
            },
            exchange: ExchangeConfig {
                api_url: "https://api.exchange.example".to_string(),
                api_key: String::new(),
                api_secret: String::new(),
                mode: ExecutionMode::Paper,
                request_timeout_secs: 10,
                requests_per_second: 20,
                order_poll_attempts: 30,
                order_poll_interval_ms: 500,
                paper_slippage_bps: 10.0,
                paper_commission_rate: 0.001,
            },
            ai: AiConfig {
                providers: Vec::new(),
                request_timeout_secs: 30,
            },
            trading: TradingConfig {
                symbol: "BTCUSDT".to_string(),
                total_capital: Decimal::new(10_000, 0),
                cooldown_minutes: 10,
                history_days: 90,
                daily_loss_limit_pct: 0.03,
                volatility_threshold_pct: 0.02,
                stop_loss_pct: 0.05,
                min_position_pct: 0.05,
                max_position_pct: 0.25,
                max_exposure_pct: 0.50,
                confluence_weights: ConfluenceWeights::default(),
            },
            scheduler: SchedulerConfig {
                signal_interval_secs: 300,
                volatility_interval_secs: 60,
                order_sync_interval_secs: 30,
                sample_interval_secs: 60,
            },
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<(), AgentError> {
    if !(0.0..=1.0).contains(&value) || !value.is_finite() {
        return Err(AgentError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Validates ranges and credentials once at startup. Violations are
    /// fatal configuration errors, never retried.
    ///
    /// # Errors
    /// Returns `AgentError::Config` describing the first violation found.
    pub fn validate(&self) -> Result<(), AgentError> {
        let t = &self.trading;
        check_fraction("trading.daily_loss_limit_pct", t.daily_loss_limit_pct)?;
        check_fraction("trading.volatility_threshold_pct", t.volatility_threshold_pct)?;
        check_fraction("trading.stop_loss_pct", t.stop_loss_pct)?;
        check_fraction("trading.min_position_pct", t.min_position_pct)?;
        check_fraction("trading.max_position_pct", t.max_position_pct)?;
        check_fraction("trading.max_exposure_pct", t.max_exposure_pct)?;

        if t.min_position_pct > t.max_position_pct {
            return Err(AgentError::Config(
                "trading.min_position_pct exceeds trading.max_position_pct".to_string(),
            ));
        }
        if t.total_capital <= Decimal::ZERO {
            return Err(AgentError::Config(
                "trading.total_capital must be positive".to_string(),
            ));
        }
        if t.cooldown_minutes < 0 {
            return Err(AgentError::Config(
                "trading.cooldown_minutes must be non-negative".to_string(),
            ));
        }
        if t.history_days <= 0 {
            return Err(AgentError::Config(
                "trading.history_days must be positive".to_string(),
            ));
        }

        let w = &t.confluence_weights;
        for (name, value) in [
            ("confluence_weights.h1", w.h1),
            ("confluence_weights.h4", w.h4),
            ("confluence_weights.d1", w.d1),
            ("confluence_weights.w1", w.w1),
        ] {
            check_fraction(name, value)?;
        }

        if self.ai.providers.is_empty() {
            return Err(AgentError::Config(
                "ai.providers must list at least one provider".to_string(),
            ));
        }
        for provider in &self.ai.providers {
            if provider.api_key.is_empty() {
                return Err(AgentError::Config(format!(
                    "ai provider '{}' is missing an api_key",
                    provider.name
                )));
            }
        }

        if self.exchange.mode == ExecutionMode::Live
            && (self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty())
        {
            return Err(AgentError::Config(
                "live mode requires exchange.api_key and exchange.api_secret".to_string(),
            ));
        }

        Ok(())
    }
}
