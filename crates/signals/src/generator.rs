//! Signal generation orchestration.
//!
//! One run: load history, analyze, ask the provider chain, clamp, persist.
//! Every signal is persisted, HOLD included, for auditability. Data errors
//! degrade to a HOLD signal; only total provider failure surfaces as
//! `SignalUnavailable`, which the scheduler treats as a no-op run.

use std::sync::Arc;

use apex_trade_analysis::TechnicalAnalyzer;
use apex_trade_core::{
    AgentError, ExchangeClient, InferenceRequest, MarketDataStore, PositionStore, Signal,
    SignalDirection, SignalStore, TradingConfig,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::fallback::ProviderChain;

#[derive(Debug, Clone)]
pub enum SignalOutcome {
    /// A new signal was generated and persisted.
    Fresh(Signal),
    /// The previous signal is still inside the cooldown window and is
    /// returned unchanged.
    Cooldown(Signal),
}

impl SignalOutcome {
    #[must_use]
    pub const fn signal(&self) -> &Signal {
        match self {
            Self::Fresh(s) | Self::Cooldown(s) => s,
        }
    }
}

pub struct SignalGenerator {
    symbol: String,
    cooldown: Duration,
    history: Duration,
    analyzer: TechnicalAnalyzer,
    chain: ProviderChain,
    market_data: Arc<dyn MarketDataStore>,
    signals: Arc<dyn SignalStore>,
    positions: Arc<dyn PositionStore>,
    exchange: Arc<dyn ExchangeClient>,
}

impl SignalGenerator {
    #[must_use]
    pub fn new(
        config: &TradingConfig,
        chain: ProviderChain,
        market_data: Arc<dyn MarketDataStore>,
        signals: Arc<dyn SignalStore>,
        positions: Arc<dyn PositionStore>,
        exchange: Arc<dyn ExchangeClient>,
    ) -> Self {
        Self {
            symbol: config.symbol.clone(),
            cooldown: Duration::minutes(config.cooldown_minutes),
            history: Duration::days(config.history_days),
            analyzer: TechnicalAnalyzer::new(config.confluence_weights),
            chain,
            market_data,
            signals,
            positions,
            exchange,
        }
    }

    /// Runs one signal generation cycle.
    ///
    /// # Errors
    /// `SignalUnavailable` when every provider failed; storage errors when
    /// persistence fails. Insufficient market data is not an error here —
    /// it degrades to a persisted HOLD signal.
    pub async fn run(&self) -> Result<SignalOutcome, AgentError> {
        let now = Utc::now();

        // Cooldown guards against scheduler jitter producing duplicate work.
        if let Some(previous) = self
            .signals
            .latest_for_symbol(&self.symbol)
            .await
            .map_err(storage)?
        {
            if now - previous.timestamp < self.cooldown {
                tracing::debug!(
                    symbol = %self.symbol,
                    previous_id = %previous.id,
                    "inside cooldown window, reusing previous signal"
                );
                return Ok(SignalOutcome::Cooldown(previous));
            }
        }

        let samples = self
            .market_data
            .since(&self.symbol, now - self.history)
            .await
            .map_err(storage)?;

        let snapshot = match self.analyzer.analyze(&samples) {
            Ok(snapshot) => snapshot,
            Err(AgentError::InsufficientData(detail)) => {
                tracing::warn!(symbol = %self.symbol, %detail, "degrading to HOLD");
                return self.persist_degraded_hold(&detail).await;
            }
            Err(e) => return Err(e),
        };

        let ticker = self.exchange.get_ticker(&self.symbol).await?;
        let position = self.positions.get(&self.symbol).await.map_err(storage)?;

        let request = InferenceRequest {
            symbol: self.symbol.clone(),
            current_price: ticker.price,
            position,
            confluence_score: snapshot.confluence_score,
            technical_summary: snapshot.summary_json(),
        };

        let (verdict, model_name) = self.chain.infer(&request).await?;

        let mut confidence = verdict.confidence;
        let mut rationale = verdict.rationale;
        if !(0.0..=1.0).contains(&confidence) {
            tracing::warn!(
                symbol = %self.symbol,
                model = %model_name,
                confidence,
                "confidence out of range, clamping"
            );
            confidence = confidence.clamp(0.0, 1.0);
            rationale.push_str(" [confidence clamped]");
        }

        let signal = Signal {
            id: Uuid::new_v4(),
            timestamp: now,
            symbol: self.symbol.clone(),
            direction: verdict.direction,
            confidence,
            rationale,
            model_name,
            confluence_score: snapshot.confluence_score,
            snapshot: snapshot.summary_json(),
        };

        self.signals.insert(&signal).await.map_err(storage)?;
        tracing::info!(
            symbol = %self.symbol,
            id = %signal.id,
            direction = signal.direction.as_str(),
            confidence = signal.confidence,
            "signal persisted"
        );

        Ok(SignalOutcome::Fresh(signal))
    }

    async fn persist_degraded_hold(&self, detail: &str) -> Result<SignalOutcome, AgentError> {
        let signal = Signal {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: self.symbol.clone(),
            direction: SignalDirection::Hold,
            confidence: 0.0,
            rationale: format!("degraded to HOLD: {detail}"),
            model_name: "none".to_string(),
            confluence_score: 0.0,
            snapshot: serde_json::json!({ "degraded": detail }),
        };
        self.signals.insert(&signal).await.map_err(storage)?;
        Ok(SignalOutcome::Fresh(signal))
    }
}

fn storage(e: anyhow::Error) -> AgentError {
    AgentError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use apex_trade_core::config::ConfluenceWeights;
    use apex_trade_core::{
        Balance, InferenceProvider, MarketSample, ModelVerdict, OrderStatusReport, Position,
        RetryPolicy, SubmitOrderRequest, Ticker,
    };
    use async_trait::async_trait;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;
    use tokio::sync::Mutex;

    struct MemoryMarketData {
        samples: Vec<MarketSample>,
    }

    #[async_trait]
    impl MarketDataStore for MemoryMarketData {
        async fn append(&self, _sample: &MarketSample) -> Result<()> {
            unimplemented!("not used by the generator")
        }

        async fn since(&self, _symbol: &str, since: DateTime<Utc>) -> Result<Vec<MarketSample>> {
            Ok(self
                .samples
                .iter()
                .filter(|s| s.timestamp >= since)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MemorySignals {
        stored: Mutex<Vec<Signal>>,
    }

    #[async_trait]
    impl SignalStore for MemorySignals {
        async fn insert(&self, signal: &Signal) -> Result<()> {
            self.stored.lock().await.push(signal.clone());
            Ok(())
        }

        async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<Signal>> {
            Ok(self
                .stored
                .lock()
                .await
                .iter()
                .filter(|s| s.symbol == symbol)
                .max_by_key(|s| s.timestamp)
                .cloned())
        }
    }

    struct MemoryPositions(Option<Position>);

    #[async_trait]
    impl PositionStore for MemoryPositions {
        async fn get(&self, _symbol: &str) -> Result<Option<Position>> {
            Ok(self.0.clone())
        }
    }

    struct FixedExchange {
        price: Decimal,
    }

    #[async_trait]
    impl ExchangeClient for FixedExchange {
        async fn get_ticker(&self, _symbol: &str) -> Result<Ticker, AgentError> {
            Ok(Ticker {
                price: self.price,
                volume: dec!(100),
                high: self.price + dec!(10),
                low: self.price - dec!(10),
            })
        }

        async fn submit_order(&self, _request: &SubmitOrderRequest) -> Result<String, AgentError> {
            unimplemented!("generator never submits orders")
        }

        async fn get_order_status(&self, _id: &str) -> Result<OrderStatusReport, AgentError> {
            unimplemented!()
        }

        async fn get_balance(&self) -> Result<Balance, AgentError> {
            unimplemented!()
        }
    }

    struct FixedProvider {
        verdict: ModelVerdict,
    }

    #[async_trait]
    impl InferenceProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn infer(&self, _request: &InferenceRequest) -> Result<ModelVerdict, AgentError> {
            Ok(ModelVerdict {
                direction: self.verdict.direction,
                confidence: self.verdict.confidence,
                rationale: self.verdict.rationale.clone(),
            })
        }
    }

    fn config() -> TradingConfig {
        TradingConfig {
            symbol: "BTCUSDT".to_string(),
            total_capital: dec!(10000),
            cooldown_minutes: 10,
            history_days: 90,
            daily_loss_limit_pct: 0.03,
            volatility_threshold_pct: 0.02,
            stop_loss_pct: 0.05,
            min_position_pct: 0.05,
            max_position_pct: 0.25,
            max_exposure_pct: 0.5,
            confluence_weights: ConfluenceWeights::default(),
        }
    }

    fn uptrend_samples() -> Vec<MarketSample> {
        let start = Utc::now() - Duration::hours(41);
        (0i64..40 * 60)
            .map(|i| {
                let price = dec!(100) + Decimal::new(i, 2);
                MarketSample {
                    symbol: "BTCUSDT".to_string(),
                    timestamp: start + Duration::minutes(i),
                    price,
                    volume: dec!(1),
                    high: price + dec!(0.5),
                    low: price - dec!(0.5),
                    trade_count: 3,
                }
            })
            .collect()
    }

    fn generator_with(
        samples: Vec<MarketSample>,
        provider_confidence: f64,
        direction: SignalDirection,
        signals: Arc<MemorySignals>,
    ) -> SignalGenerator {
        let provider = Arc::new(FixedProvider {
            verdict: ModelVerdict {
                direction,
                confidence: provider_confidence,
                rationale: "test rationale".to_string(),
            },
        });
        let chain = ProviderChain::new(
            vec![provider as Arc<dyn InferenceProvider>],
            RetryPolicy::new(3, StdDuration::from_millis(1), 2),
        );
        SignalGenerator::new(
            &config(),
            chain,
            Arc::new(MemoryMarketData { samples }),
            signals,
            Arc::new(MemoryPositions(None)),
            Arc::new(FixedExchange { price: dec!(124) }),
        )
    }

    #[tokio::test]
    async fn fresh_signal_is_persisted() {
        let signals = Arc::new(MemorySignals::default());
        let generator = generator_with(
            uptrend_samples(),
            0.8,
            SignalDirection::Buy,
            signals.clone(),
        );

        let outcome = generator.run().await.unwrap();
        assert!(matches!(outcome, SignalOutcome::Fresh(_)));
        assert_eq!(signals.stored.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn hold_verdicts_are_persisted_too() {
        let signals = Arc::new(MemorySignals::default());
        let generator = generator_with(
            uptrend_samples(),
            0.5,
            SignalDirection::Hold,
            signals.clone(),
        );

        generator.run().await.unwrap();
        let stored = signals.stored.lock().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].direction, SignalDirection::Hold);
    }

    #[tokio::test]
    async fn cooldown_reuses_previous_signal() {
        let signals = Arc::new(MemorySignals::default());
        let generator = generator_with(
            uptrend_samples(),
            0.8,
            SignalDirection::Buy,
            signals.clone(),
        );

        let first = generator.run().await.unwrap();
        let second = generator.run().await.unwrap();

        assert!(matches!(second, SignalOutcome::Cooldown(_)));
        assert_eq!(first.signal().id, second.signal().id);
        assert_eq!(signals.stored.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped_and_flagged() {
        let signals = Arc::new(MemorySignals::default());
        let generator = generator_with(
            uptrend_samples(),
            1.7,
            SignalDirection::Buy,
            signals.clone(),
        );

        let outcome = generator.run().await.unwrap();
        let signal = outcome.signal();
        assert!((signal.confidence - 1.0).abs() < 1e-12);
        assert!(signal.rationale.contains("confidence clamped"));
    }

    #[tokio::test]
    async fn insufficient_data_degrades_to_persisted_hold() {
        let signals = Arc::new(MemorySignals::default());
        let generator =
            generator_with(Vec::new(), 0.8, SignalDirection::Buy, signals.clone());

        let outcome = generator.run().await.unwrap();
        let signal = outcome.signal();
        assert_eq!(signal.direction, SignalDirection::Hold);
        assert!(signal.rationale.contains("degraded"));
        assert_eq!(signals.stored.lock().await.len(), 1);
    }
}
