//! Multi-timeframe technical assessment and confluence scoring.

use std::collections::BTreeMap;

use apex_trade_core::{AgentError, MarketSample};
use apex_trade_core::config::ConfluenceWeights;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::indicators::{
    atr, bollinger, ema_slope, macd, rsi, ATR_PERIOD, BOLLINGER_PERIOD, BOLLINGER_WIDTH,
    EMA_TREND_PERIOD, RSI_PERIOD,
};
use crate::resample::{resample, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndicatorValues {
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger_percent_b: Option<f64>,
    pub ema_slope: Option<f64>,
    pub atr: Option<f64>,
}

/// Per-timeframe verdict derived from whatever indicators were defined.
#[derive(Debug, Clone, Serialize)]
pub struct TimeframeAssessment {
    pub trend: Trend,
    /// Vote agreement among defined indicators, in `[0, 1]`.
    pub strength: f64,
    pub indicators: IndicatorValues,
}

/// Derived, non-persisted aggregate of all timeframe assessments.
#[derive(Debug, Clone, Serialize)]
pub struct TechnicalSnapshot {
    pub timeframes: BTreeMap<Timeframe, TimeframeAssessment>,
    pub confluence_score: f64,
    pub dominant_trend: Trend,
}

impl TechnicalSnapshot {
    /// JSON summary embedded in inference requests and persisted with the
    /// signal.
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        let timeframes: serde_json::Map<String, serde_json::Value> = self
            .timeframes
            .iter()
            .map(|(tf, a)| {
                (
                    tf.as_str().to_string(),
                    serde_json::json!({
                        "trend": a.trend,
                        "strength": a.strength,
                        "indicators": a.indicators,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "timeframes": timeframes,
            "confluence_score": self.confluence_score,
            "dominant_trend": self.dominant_trend,
        })
    }
}

pub struct TechnicalAnalyzer {
    weights: ConfluenceWeights,
}

impl TechnicalAnalyzer {
    #[must_use]
    pub const fn new(weights: ConfluenceWeights) -> Self {
        Self { weights }
    }

    /// Assesses all timeframes from raw samples and computes confluence.
    ///
    /// Timeframes with too little data are silently excluded and their
    /// weights re-normalized over the rest.
    ///
    /// # Errors
    /// `AgentError::InsufficientData` only when no timeframe has enough
    /// samples for any indicator.
    pub fn analyze(&self, samples: &[MarketSample]) -> Result<TechnicalSnapshot, AgentError> {
        let mut timeframes = BTreeMap::new();

        for timeframe in Timeframe::ALL {
            let candles = resample(samples, timeframe);
            if let Some(assessment) = assess_candles(&candles) {
                timeframes.insert(timeframe, assessment);
            } else {
                tracing::debug!(
                    timeframe = timeframe.as_str(),
                    candles = candles.len(),
                    "timeframe excluded from confluence, not enough data"
                );
            }
        }

        if timeframes.is_empty() {
            return Err(AgentError::InsufficientData(format!(
                "no timeframe has enough samples (got {})",
                samples.len()
            )));
        }

        let (confluence_score, dominant_trend) = confluence(&timeframes, self.weights);

        Ok(TechnicalSnapshot {
            timeframes,
            confluence_score,
            dominant_trend,
        })
    }
}

const fn weight_for(weights: ConfluenceWeights, timeframe: Timeframe) -> f64 {
    match timeframe {
        Timeframe::H1 => weights.h1,
        Timeframe::H4 => weights.h4,
        Timeframe::D1 => weights.d1,
        Timeframe::W1 => weights.w1,
    }
}

/// Weighted directional agreement across the defined timeframes.
///
/// The dominant trend is the weighted majority; the score is the
/// re-normalized weight of timeframes agreeing with it, with sideways
/// timeframes counting half.
fn confluence(
    timeframes: &BTreeMap<Timeframe, TimeframeAssessment>,
    weights: ConfluenceWeights,
) -> (f64, Trend) {
    let total_weight: f64 = timeframes
        .keys()
        .map(|tf| weight_for(weights, *tf))
        .sum();
    if total_weight <= 0.0 {
        return (0.0, Trend::Sideways);
    }

    let mut net = 0.0;
    for (tf, assessment) in timeframes {
        let w = weight_for(weights, *tf) / total_weight;
        match assessment.trend {
            Trend::Bullish => net += w * assessment.strength,
            Trend::Bearish => net -= w * assessment.strength,
            Trend::Sideways => {}
        }
    }

    let dominant = if net > f64::EPSILON {
        Trend::Bullish
    } else if net < -f64::EPSILON {
        Trend::Bearish
    } else {
        Trend::Sideways
    };

    if dominant == Trend::Sideways {
        return (0.5, dominant);
    }

    let mut score = 0.0;
    for (tf, assessment) in timeframes {
        let w = weight_for(weights, *tf) / total_weight;
        if assessment.trend == dominant {
            score += w;
        } else if assessment.trend == Trend::Sideways {
            score += w * 0.5;
        }
    }

    (score.clamp(0.0, 1.0), dominant)
}

/// Assesses one timeframe's candles; `None` when every indicator is
/// undefined.
fn assess_candles(candles: &[crate::resample::Candle]) -> Option<TimeframeAssessment> {
    let closes: Vec<f64> = candles.iter().filter_map(|c| c.close.to_f64()).collect();

    let indicators = IndicatorValues {
        rsi: rsi(&closes, RSI_PERIOD),
        macd_histogram: macd(&closes).map(|m| m.histogram),
        bollinger_percent_b: bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_WIDTH)
            .map(|b| b.percent_b),
        ema_slope: ema_slope(&closes, EMA_TREND_PERIOD),
        atr: atr(candles, ATR_PERIOD),
    };

    // Directional votes; ATR measures magnitude only and does not vote.
    let mut bull = 0u32;
    let mut bear = 0u32;
    let mut defined = 0u32;

    if let Some(v) = indicators.rsi {
        defined += 1;
        if v > 55.0 {
            bull += 1;
        } else if v < 45.0 {
            bear += 1;
        }
    }
    if let Some(v) = indicators.macd_histogram {
        defined += 1;
        if v > 0.0 {
            bull += 1;
        } else if v < 0.0 {
            bear += 1;
        }
    }
    if let Some(v) = indicators.bollinger_percent_b {
        defined += 1;
        if v > 0.55 {
            bull += 1;
        } else if v < 0.45 {
            bear += 1;
        }
    }
    if let Some(v) = indicators.ema_slope {
        defined += 1;
        if v > 0.0 {
            bull += 1;
        } else if v < 0.0 {
            bear += 1;
        }
    }

    if defined == 0 {
        return None;
    }

    let (trend, margin) = if bull > bear {
        (Trend::Bullish, bull - bear)
    } else if bear > bull {
        (Trend::Bearish, bear - bull)
    } else {
        (Trend::Sideways, 0)
    };
    let strength = f64::from(margin) / f64::from(defined);

    Some(TimeframeAssessment {
        trend,
        strength,
        indicators,
    })
}
