//! Time-bucket aggregation of raw market samples into OHLCV candles.

use apex_trade_core::MarketSample;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    pub const ALL: [Self; 4] = [Self::H1, Self::H4, Self::D1, Self::W1];

    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
            Self::W1 => 604_800,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Buckets samples into OHLCV candles for the given timeframe.
///
/// Samples must be ordered oldest first; candles come out oldest first.
/// Gaps produce no candle (no forward fill).
#[must_use]
pub fn resample(samples: &[MarketSample], timeframe: Timeframe) -> Vec<Candle> {
    let bucket_secs = timeframe.seconds();
    let mut candles: Vec<Candle> = Vec::new();
    let mut current_bucket: Option<i64> = None;

    for sample in samples {
        let bucket = sample.timestamp.timestamp().div_euclid(bucket_secs) * bucket_secs;

        match (current_bucket, candles.last_mut()) {
            (Some(open_bucket), Some(candle)) if open_bucket == bucket => {
                candle.high = candle.high.max(sample.high);
                candle.low = candle.low.min(sample.low);
                candle.close = sample.price;
                candle.volume += sample.volume;
            }
            _ => {
                current_bucket = Some(bucket);
                candles.push(Candle {
                    timestamp: Utc.timestamp_opt(bucket, 0).single().unwrap_or(sample.timestamp),
                    open: sample.price,
                    high: sample.high,
                    low: sample.low,
                    close: sample.price,
                    volume: sample.volume,
                });
            }
        }
    }

    candles
}
