//! Indicator primitives over closing-price series.
//!
//! Every function returns `None` when fewer than `period + 1` inputs are
//! available; the caller drops undefined indicators from confluence
//! weighting instead of treating this as an error.

use rust_decimal::prelude::ToPrimitive;

use crate::resample::Candle;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const ATR_PERIOD: usize = 14;
pub const EMA_TREND_PERIOD: usize = 20;

/// EMA sequence seeded with the SMA of the first `period` values.
/// Output index `i` corresponds to input index `i + period - 1`.
fn ema_seq(values: &[f64], period: usize) -> Vec<f64> {
    if values.len() < period || period == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &value in &values[period..] {
        prev = alpha * value + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Latest EMA value.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period + 1 {
        return None;
    }
    ema_seq(values, period).last().copied()
}

/// Change of the EMA over the most recent step. Positive when rising.
#[must_use]
pub fn ema_slope(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period + 1 {
        return None;
    }
    let seq = ema_seq(values, period);
    match seq.as_slice() {
        [.., prev, last] => Some(last - prev),
        _ => None,
    }
}

/// Relative Strength Index with Wilder's smoothing.
#[must_use]
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period + 1 || period == 0 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in values[..=period].windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    for pair in values[period..].windows(2) {
        let delta = pair[1] - pair[0];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Debug, Clone, Copy)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD: EMA(12) − EMA(26) with a 9-period signal line.
#[must_use]
pub fn macd(values: &[f64]) -> Option<Macd> {
    if values.len() < MACD_SLOW + MACD_SIGNAL {
        return None;
    }

    let fast = ema_seq(values, MACD_FAST);
    let slow = ema_seq(values, MACD_SLOW);

    // slow[i] sits at input index i + MACD_SLOW - 1; align fast to the same
    // input index.
    let macd_line: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, s)| fast[i + MACD_SLOW - MACD_FAST] - s)
        .collect();

    let signal_seq = ema_seq(&macd_line, MACD_SIGNAL);
    let signal = *signal_seq.last()?;
    let macd_value = *macd_line.last()?;

    Some(Macd {
        macd: macd_value,
        signal,
        histogram: macd_value - signal,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Position of the last close within the bands: 0 at the lower band,
    /// 1 at the upper.
    pub percent_b: f64,
}

/// Bollinger bands: `period` SMA ± `width` standard deviations.
#[must_use]
pub fn bollinger(values: &[f64], period: usize, width: f64) -> Option<Bollinger> {
    if values.len() < period + 1 || period == 0 {
        return None;
    }

    let window = &values[values.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + width * std_dev;
    let lower = middle - width * std_dev;
    let last = *values.last()?;
    let percent_b = if upper > lower {
        (last - lower) / (upper - lower)
    } else {
        0.5
    };

    Some(Bollinger {
        upper,
        middle,
        lower,
        percent_b,
    })
}

/// Average True Range with Wilder's smoothing over candle data.
#[must_use]
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let prev_close = pair[0].close.to_f64()?;
        let high = pair[1].high.to_f64()?;
        let low = pair[1].low.to_f64()?;
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        true_ranges.push(tr);
    }

    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for &tr in &true_ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(value)
}
