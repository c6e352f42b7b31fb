pub mod analyzer;
pub mod indicators;
pub mod resample;

pub use analyzer::{
    IndicatorValues, TechnicalAnalyzer, TechnicalSnapshot, TimeframeAssessment, Trend,
};
pub use resample::{resample, Candle, Timeframe};
