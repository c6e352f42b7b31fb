//! Confidence-based position sizing.
//!
//! Trade size is a linear interpolation over the model's stated confidence,
//! bounded by configured minimum and maximum capital fractions.

/// Confidence below this is never approved for entry.
pub const CONFIDENCE_FLOOR: f64 = 0.5;
/// Confidence at or above this maps to the maximum fraction.
pub const CONFIDENCE_CEILING: f64 = 0.9;

/// Maps confidence to a capital fraction in `[min_pct, max_pct]`.
///
/// Linear on `[0.5, 0.9]`, clamped outside that band. Confidence below 0.5
/// returns `None` — such signals are never sized.
#[must_use]
pub fn size_fraction(confidence: f64, min_pct: f64, max_pct: f64) -> Option<f64> {
    if confidence < CONFIDENCE_FLOOR || !confidence.is_finite() {
        return None;
    }
    let t = (confidence - CONFIDENCE_FLOOR) / (CONFIDENCE_CEILING - CONFIDENCE_FLOOR);
    let fraction = min_pct + t * (max_pct - min_pct);
    Some(fraction.clamp(min_pct, max_pct))
}
