//! Common constants and numeric helpers for geometric pattern detection
//!
//! Fibonacci level tables and tolerance/accuracy functions shared across all detector modules
//! and the validator.

use crate::PricePoint;

// ============================================================
// FIBONACCI CONSTANTS
// ============================================================

/// Golden ratio φ = (1 + √5) / 2
pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;
/// Expected consecutive ratio pair for a Fibonacci extension (φ, φ²)
pub const EXTENSION_PAIR: [f64; 2] = [1.618, 2.618];
/// Canonical retracement levels
pub const RETRACEMENT_LEVELS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];
/// Canonical extension levels (leg-to-leg)
pub const EXTENSION_LEVELS: [f64; 6] = [1.0, 1.272, 1.618, 2.0, 2.618, 4.236];
/// Minimum number of ratios near φ for a golden spiral window
pub const MIN_SPIRAL_HITS: usize = 3;
/// Growth factor `b` of the golden spiral r = a·e^(bθ): grows by φ per quarter turn
pub const SPIRAL_GROWTH: f64 = 0.306_348_962_530_033_1; // ln(φ) / (π / 2)

// Significance weighting
pub const SIGNIFICANCE_MOVE_PIVOT: f64 = 0.05;
pub const SIGNIFICANCE_STEEPNESS: f64 = 10.0;
pub const SIGNIFICANCE_MOVE_WEIGHT: f64 = 0.7;
pub const SIGNIFICANCE_PHI_WEIGHT: f64 = 0.3;

// Trend filters
pub const SHORT_MA_PERIOD: usize = 20;
pub const LONG_MA_PERIOD: usize = 50;

/// Score substituted when a metric has no usable input
pub const NEUTRAL_SCORE: f64 = 0.5;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Absolute-tolerance match: |actual - target| <= tolerance
#[inline]
pub fn within_tolerance(actual: f64, target: f64, tolerance: f64) -> bool {
    (actual - target).abs() <= tolerance
}

/// Relative deviation |actual - expected| / expected
#[inline]
pub fn relative_deviation(actual: f64, expected: f64) -> f64 {
    (actual - expected).abs() / expected
}

/// `max(0, 1 - |actual - expected| / expected)`
#[inline]
pub fn relative_accuracy(actual: f64, expected: f64) -> f64 {
    (1.0 - relative_deviation(actual, expected)).max(0.0)
}

/// Linear proximity inside a tolerance band: 1 at the target, 0 at the band edge
#[inline]
pub fn tolerance_proximity(actual: f64, target: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return 0.0;
    }
    (1.0 - (actual - target).abs() / tolerance).max(0.0)
}

/// Returns `(level, distance)` for the level closest to `value`.
/// Ties resolve to the earlier level.
pub fn nearest_level(value: f64, levels: &[f64]) -> Option<(f64, f64)> {
    levels.iter().fold(None, |best, &level| {
        let distance = (value - level).abs();
        match best {
            Some((_, d)) if d <= distance => best,
            _ => Some((level, distance)),
        }
    })
}

#[inline]
pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Simple moving average of closing prices ending at `at` (inclusive).
/// Returns None until `period` bars of history exist.
#[inline]
pub fn trailing_sma(prices: &[PricePoint], at: usize, period: usize) -> Option<f64> {
    if period == 0 || at + 1 < period || at >= prices.len() {
        return None;
    }
    let slice = &prices[at + 1 - period..=at];
    Some(slice.iter().map(|p| p.price).sum::<f64>() / period as f64)
}

/// `(min, max)` price over `prices[start..=end]`
pub fn price_range(prices: &[PricePoint], start: usize, end: usize) -> (f64, f64) {
    prices[start..=end]
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.price), hi.max(p.price)))
}

/// Volume is usable when positive and finite
#[inline]
pub fn has_volume(volume: f64) -> bool {
    volume.is_finite() && volume > 0.0
}
