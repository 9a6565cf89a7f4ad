//! Consecutive price ratios with significance weighting

use super::helpers::{
    clamp_unit, has_volume, sigmoid, tolerance_proximity, GOLDEN_RATIO, SIGNIFICANCE_MOVE_PIVOT,
    SIGNIFICANCE_MOVE_WEIGHT, SIGNIFICANCE_PHI_WEIGHT, SIGNIFICANCE_STEEPNESS,
};
use crate::{AnalysisError, GeometricRatio, PricePoint, Result};

/// Converts a price sequence into `len - 1` consecutive ratios.
#[derive(Debug, Clone, Copy)]
pub struct RatioCalculator {
    pub tolerance: f64,
}

impl Default for RatioCalculator {
    fn default() -> Self {
        Self { tolerance: crate::DEFAULT_TOLERANCE }
    }
}

impl RatioCalculator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Ratios for the whole sequence. Fewer than two prices yields an empty vector.
    pub fn compute(&self, prices: &[PricePoint]) -> Result<Vec<GeometricRatio>> {
        if prices.len() < 2 {
            return Ok(Vec::new());
        }
        prices
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                if pair[0].price == 0.0 {
                    return Err(AnalysisError::DivisionByZero { index: i });
                }
                Ok(self.ratio_at(&pair[0], &pair[1]))
            })
            .collect()
    }

    /// Ratio between two adjacent points. Caller guarantees `prev.price != 0`.
    #[inline]
    pub fn ratio_at(&self, prev: &PricePoint, next: &PricePoint) -> GeometricRatio {
        let ratio = next.price / prev.price;
        GeometricRatio {
            ratio,
            significance: significance(prev, next, ratio, self.tolerance),
            timestamp: next.timestamp,
        }
    }
}

/// Index of the first zero price that would be used as a divisor
pub fn first_zero_divisor(prices: &[PricePoint]) -> Option<usize> {
    let divisors = prices.len().saturating_sub(1);
    prices[..divisors].iter().position(|p| p.price == 0.0)
}

/// Combines move magnitude, proximity to φ and relative volume.
pub fn significance(prev: &PricePoint, next: &PricePoint, ratio: f64, tolerance: f64) -> f64 {
    let move_size = (next.price - prev.price).abs() / prev.price.abs();
    let move_score = sigmoid(SIGNIFICANCE_STEEPNESS * (move_size - SIGNIFICANCE_MOVE_PIVOT));
    let phi_score = tolerance_proximity(ratio, GOLDEN_RATIO, tolerance);
    let base = clamp_unit(move_score * SIGNIFICANCE_MOVE_WEIGHT + phi_score * SIGNIFICANCE_PHI_WEIGHT);
    clamp_unit(base * volume_weight(prev.volume, next.volume))
}

/// 1.0 without volume data; otherwise damped when volume dries up.
#[inline]
pub fn volume_weight(prev: f64, next: f64) -> f64 {
    if !has_volume(prev) || !has_volume(next) {
        return 1.0;
    }
    0.5 + 0.5 * (next / prev).min(1.0)
}
