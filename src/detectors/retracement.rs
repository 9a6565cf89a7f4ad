//! Fibonacci retracements over swing triples
//!
//! For three consecutive swings A, B, C the retracement level is `|C - B| / |B - A|`. A candidate
//! is emitted when that level sits within `tolerance` of a canonical level.

use super::helpers::{nearest_level, tolerance_proximity, RETRACEMENT_LEVELS};
use crate::{Pattern, PatternKind, PricePoint, SwingPoint};

#[derive(Debug, Clone, Copy)]
pub struct RetracementScanner {
    pub tolerance: f64,
}

impl Default for RetracementScanner {
    fn default() -> Self {
        Self { tolerance: crate::DEFAULT_TOLERANCE }
    }
}

impl RetracementScanner {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Retracement of C against the A-B leg. None for a zero-length leg.
    pub fn level(window: &[SwingPoint]) -> Option<f64> {
        let [a, b, c] = window else {
            return None;
        };
        let leg = (b.price - a.price).abs();
        (leg > 0.0).then(|| (c.price - b.price).abs() / leg)
    }

    pub fn detect(&self, swings: &[SwingPoint], prices: &[PricePoint]) -> Vec<Pattern> {
        swings
            .windows(3)
            .filter_map(|window| {
                let level = Self::level(window)?;
                let (target, distance) = nearest_level(level, &RETRACEMENT_LEVELS)?;
                if distance > self.tolerance {
                    return None;
                }
                Some(Pattern::from_span(
                    PatternKind::FibonacciRetracement,
                    window[0].index,
                    window[2].index,
                    tolerance_proximity(level, target, self.tolerance),
                    window.iter().map(|s| s.index).collect(),
                    vec![level],
                    prices,
                ))
            })
            .collect()
    }
}
