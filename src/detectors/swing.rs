//! Swing point (local extremum) extraction

use crate::{PricePoint, SwingKind, SwingPoint};

/// Finds strict local highs and lows, emitting them in alternating order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwingExtractor;

impl SwingExtractor {
    pub fn new() -> Self {
        Self
    }

    /// A point is a swing high when strictly above both neighbours and a swing low when strictly
    /// below both. Plateaus never qualify. A swing on the same side as the last emitted swing is
    /// skipped so the output always alternates.
    pub fn extract(&self, prices: &[PricePoint]) -> Vec<SwingPoint> {
        let mut swings: Vec<SwingPoint> = Vec::new();
        if prices.len() < 3 {
            return swings;
        }

        for i in 1..prices.len() - 1 {
            let (prev, cur, next) = (prices[i - 1].price, prices[i].price, prices[i + 1].price);
            let kind = if cur > prev && cur > next {
                SwingKind::High
            } else if cur < prev && cur < next {
                SwingKind::Low
            } else {
                continue;
            };

            if swings.last().is_some_and(|last| last.kind == kind) {
                continue;
            }
            swings.push(SwingPoint { price: cur, index: i, kind });
        }

        swings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(prices: &[f64]) -> Vec<PricePoint> {
        prices.iter().enumerate().map(|(i, &p)| PricePoint::new(p, 0.0, i as i64)).collect()
    }

    #[test]
    fn test_zigzag() {
        let swings = SwingExtractor.extract(&points(&[1.0, 3.0, 2.0, 4.0, 1.0, 5.0]));
        let idx: Vec<_> = swings.iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![1, 2, 3, 4]);
        assert_eq!(swings[0].kind, SwingKind::High);
        assert_eq!(swings[1].kind, SwingKind::Low);
    }

    #[test]
    fn test_plateau_is_not_a_swing() {
        let swings = SwingExtractor.extract(&points(&[1.0, 3.0, 3.0, 1.0, 0.5]));
        assert!(swings.is_empty());
    }

    #[test]
    fn test_alternation_skips_repeated_side() {
        // Highs at 1 and 4 separated only by a plateau low
        let swings = SwingExtractor.extract(&points(&[1.0, 5.0, 2.0, 2.0, 6.0, 3.0, 7.0]));
        let kinds: Vec<_> = swings.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SwingKind::High, SwingKind::Low]);
        assert_eq!(swings[0].index, 1);
        assert_eq!(swings[1].index, 5);
    }

    #[test]
    fn test_short_series() {
        assert!(SwingExtractor.extract(&points(&[1.0, 2.0])).is_empty());
        assert!(SwingExtractor.extract(&[]).is_empty());
    }

    #[test]
    fn test_monotonic_has_no_swings() {
        assert!(SwingExtractor.extract(&points(&[1.0, 2.0, 3.0, 4.0])).is_empty());
    }
}
