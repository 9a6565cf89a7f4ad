//! XABCD harmonic pattern matching against the template catalog
//!
//! Five consecutive swings X, A, B, C, D yield four normalized legs:
//!
//! - `AB = |B - A| / |X - A|`
//! - `BC = |C - B| / |B - A|`
//! - `CD = |D - C| / |C - B|`
//! - `AD = |D - A| / |X - A|`
//!
//! Raw confidence per template is `1 - mean(|actual - expected| / expected)`, clamped to [0, 1].

use super::helpers::{clamp_unit, relative_deviation};
use super::templates::{PatternTemplate, TemplateCatalog};
use crate::{Direction, Pattern, PricePoint, SwingPoint};

/// Swings per harmonic structure
pub const HARMONIC_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct HarmonicMatcher {
    catalog: TemplateCatalog,
}

impl HarmonicMatcher {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Leg ratios of an XABCD window. None when a reference leg has zero length.
    pub fn leg_ratios(window: &[SwingPoint]) -> Option<[f64; 4]> {
        let [x, a, b, c, d] = window else {
            return None;
        };
        let xa = (x.price - a.price).abs();
        let ab = (b.price - a.price).abs();
        let bc = (c.price - b.price).abs();
        if xa == 0.0 || ab == 0.0 || bc == 0.0 {
            return None;
        }
        let legs = [ab / xa, bc / ab, (d.price - c.price).abs() / bc, (d.price - a.price).abs() / xa];
        legs.iter().all(|l| l.is_finite()).then_some(legs)
    }

    /// `1 - mean(relative deviation)`, clamped to [0, 1]
    pub fn score(legs: &[f64; 4], template: &PatternTemplate) -> f64 {
        let total: f64 = legs
            .iter()
            .zip(template.ratios.iter())
            .map(|(actual, expected)| relative_deviation(*actual, *expected))
            .sum();
        clamp_unit(1.0 - total / legs.len() as f64)
    }

    /// Highest-confidence template with confidence > 0. Earlier templates win ties.
    pub fn best_match(&self, legs: &[f64; 4]) -> Option<(&'static PatternTemplate, f64)> {
        self.catalog
            .iter()
            .map(|t| (t, Self::score(legs, t)))
            .filter(|(_, confidence)| *confidence > 0.0)
            .fold(None, |best, (t, confidence)| match best {
                Some((_, c)) if c >= confidence => best,
                _ => Some((t, confidence)),
            })
    }

    /// Scan every run of five consecutive swings
    pub fn detect(&self, swings: &[SwingPoint], prices: &[PricePoint]) -> Vec<Pattern> {
        swings
            .windows(HARMONIC_POINTS)
            .filter_map(|window| {
                let legs = Self::leg_ratios(window)?;
                let (template, confidence) = self.best_match(&legs)?;
                let (x, a, d) = (window[0], window[1], window[4]);

                let mut pattern = Pattern::from_span(
                    template.kind,
                    x.index,
                    d.index,
                    confidence,
                    window.iter().map(|s| s.index).collect(),
                    legs.to_vec(),
                    prices,
                );
                pattern.metadata.direction = harmonic_direction(a.price, d.price);
                pattern.metadata.template = Some(template.name.to_string());
                pattern.metadata.legs_within_tolerance = Some(template.legs_within_tolerance(&legs));
                Some(pattern)
            })
            .collect()
    }
}

/// D below A completes a bullish structure, D above A a bearish one
#[inline]
pub fn harmonic_direction(a: f64, d: f64) -> Direction {
    if d < a {
        Direction::Bullish
    } else if d > a {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PatternKind, SwingKind};

    fn swing(price: f64, index: usize, kind: SwingKind) -> SwingPoint {
        SwingPoint { price, index, kind }
    }

    /// X=100, A=200 then legs 0.618 / 0.382 / 1.272 against alternating directions
    fn near_gartley() -> Vec<SwingPoint> {
        let b = 200.0 - 61.8;
        let c = b + 0.382 * 61.8;
        let d = c - 1.272 * (0.382 * 61.8);
        vec![
            swing(100.0, 0, SwingKind::Low),
            swing(200.0, 4, SwingKind::High),
            swing(b, 8, SwingKind::Low),
            swing(c, 12, SwingKind::High),
            swing(d, 16, SwingKind::Low),
        ]
    }

    #[test]
    fn test_exact_gartley_legs_score_one() {
        let gartley = TemplateCatalog::standard().for_kind(PatternKind::HarmonicGartley).unwrap();
        assert_eq!(HarmonicMatcher::score(&gartley.ratios, gartley), 1.0);

        let matcher = HarmonicMatcher::default();
        let (best, confidence) = matcher.best_match(&gartley.ratios).unwrap();
        assert_eq!(best.kind, PatternKind::HarmonicGartley);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn test_every_template_matches_itself() {
        let matcher = HarmonicMatcher::default();
        for t in TemplateCatalog::standard().iter() {
            let (best, confidence) = matcher.best_match(&t.ratios).unwrap();
            assert_eq!(best.kind, t.kind);
            assert_eq!(confidence, 1.0);
        }
    }

    #[test]
    fn test_leg_ratios() {
        let legs = HarmonicMatcher::leg_ratios(&near_gartley()).unwrap();
        assert!((legs[0] - 0.618).abs() < 1e-9);
        assert!((legs[1] - 0.382).abs() < 1e-9);
        assert!((legs[2] - 1.272).abs() < 1e-9);
        // AD follows from the other three legs
        assert!((legs[3] - 0.682_212_672).abs() < 1e-9);
    }

    #[test]
    fn test_detect_near_gartley() {
        let swings = near_gartley();
        let prices: Vec<PricePoint> =
            (0..17).map(|i| PricePoint::new(150.0, 0.0, i as i64)).collect();
        let patterns = HarmonicMatcher::default().detect(&swings, &prices);

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.kind, PatternKind::HarmonicGartley);
        assert_eq!(p.points, vec![0, 4, 8, 12, 16]);
        assert_eq!((p.start_index, p.end_index), (0, 16));
        assert!(p.confidence > 0.95 && p.confidence < 1.0);
        assert_eq!(p.metadata.direction, Direction::Bullish);
        assert_eq!(p.metadata.template.as_deref(), Some("Gartley"));
        assert_eq!(p.metadata.legs_within_tolerance, Some(3));
    }

    #[test]
    fn test_degenerate_leg_is_skipped() {
        let mut swings = near_gartley();
        swings[1].price = swings[0].price;
        assert!(HarmonicMatcher::leg_ratios(&swings).is_none());
        assert!(HarmonicMatcher::leg_ratios(&swings[..4]).is_none());
    }

    #[test]
    fn test_far_legs_are_dropped() {
        // Every deviation far above 1 -> confidence clamps to 0 -> no candidate
        let matcher = HarmonicMatcher::default();
        assert!(matcher.best_match(&[9.0, 9.0, 9.0, 9.0]).is_none());
    }

    #[test]
    fn test_direction() {
        assert_eq!(harmonic_direction(10.0, 5.0), Direction::Bullish);
        assert_eq!(harmonic_direction(10.0, 15.0), Direction::Bearish);
        assert_eq!(harmonic_direction(10.0, 10.0), Direction::Neutral);
    }
}
