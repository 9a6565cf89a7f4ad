//! Sliding-window structural detection over consecutive ratios
//!
//! Patterns: GoldenSpiral (repeated φ growth) and FibonacciExtension (a φ step followed by a φ²
//! step). Each window of `window_size` ratios covers `window_size + 1` prices. Window scans are
//! independent, so [`StructuralDetector::scan_window`] can run on any partition of the start
//! indices; [`StructuralDetector::assemble`] then merges overlapping hits in index order.

use super::helpers::{
    mean, tolerance_proximity, within_tolerance, EXTENSION_PAIR, GOLDEN_RATIO, MIN_SPIRAL_HITS,
};
use crate::{GeometricRatio, Pattern, PatternKind, PricePoint};

/// Scan outcome of a single window: confidence per kind, if any
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowHits {
    pub spiral: Option<f64>,
    pub extension: Option<f64>,
}

/// Index span plus confidence, before metadata is attached
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: usize,
    end: usize,
    confidence: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct StructuralDetector {
    pub golden_ratio: f64,
    pub tolerance: f64,
    pub window_size: usize,
}

impl Default for StructuralDetector {
    fn default() -> Self {
        Self {
            golden_ratio: GOLDEN_RATIO,
            tolerance: crate::DEFAULT_TOLERANCE,
            window_size: crate::DEFAULT_WINDOW_SIZE,
        }
    }
}

impl StructuralDetector {
    pub fn new(tolerance: f64, window_size: usize) -> Self {
        Self { tolerance, window_size, ..Self::default() }
    }

    /// Number of window start positions for `ratio_count` ratios
    pub fn window_count(&self, ratio_count: usize) -> usize {
        if ratio_count < MIN_SPIRAL_HITS || self.window_size == 0 || ratio_count < self.window_size {
            return 0;
        }
        ratio_count - self.window_size + 1
    }

    /// Sequential scan + merge
    pub fn detect(&self, prices: &[PricePoint], ratios: &[GeometricRatio]) -> Vec<Pattern> {
        let hits: Vec<WindowHits> =
            (0..self.window_count(ratios.len())).map(|s| self.scan_window(ratios, s)).collect();
        self.assemble(&hits, prices, ratios)
    }

    /// Evaluate the window starting at ratio index `start`.
    /// Reads only `ratios[start..start + window_size]`.
    pub fn scan_window(&self, ratios: &[GeometricRatio], start: usize) -> WindowHits {
        let window = &ratios[start..start + self.window_size];

        let near_phi = window
            .iter()
            .filter(|r| within_tolerance(r.ratio, self.golden_ratio, self.tolerance))
            .count();
        let spiral =
            (near_phi >= MIN_SPIRAL_HITS).then(|| near_phi as f64 / self.window_size as f64);

        WindowHits { spiral, extension: self.best_extension_pair(window) }
    }

    /// Turn per-window hits (indexed by start) into merged candidates.
    /// Spirals come first, then extensions, each in index order.
    pub fn assemble(
        &self,
        hits: &[WindowHits],
        prices: &[PricePoint],
        ratios: &[GeometricRatio],
    ) -> Vec<Pattern> {
        let spans_of = |pick: fn(&WindowHits) -> Option<f64>| -> Vec<Span> {
            hits.iter()
                .enumerate()
                .filter_map(|(start, h)| {
                    pick(h).map(|confidence| Span { start, end: start + self.window_size, confidence })
                })
                .collect()
        };

        let mut patterns = Vec::new();
        for (kind, spans) in [
            (PatternKind::GoldenSpiral, spans_of(|h: &WindowHits| h.spiral)),
            (PatternKind::FibonacciExtension, spans_of(|h: &WindowHits| h.extension)),
        ] {
            for span in merge_overlapping(spans) {
                let observed = self.observed_ratios(kind, ratios, span.start, span.end);
                patterns.push(Pattern::from_span(
                    kind,
                    span.start,
                    span.end,
                    span.confidence,
                    (span.start..=span.end).collect(),
                    observed,
                    prices,
                ));
            }
        }
        patterns
    }

    /// Best (1.618, 2.618) pair in the window, scored by mean proximity.
    /// Earlier pairs win ties.
    fn best_extension_pair(&self, window: &[GeometricRatio]) -> Option<f64> {
        window
            .windows(2)
            .filter(|pair| self.is_extension_pair(pair))
            .map(|pair| self.extension_score(pair))
            .fold(None, |best: Option<f64>, score| match best {
                Some(b) if b >= score => Some(b),
                _ => Some(score),
            })
    }

    #[inline]
    fn is_extension_pair(&self, pair: &[GeometricRatio]) -> bool {
        within_tolerance(pair[0].ratio, EXTENSION_PAIR[0], self.tolerance)
            && within_tolerance(pair[1].ratio, EXTENSION_PAIR[1], self.tolerance)
    }

    fn extension_score(&self, pair: &[GeometricRatio]) -> f64 {
        let scores = [
            tolerance_proximity(pair[0].ratio, EXTENSION_PAIR[0], self.tolerance),
            tolerance_proximity(pair[1].ratio, EXTENSION_PAIR[1], self.tolerance),
        ];
        mean(&scores).unwrap_or(0.0)
    }

    /// Ratios recorded in metadata for a (possibly merged) span of prices `[start, end]`
    fn observed_ratios(
        &self,
        kind: PatternKind,
        ratios: &[GeometricRatio],
        start: usize,
        end: usize,
    ) -> Vec<f64> {
        let span = &ratios[start..end];
        match kind {
            PatternKind::FibonacciExtension => span
                .windows(2)
                .filter(|pair| self.is_extension_pair(pair))
                .flat_map(|pair| [pair[0].ratio, pair[1].ratio])
                .collect(),
            _ => span.iter().map(|r| r.ratio).collect(),
        }
    }
}

/// Merge index-ordered spans that share at least one price index.
/// The merged confidence is the average of the running span and the newcomer.
fn merge_overlapping(spans: Vec<Span>) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(current) if span.start <= current.end => {
                current.end = current.end.max(span.end);
                current.confidence = (current.confidence + span.confidence) / 2.0;
            }
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::RatioCalculator;

    fn series(prices: &[f64]) -> (Vec<PricePoint>, Vec<GeometricRatio>) {
        let points: Vec<PricePoint> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| PricePoint::new(p, 0.0, i as i64 * 60_000))
            .collect();
        let ratios = RatioCalculator::default().compute(&points).unwrap();
        (points, ratios)
    }

    #[test]
    fn test_golden_spiral_window() {
        let (prices, ratios) = series(&[100.0, 161.8, 261.8, 423.6]);
        let patterns = StructuralDetector::default().detect(&prices, &ratios);

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.kind, PatternKind::GoldenSpiral);
        assert_eq!((p.start_index, p.end_index), (0, 3));
        assert_eq!(p.points, vec![0, 1, 2, 3]);
        assert!((p.confidence - 1.0).abs() < 1e-12);
        assert_eq!(p.metadata.ratios.len(), 3);
        assert_eq!(p.metadata.direction, crate::Direction::Bullish);
    }

    #[test]
    fn test_too_few_ratios() {
        let (prices, ratios) = series(&[100.0, 161.8, 261.8]);
        assert!(StructuralDetector::default().detect(&prices, &ratios).is_empty());
    }

    #[test]
    fn test_partial_window_confidence() {
        // 3 of 4 ratios near φ
        let (prices, ratios) = series(&[100.0, 161.8, 261.8, 423.6, 430.0]);
        let detector = StructuralDetector::new(0.03, 4);
        let patterns = detector.detect(&prices, &ratios);
        assert_eq!(patterns.len(), 1);
        assert!((patterns[0].confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_fibonacci_extension() {
        // ×1.618 then ×2.618
        let (prices, ratios) = series(&[100.0, 100.0, 161.8, 423.59]);
        let patterns = StructuralDetector::default().detect(&prices, &ratios);
        let ext: Vec<_> =
            patterns.iter().filter(|p| p.kind == PatternKind::FibonacciExtension).collect();
        assert_eq!(ext.len(), 1);
        assert_eq!(ext[0].metadata.ratios.len(), 2);
        assert!(ext[0].confidence > 0.9);
    }

    #[test]
    fn test_overlapping_windows_merge() {
        let prices: Vec<f64> = (0..7).map(|i| 100.0 * GOLDEN_RATIO.powi(i)).collect();
        let (points, ratios) = series(&prices);
        let patterns = StructuralDetector::default().detect(&points, &ratios);

        // 4 windows, all overlapping, merge into one spanning every price
        assert_eq!(patterns.len(), 1);
        assert_eq!((patterns[0].start_index, patterns[0].end_index), (0, 6));
        assert_eq!(patterns[0].metadata.ratios.len(), 6);
        assert!((patterns[0].confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_averages_pairwise() {
        let spans = vec![
            Span { start: 0, end: 3, confidence: 1.0 },
            Span { start: 2, end: 5, confidence: 0.5 },
            Span { start: 9, end: 12, confidence: 0.8 },
        ];
        let merged = merge_overlapping(spans);
        assert_eq!(merged.len(), 2);
        assert_eq!((merged[0].start, merged[0].end), (0, 5));
        assert!((merged[0].confidence - 0.75).abs() < 1e-12);
        assert_eq!(merged[1].start, 9);
    }

    #[test]
    fn test_duplicate_timestamps_are_tolerated() {
        let points = vec![
            PricePoint::new(100.0, 0.0, 5),
            PricePoint::new(161.8, 0.0, 5),
            PricePoint::new(261.8, 0.0, 5),
            PricePoint::new(423.6, 0.0, 5),
        ];
        let ratios = RatioCalculator::default().compute(&points).unwrap();
        let patterns = StructuralDetector::default().detect(&points, &ratios);
        assert_eq!(patterns[0].metadata.time_range, (5, 5));
    }
}
