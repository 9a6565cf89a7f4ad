//! Five-metric pattern validation
//!
//! Every candidate is scored on ratio accuracy, price structure, time symmetry, volume
//! confirmation and trend consistency. A metric whose input is missing (no volume, too little
//! history, too few points) gets [`NEUTRAL_SCORE`] and is listed in
//! [`ValidationMetrics::gaps`]; a gapped metric never fails the acceptance gate on its own.

use serde::{Deserialize, Serialize};

use crate::detectors::helpers::{
    clamp_unit, has_volume, mean, nearest_level, relative_accuracy, tolerance_proximity,
    trailing_sma, EXTENSION_LEVELS, EXTENSION_PAIR, GOLDEN_RATIO, LONG_MA_PERIOD, NEUTRAL_SCORE,
    RETRACEMENT_LEVELS, SHORT_MA_PERIOD, SPIRAL_GROWTH,
};
use crate::detectors::TemplateCatalog;
use crate::{Pattern, PatternKind, PricePoint};

// ============================================================
// THRESHOLDS
// ============================================================

pub const RATIO_ACCURACY_THRESHOLD: f64 = 0.85;
pub const PRICE_STRUCTURE_THRESHOLD: f64 = 0.75;
pub const TIME_SYMMETRY_THRESHOLD: f64 = 0.70;
pub const VOLUME_CONFIRMATION_THRESHOLD: f64 = 0.65;
pub const TREND_CONSISTENCY_THRESHOLD: f64 = 0.80;

/// Half-width of the band around a canonical retracement level for price structure
pub const RETRACEMENT_BAND: f64 = 0.05;

// ============================================================
// METRICS
// ============================================================

/// One of the five validation metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    RatioAccuracy,
    PriceStructure,
    TimeSymmetry,
    VolumeConfirmation,
    TrendConsistency,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::RatioAccuracy,
        Metric::PriceStructure,
        Metric::TimeSymmetry,
        Metric::VolumeConfirmation,
        Metric::TrendConsistency,
    ];

    /// Minimum score for acceptance
    pub const fn threshold(self) -> f64 {
        match self {
            Metric::RatioAccuracy => RATIO_ACCURACY_THRESHOLD,
            Metric::PriceStructure => PRICE_STRUCTURE_THRESHOLD,
            Metric::TimeSymmetry => TIME_SYMMETRY_THRESHOLD,
            Metric::VolumeConfirmation => VOLUME_CONFIRMATION_THRESHOLD,
            Metric::TrendConsistency => TREND_CONSISTENCY_THRESHOLD,
        }
    }
}

/// Scores in [0, 1] that justify accepting (or rejecting) a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub ratio_accuracy: f64,
    pub price_structure: f64,
    pub time_symmetry: f64,
    pub volume_confirmation: f64,
    pub trend_consistency: f64,
    pub is_valid: bool,
    /// Metrics scored with the neutral substitute because their input was missing
    pub gaps: Vec<Metric>,
}

impl ValidationMetrics {
    #[inline]
    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::RatioAccuracy => self.ratio_accuracy,
            Metric::PriceStructure => self.price_structure,
            Metric::TimeSymmetry => self.time_symmetry,
            Metric::VolumeConfirmation => self.volume_confirmation,
            Metric::TrendConsistency => self.trend_consistency,
        }
    }

    #[inline]
    pub fn is_gap(&self, metric: Metric) -> bool {
        self.gaps.contains(&metric)
    }

    /// Gapped metrics pass; measured ones must reach their threshold
    #[inline]
    pub fn passes(&self, metric: Metric) -> bool {
        self.is_gap(metric) || self.score(metric) >= metric.threshold()
    }

    /// Mean of measured scores, or the neutral score when nothing was measured
    pub fn measured_mean(&self) -> f64 {
        let measured: Vec<f64> = Metric::ALL
            .iter()
            .filter(|m| !self.is_gap(**m))
            .map(|m| self.score(*m))
            .collect();
        mean(&measured).unwrap_or(NEUTRAL_SCORE)
    }

    fn from_measures(measures: [(Metric, Option<f64>); 5]) -> Self {
        let mut gaps = Vec::new();
        let mut scores = [0.0; 5];
        for (slot, (metric, measure)) in scores.iter_mut().zip(measures) {
            *slot = match measure {
                Some(score) => clamp_unit(score),
                None => {
                    gaps.push(metric);
                    NEUTRAL_SCORE
                }
            };
        }

        let mut metrics = Self {
            ratio_accuracy: scores[0],
            price_structure: scores[1],
            time_symmetry: scores[2],
            volume_confirmation: scores[3],
            trend_consistency: scores[4],
            is_valid: false,
            gaps,
        };
        metrics.is_valid = Metric::ALL.iter().all(|m| metrics.passes(*m));
        metrics
    }
}

/// Final pattern confidence: raw detector confidence scaled by the measured metric mean
#[inline]
pub fn final_confidence(raw: f64, metrics: &ValidationMetrics) -> f64 {
    clamp_unit(raw * metrics.measured_mean())
}

// ============================================================
// VALIDATOR
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternValidator {
    catalog: TemplateCatalog,
}

impl PatternValidator {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    /// Compute all five metrics for `pattern` against the series it came from
    pub fn validate(&self, pattern: &Pattern, prices: &[PricePoint]) -> ValidationMetrics {
        ValidationMetrics::from_measures([
            (Metric::RatioAccuracy, Some(self.ratio_accuracy(pattern))),
            (Metric::PriceStructure, self.price_structure(pattern, prices)),
            (Metric::TimeSymmetry, time_symmetry(pattern, prices)),
            (Metric::VolumeConfirmation, volume_confirmation(pattern, prices)),
            (Metric::TrendConsistency, trend_consistency(pattern, prices)),
        ])
    }

    /// Attach metrics and recompute confidence
    pub fn apply(&self, mut pattern: Pattern, prices: &[PricePoint]) -> Pattern {
        let metrics = self.validate(&pattern, prices);
        pattern.confidence = final_confidence(pattern.confidence, &metrics);
        pattern.metadata.validation = Some(metrics);
        pattern
    }

    /// Mean of `max(0, 1 - |actual - expected| / expected)` over the kind's expected ratios
    pub fn ratio_accuracy(&self, pattern: &Pattern) -> f64 {
        let observed = &pattern.metadata.ratios;
        let scores: Vec<f64> = match pattern.kind {
            PatternKind::GoldenSpiral => {
                observed.iter().map(|r| relative_accuracy(*r, GOLDEN_RATIO)).collect()
            }
            PatternKind::FibonacciExtension => observed
                .iter()
                .enumerate()
                .map(|(i, r)| relative_accuracy(*r, EXTENSION_PAIR[i % 2]))
                .collect(),
            PatternKind::FibonacciRetracement => observed
                .iter()
                .filter_map(|r| nearest_level(*r, &RETRACEMENT_LEVELS).map(|(l, _)| relative_accuracy(*r, l)))
                .collect(),
            PatternKind::HarmonicGartley
            | PatternKind::HarmonicButterfly
            | PatternKind::HarmonicBat
            | PatternKind::HarmonicCrab => match self.catalog.for_kind(pattern.kind) {
                Some(template) => observed
                    .iter()
                    .zip(template.ratios.iter())
                    .map(|(a, e)| relative_accuracy(*a, *e))
                    .collect(),
                None => Vec::new(),
            },
            PatternKind::NoPattern => Vec::new(),
        };
        mean(&scores).unwrap_or(0.0)
    }

    /// Kind-specific shape check. None when the pattern lacks the points to judge it.
    pub fn price_structure(&self, pattern: &Pattern, prices: &[PricePoint]) -> Option<f64> {
        let pts = point_prices(pattern, prices)?;
        match pattern.kind {
            PatternKind::GoldenSpiral => spiral_structure(&pts),
            PatternKind::FibonacciExtension => extension_structure(&pts),
            PatternKind::FibonacciRetracement => retracement_structure(&pts),
            PatternKind::HarmonicGartley
            | PatternKind::HarmonicButterfly
            | PatternKind::HarmonicBat
            | PatternKind::HarmonicCrab => {
                let template = self.catalog.for_kind(pattern.kind)?;
                harmonic_structure(&pts, template.extends_beyond_origin())
            }
            PatternKind::NoPattern => Some(0.0),
        }
    }
}

fn point_prices(pattern: &Pattern, prices: &[PricePoint]) -> Option<Vec<f64>> {
    pattern.points.iter().map(|&i| prices.get(i).map(|p| p.price)).collect()
}

/// A golden spiral turns by a constant angle per step: Δθ = ln(p[k+1] / p[k]) / b
fn spiral_structure(pts: &[f64]) -> Option<f64> {
    if pts.len() < 3 {
        return None;
    }
    if pts.iter().any(|p| *p <= 0.0) {
        return Some(0.0);
    }
    let increments: Vec<f64> = pts.windows(2).map(|w| (w[1] / w[0]).ln() / SPIRAL_GROWTH).collect();
    let avg = mean(&increments)?;
    if avg.abs() < f64::EPSILON {
        return Some(0.0);
    }
    let spread = increments.iter().map(|d| (d - avg).abs()).sum::<f64>() / increments.len() as f64;
    Some(clamp_unit(1.0 - spread / avg.abs()))
}

/// Leg-to-leg ratios close to canonical extension levels
fn extension_structure(pts: &[f64]) -> Option<f64> {
    let legs: Vec<f64> = pts.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let scores: Vec<f64> = legs
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .filter_map(|w| {
            let ratio = w[1] / w[0];
            nearest_level(ratio, &EXTENSION_LEVELS).map(|(level, _)| relative_accuracy(ratio, level))
        })
        .collect();
    mean(&scores)
}

/// C must pull back inside the A-B leg, close to a canonical level
fn retracement_structure(pts: &[f64]) -> Option<f64> {
    let [a, b, c] = pts else {
        return None;
    };
    let leg = (b - a).abs();
    if leg == 0.0 {
        return Some(0.0);
    }
    let inside = (a.min(*b) < *c) && (*c < a.max(*b));
    if !inside {
        return Some(0.0);
    }
    let level = (c - b).abs() / leg;
    nearest_level(level, &RETRACEMENT_LEVELS)
        .map(|(target, _)| tolerance_proximity(level, target, RETRACEMENT_BAND))
}

/// Six shape checks on X, A, B, C, D
fn harmonic_structure(pts: &[f64], beyond_origin: bool) -> Option<f64> {
    let [x, a, b, c, d] = pts else {
        return None;
    };
    let (xa, ab, bc, cd) = (a - x, b - a, c - b, d - c);
    let checks = [
        xa * ab < 0.0,
        ab * bc < 0.0,
        bc * cd < 0.0,
        ab.abs() < xa.abs(),
        bc.abs() < ab.abs(),
        if beyond_origin {
            // D completes past X
            (d - a).abs() > xa.abs()
        } else {
            // D stays between X and A
            (d - a).abs() < xa.abs() && (d - a) * xa < 0.0
        },
    ];
    let passed = checks.iter().filter(|ok| **ok).count();
    Some(passed as f64 / checks.len() as f64)
}

/// Intervals between consecutive points; mirror pairs compared via min(a/b, b/a)
fn time_symmetry(pattern: &Pattern, prices: &[PricePoint]) -> Option<f64> {
    let stamps: Vec<i64> =
        pattern.points.iter().map(|&i| prices.get(i).map(|p| p.timestamp)).collect::<Option<_>>()?;
    let mut intervals: Vec<f64> = stamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    if intervals.iter().any(|d| *d <= 0.0) {
        // Duplicate timestamps: fall back to bar distance
        intervals = pattern.points.windows(2).map(|w| w[1].abs_diff(w[0]) as f64).collect();
    }

    let n = intervals.len();
    let scores: Vec<f64> = (0..n / 2)
        .map(|i| {
            let (a, b) = (intervals[i], intervals[n - 1 - i]);
            if a <= 0.0 || b <= 0.0 {
                0.0
            } else {
                (a / b).min(b / a)
            }
        })
        .collect();
    mean(&scores)
}

/// Volume-change ratio agreeing with price-change ratio at each step
fn volume_confirmation(pattern: &Pattern, prices: &[PricePoint]) -> Option<f64> {
    let pts: Vec<&PricePoint> =
        pattern.points.iter().map(|&i| prices.get(i)).collect::<Option<_>>()?;
    let mut scores = Vec::with_capacity(pts.len().saturating_sub(1));
    for w in pts.windows(2) {
        let (prev, next) = (w[0], w[1]);
        if !has_volume(prev.volume) || !has_volume(next.volume) || prev.price <= 0.0 {
            return None;
        }
        let volume_change = next.volume / prev.volume;
        let price_change = next.price / prev.price;
        let (lo, hi) = (volume_change.min(price_change), volume_change.max(price_change));
        scores.push(if hi > 0.0 { lo / hi } else { 0.0 });
    }
    mean(&scores)
}

/// Share of points on the expected side of both the 20- and 50-bar averages
fn trend_consistency(pattern: &Pattern, prices: &[PricePoint]) -> Option<f64> {
    let start = prices.get(pattern.start_index)?.price;
    let end = prices.get(pattern.end_index)?.price;
    let rising = end >= start;

    let mut evaluated = 0usize;
    let mut consistent = 0usize;
    for &i in &pattern.points {
        let (Some(short), Some(long)) =
            (trailing_sma(prices, i, SHORT_MA_PERIOD), trailing_sma(prices, i, LONG_MA_PERIOD))
        else {
            continue;
        };
        let price = prices[i].price;
        evaluated += 1;
        let aligned = if rising {
            price > short && price > long
        } else {
            price < short && price < long
        };
        if aligned {
            consistent += 1;
        }
    }
    (evaluated > 0).then(|| consistent as f64 / evaluated as f64)
}

// ============================================================
// TESTS
// ============================================================
