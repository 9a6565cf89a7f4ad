//! # phipattern - Golden-ratio and harmonic pattern recognition
//!
//! Detects geometric structures in a price series (golden spirals, Fibonacci retracements and
//! extensions, Gartley / Butterfly / Bat / Crab harmonics), validates every candidate on five
//! metrics and scores how strongly the data exhibits it.
//!
//! ## Quick Start
//!
//! ```rust
//! use phipattern::prelude::*;
//!
//! let prices: Vec<PricePoint> = [100.0, 161.8, 261.8, 423.6]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &p)| PricePoint::new(p, 0.0, i as i64 * 60_000))
//!     .collect();
//!
//! let result = phipattern::analyze(&prices, &AnalysisConfig::default()).unwrap();
//! assert_eq!(result.patterns[0].kind, PatternKind::GoldenSpiral);
//! assert!(result.confidence > 0.8);
//! ```
//!
//! Long-running callers build an [`Analyzer`] once and share a [`ResultCache`] between
//! analyzers:
//!
//! ```rust
//! use std::sync::Arc;
//! use phipattern::prelude::*;
//!
//! let cache = Arc::new(ResultCache::new(256, LIVE_TTL));
//! let analyzer = AnalyzerBuilder::new()
//!     .cache(Arc::clone(&cache))
//!     .threads(2)
//!     .build()
//!     .unwrap();
//!
//! let prices: Vec<PricePoint> =
//!     (0..64).map(|i| PricePoint::new(100.0 + (i as f64).sin(), 1_000.0, i)).collect();
//! let first = analyzer.analyze(&prices, &AnalysisConfig::default()).unwrap();
//! let second = analyzer.analyze(&prices, &AnalysisConfig::default()).unwrap();
//! assert!(!first.cache_hit);
//! assert!(second.cache_hit);
//! assert_eq!(first.patterns, second.patterns);
//! ```

pub mod backend;
pub mod cache;
pub mod detectors;
pub mod engine;
pub mod params;
pub mod validation;

pub use backend::{ComputeBackend, ComputeBackendError, DetectionParams};
pub use cache::{CacheError, ResultCache, COLD_TTL, LIVE_TTL};
pub use engine::{analyze_parallel, AnalysisFailure, AnalysisOutcome, Analyzer, AnalyzerBuilder};
pub use validation::{Metric, PatternValidator, ValidationMetrics};

pub mod prelude {
    pub use crate::{
        analyze,
        // Batch
        analyze_parallel,
        // Backends
        backend::{BackendOutput, ComputeBackend, DetectionParams, ParallelBackend, SequentialBackend},
        // Cache
        cache::{fingerprint, CacheEntry, ResultCache, COLD_TTL, LIVE_TTL},
        // Detectors
        detectors::*,
        // Engine
        engine::AnalysisState,
        // Parameters
        params::{generate_grid, get_tolerance, get_window_size, ParamMeta, ParamType, Parameterized},
        // Validation
        validation::{Metric, PatternValidator, ValidationMetrics},
        AnalysisConfig,
        // Errors
        AnalysisError,
        AnalysisFailure,
        AnalysisOutcome,
        AnalysisResult,
        Analyzer,
        AnalyzerBuilder,
        ComputeBackendError,
        CacheError,
        // Types
        Direction,
        ErrorKind,
        GeometricRatio,
        Pattern,
        PatternKind,
        PatternMetadata,
        PricePoint,
        Result,
        SwingKind,
        SwingPoint,
        Tolerance,
        WindowSize,
    };
}

/// Default ratio match tolerance
pub const DEFAULT_TOLERANCE: f64 = 0.03;

/// Default sliding window length, in ratios
pub const DEFAULT_WINDOW_SIZE: usize = 3;

/// Default number of trailing points hashed into a cache fingerprint
pub const DEFAULT_FINGERPRINT_WINDOW: usize = 100;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur during analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid price at index {index}: {value}")]
    InvalidPrice { index: usize, value: f64 },

    #[error("Division by zero: price at index {index} is 0")]
    DivisionByZero { index: usize },

    #[error("Timestamp at index {index} goes backwards: {current} < {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error(transparent)]
    Backend(#[from] ComputeBackendError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed price data; fatal to the call
    Input,
    /// Rejected configuration or validated value
    Config,
    /// Parallel backend failed; recovered by sequential fallback
    ComputeBackend,
    /// Missing metric input. Never returned as an error, see [`ValidationMetrics::gaps`].
    ValidationDataGap,
    /// Cache failure; treated as a miss
    Cache,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::InvalidPrice { .. }
            | AnalysisError::DivisionByZero { .. }
            | AnalysisError::NonMonotonicTimestamp { .. } => ErrorKind::Input,
            AnalysisError::InvalidValue(_)
            | AnalysisError::OutOfRange { .. }
            | AnalysisError::InvalidConfig(_) => ErrorKind::Config,
            AnalysisError::Backend(_) => ErrorKind::ComputeBackend,
            AnalysisError::Cache(_) => ErrorKind::Cache,
        }
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Ratio match tolerance in (0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tolerance(f64);

impl Tolerance {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 1.0;

    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue("Tolerance cannot be NaN or infinite"));
        }
        if value <= Self::MIN || value > Self::MAX {
            return Err(AnalysisError::OutOfRange {
                field: "tolerance",
                value,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::new_const(DEFAULT_TOLERANCE)
    }
}

impl serde::Serialize for Tolerance {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Tolerance {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Tolerance::new(value).map_err(serde::de::Error::custom)
    }
}

/// Sliding window length in ratios (3..=64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WindowSize(usize);

impl WindowSize {
    pub const MIN: usize = 3;
    pub const MAX: usize = 64;

    pub fn new(value: usize) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "window_size",
                value: value as f64,
                min: Self::MIN as f64,
                max: Self::MAX as f64,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new_const(DEFAULT_WINDOW_SIZE)
    }
}

impl serde::Serialize for WindowSize {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for WindowSize {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        WindowSize::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PRICE DATA
// ============================================================

/// One observation of the series. Volume <= 0 (or non-finite) means "not available".
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub volume: f64,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl PricePoint {
    #[inline]
    pub const fn new(price: f64, volume: f64, timestamp: i64) -> Self {
        Self { price, volume, timestamp }
    }

    #[inline]
    pub fn has_volume(&self) -> bool {
        detectors::helpers::has_volume(self.volume)
    }
}

/// Ratio between consecutive prices, stamped with the later point's timestamp
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeometricRatio {
    pub ratio: f64,
    /// 0.0..=1.0
    pub significance: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

/// Local extremum of the series
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingPoint {
    pub price: f64,
    pub index: usize,
    pub kind: SwingKind,
}

/// Reject prices that are non-finite or negative and, when requested, timestamps that go
/// backwards. Zero prices pass here and are reported by the ratio step.
pub fn validate_prices(prices: &[PricePoint], require_ordered_timestamps: bool) -> Result<()> {
    for (index, p) in prices.iter().enumerate() {
        if !p.price.is_finite() || p.price < 0.0 {
            return Err(AnalysisError::InvalidPrice { index, value: p.price });
        }
    }
    if require_ordered_timestamps {
        for (i, pair) in prices.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(AnalysisError::NonMonotonicTimestamp {
                    index: i + 1,
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }
    }
    Ok(())
}

// ============================================================
// PATTERNS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PatternKind {
    GoldenSpiral,
    FibonacciRetracement,
    FibonacciExtension,
    HarmonicGartley,
    HarmonicButterfly,
    HarmonicBat,
    HarmonicCrab,
    NoPattern,
}

impl PatternKind {
    pub const ALL: [PatternKind; 8] = [
        PatternKind::GoldenSpiral,
        PatternKind::FibonacciRetracement,
        PatternKind::FibonacciExtension,
        PatternKind::HarmonicGartley,
        PatternKind::HarmonicButterfly,
        PatternKind::HarmonicBat,
        PatternKind::HarmonicCrab,
        PatternKind::NoPattern,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            PatternKind::GoldenSpiral => "GoldenSpiral",
            PatternKind::FibonacciRetracement => "FibonacciRetracement",
            PatternKind::FibonacciExtension => "FibonacciExtension",
            PatternKind::HarmonicGartley => "HarmonicGartley",
            PatternKind::HarmonicButterfly => "HarmonicButterfly",
            PatternKind::HarmonicBat => "HarmonicBat",
            PatternKind::HarmonicCrab => "HarmonicCrab",
            PatternKind::NoPattern => "NoPattern",
        }
    }

    #[inline]
    pub fn is_harmonic(self) -> bool {
        matches!(
            self,
            PatternKind::HarmonicGartley
                | PatternKind::HarmonicButterfly
                | PatternKind::HarmonicBat
                | PatternKind::HarmonicCrab
        )
    }

    /// Detected from the ratio sequence rather than from swings
    #[inline]
    pub fn is_structural(self) -> bool {
        matches!(self, PatternKind::GoldenSpiral | PatternKind::FibonacciExtension)
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PatternMetadata {
    /// Observed ratios (harmonics: AB, BC, CD, AD legs)
    pub ratios: Vec<f64>,
    /// (min, max) price over the span
    pub price_range: (f64, f64),
    /// (start, end) timestamps
    pub time_range: (i64, i64),
    pub direction: Direction,
    /// Harmonic template name
    pub template: Option<String>,
    /// Harmonic legs within the template tolerance
    pub legs_within_tolerance: Option<usize>,
    /// None on raw candidates
    pub validation: Option<ValidationMetrics>,
}

/// A detected structure. Indices refer to the analyzed series.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub start_index: usize,
    pub end_index: usize,
    /// 0.0..=1.0
    pub confidence: f64,
    /// Indices of the points forming the pattern
    pub points: Vec<usize>,
    pub metadata: PatternMetadata,
}

impl Pattern {
    /// Build a raw candidate over `prices[start..=end]`.
    ///
    /// Price and time ranges come from the span; direction compares the end price to the start
    /// price.
    ///
    /// # Panics
    ///
    /// Panics if `start > end` or `end` is out of bounds for `prices`.
    pub fn from_span(
        kind: PatternKind,
        start: usize,
        end: usize,
        confidence: f64,
        points: Vec<usize>,
        ratios: Vec<f64>,
        prices: &[PricePoint],
    ) -> Self {
        let price_range = detectors::helpers::price_range(prices, start, end);
        let (first, last) = (prices[start], prices[end]);
        let direction = match last.price.partial_cmp(&first.price) {
            Some(std::cmp::Ordering::Greater) => Direction::Bullish,
            Some(std::cmp::Ordering::Less) => Direction::Bearish,
            _ => Direction::Neutral,
        };
        Self {
            kind,
            start_index: start,
            end_index: end,
            confidence,
            points,
            metadata: PatternMetadata {
                ratios,
                price_range,
                time_range: (first.timestamp, last.timestamp),
                direction,
                template: None,
                legs_within_tolerance: None,
                validation: None,
            },
        }
    }

    #[inline]
    pub fn validation(&self) -> Option<&ValidationMetrics> {
        self.metadata.validation.as_ref()
    }

    /// True once validated and accepted
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.validation().is_some_and(|m| m.is_valid)
    }
}

// ============================================================
// CONFIG & RESULT
// ============================================================

/// Per-call analysis settings
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub tolerance: Tolerance,
    pub window_size: WindowSize,
    pub use_cache: bool,
    pub prefer_parallel: bool,
    /// Reject series whose timestamps go backwards
    pub require_ordered_timestamps: bool,
    /// Trailing points hashed into the cache fingerprint
    pub fingerprint_window: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            window_size: WindowSize::default(),
            use_cache: true,
            prefer_parallel: true,
            require_ordered_timestamps: false,
            fingerprint_window: DEFAULT_FINGERPRINT_WINDOW,
        }
    }
}

impl AnalysisConfig {
    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn window_size(mut self, window_size: WindowSize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn use_cache(mut self, enable: bool) -> Self {
        self.use_cache = enable;
        self
    }

    pub fn prefer_parallel(mut self, enable: bool) -> Self {
        self.prefer_parallel = enable;
        self
    }

    pub fn require_ordered_timestamps(mut self, enable: bool) -> Self {
        self.require_ordered_timestamps = enable;
        self
    }

    pub fn fingerprint_window(mut self, points: usize) -> Self {
        self.fingerprint_window = points;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.fingerprint_window == 0 {
            return Err(AnalysisError::InvalidConfig(
                "fingerprint_window must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters that change detector output (and therefore the cache key)
    #[inline]
    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            tolerance: self.tolerance.get(),
            window_size: self.window_size.get(),
        }
    }
}

/// Outcome of one analysis call
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisResult {
    /// Validated patterns only
    pub patterns: Vec<Pattern>,
    /// Mean pattern confidence, 0.0 when nothing was found
    pub confidence: f64,
    pub elapsed_ms: f64,
    /// Detection ran on the parallel backend
    pub accelerated: bool,
    pub cache_hit: bool,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl AnalysisResult {
    /// Patterns of one kind, in result order
    pub fn of_kind(&self, kind: PatternKind) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter().filter(move |p| p.kind == kind)
    }
}

/// Analyze with a fresh analyzer and no shared cache. Parallel work runs on rayon's global pool.
pub fn analyze(prices: &[PricePoint], config: &AnalysisConfig) -> Result<AnalysisResult> {
    AnalyzerBuilder::new().parallel(config.prefer_parallel).build()?.analyze(prices, config)
}

// ============================================================
// TESTS
// ============================================================
