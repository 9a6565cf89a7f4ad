//! Analysis orchestration
//!
//! One call walks a fixed state sequence:
//!
//! ```text
//! Idle -> Fingerprinting -> CacheCheck -> CacheHit -> Done
//!                                      -> CacheMiss -> Detecting -> Validating -> Caching -> Done
//! ```
//!
//! Fingerprinting and the cache states are skipped when no cache is attached or the call opts
//! out. Each transition is traced at `TRACE` level.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::backend::{ComputeBackend, DetectionParams, ParallelBackend, SequentialBackend};
use crate::cache::{fingerprint, ResultCache};
use crate::detectors::{HarmonicMatcher, RetracementScanner, SwingExtractor, TemplateCatalog};
use crate::validation::PatternValidator;
use crate::{
    validate_prices, AnalysisConfig, AnalysisError, AnalysisResult, GeometricRatio, Pattern,
    PricePoint, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Idle,
    Fingerprinting,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Detecting,
    Validating,
    Caching,
    Done,
}

#[inline]
fn advance(state: &mut AnalysisState, next: AnalysisState) {
    trace!(from = ?*state, to = ?next, "analysis state");
    *state = next;
}

/// Unvalidated detector output
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub ratios: Vec<GeometricRatio>,
    /// Structural candidates first, then harmonic, then retracement
    pub candidates: Vec<Pattern>,
    /// Produced by the accelerated backend
    pub accelerated: bool,
}

// ============================================================
// ANALYZER
// ============================================================

/// Runs detection, validation and caching. Cheap to share across threads.
pub struct Analyzer {
    sequential: SequentialBackend,
    accelerated: Option<Box<dyn ComputeBackend>>,
    cache: Option<Arc<ResultCache>>,
    swings: SwingExtractor,
    harmonic: HarmonicMatcher,
    validator: PatternValidator,
}

impl Analyzer {
    /// Name of the backend used when `prefer_parallel` is set
    pub fn backend_name(&self) -> &'static str {
        self.accelerated.as_deref().map_or(self.sequential.name(), |b| b.name())
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    /// Full pipeline: validated patterns, cached when a cache is attached
    pub fn analyze(&self, prices: &[PricePoint], config: &AnalysisConfig) -> Result<AnalysisResult> {
        let started = Instant::now();
        let mut state = AnalysisState::Idle;

        config.validate()?;
        validate_prices(prices, config.require_ordered_timestamps)?;
        if prices.len() < 2 {
            advance(&mut state, AnalysisState::Done);
            return Ok(finish(Vec::new(), false, false, started));
        }

        let params = config.detection_params();
        let cache = self.cache.as_deref().filter(|_| config.use_cache);
        let key = cache.map(|_| {
            advance(&mut state, AnalysisState::Fingerprinting);
            fingerprint(prices, &params, config.fingerprint_window)
        });

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            advance(&mut state, AnalysisState::CacheCheck);
            match cache.get(key) {
                Ok(Some(entry)) => {
                    advance(&mut state, AnalysisState::CacheHit);
                    debug!(key, patterns = entry.patterns.len(), "cache hit");
                    advance(&mut state, AnalysisState::Done);
                    return Ok(finish(entry.patterns.as_ref().clone(), entry.accelerated, true, started));
                },
                Ok(None) => debug!(key, "cache miss"),
                Err(e) => warn!(error = %e, "cache lookup failed, treating as miss"),
            }
            advance(&mut state, AnalysisState::CacheMiss);
        }

        advance(&mut state, AnalysisState::Detecting);
        let detection = self.detect_with(prices, &params, config.prefer_parallel)?;

        advance(&mut state, AnalysisState::Validating);
        let raw = detection.candidates.len();
        let patterns = self.validate_candidates(detection.candidates, prices);
        debug!(raw, accepted = patterns.len(), "validation complete");

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            advance(&mut state, AnalysisState::Caching);
            if let Err(e) = cache.set(key, Arc::new(patterns.clone()), detection.accelerated) {
                warn!(error = %e, "cache store failed");
            }
        }

        advance(&mut state, AnalysisState::Done);
        Ok(finish(patterns, detection.accelerated, false, started))
    }

    /// Raw candidate set, before validation. Never touches the cache.
    pub fn detect(&self, prices: &[PricePoint], config: &AnalysisConfig) -> Result<Detection> {
        config.validate()?;
        validate_prices(prices, config.require_ordered_timestamps)?;
        self.detect_with(prices, &config.detection_params(), config.prefer_parallel)
    }

    fn detect_with(
        &self,
        prices: &[PricePoint],
        params: &DetectionParams,
        prefer_parallel: bool,
    ) -> Result<Detection> {
        let (output, accelerated) = match self.accelerated.as_deref().filter(|_| prefer_parallel) {
            Some(backend) => match backend.compute(prices, params) {
                Ok(output) => (output, backend.is_accelerated()),
                Err(AnalysisError::Backend(e)) => {
                    warn!(backend = backend.name(), error = %e, "falling back to sequential backend");
                    (self.sequential.compute(prices, params)?, false)
                },
                Err(e) => return Err(e),
            },
            None => (self.sequential.compute(prices, params)?, false),
        };

        let swings = self.swings.extract(prices);
        let mut candidates = output.candidates;
        candidates.extend(self.harmonic.detect(&swings, prices));
        candidates.extend(RetracementScanner::new(params.tolerance).detect(&swings, prices));
        debug!(candidates = candidates.len(), swings = swings.len(), accelerated, "detection complete");

        Ok(Detection { ratios: output.ratios, candidates, accelerated })
    }

    /// Validate each candidate independently; keep the accepted ones in order
    fn validate_candidates(&self, candidates: Vec<Pattern>, prices: &[PricePoint]) -> Vec<Pattern> {
        candidates
            .into_iter()
            .map(|candidate| self.validator.apply(candidate, prices))
            .filter(Pattern::is_valid)
            .collect()
    }
}

fn finish(patterns: Vec<Pattern>, accelerated: bool, cache_hit: bool, started: Instant) -> AnalysisResult {
    let confidence = if patterns.is_empty() {
        0.0
    } else {
        patterns.iter().map(|p| p.confidence).sum::<f64>() / patterns.len() as f64
    };
    AnalysisResult {
        patterns,
        confidence,
        elapsed_ms: started.elapsed().as_secs_f64() * 1_000.0,
        accelerated,
        cache_hit,
        timestamp: Utc::now().timestamp_millis(),
    }
}

// ============================================================
// BUILDER
// ============================================================

pub struct AnalyzerBuilder {
    cache: Option<Arc<ResultCache>>,
    threads: usize,
    parallel: bool,
    backend: Option<Box<dyn ComputeBackend>>,
    catalog: TemplateCatalog,
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            threads: 0,
            parallel: true,
            backend: None,
            catalog: TemplateCatalog::standard(),
        }
    }

    /// Share a result cache with other analyzers
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Worker threads for a dedicated parallel pool (0 = rayon's global pool)
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Build the rayon backend. Disabled analyzers always run sequentially.
    pub fn parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    /// Replace the rayon backend with a custom one
    pub fn backend<B: ComputeBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    pub fn catalog(mut self, catalog: TemplateCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Build the analyzer. An unavailable rayon pool degrades to sequential-only.
    pub fn build(self) -> Result<Analyzer> {
        if self.catalog.is_empty() {
            return Err(AnalysisError::InvalidConfig("template catalog is empty".to_string()));
        }

        let accelerated = match self.backend {
            Some(backend) => Some(backend),
            None if self.parallel => match ParallelBackend::new(self.threads) {
                Ok(backend) => Some(Box::new(backend) as Box<dyn ComputeBackend>),
                Err(e) => {
                    warn!(error = %e, "parallel backend unavailable, running sequentially");
                    None
                },
            },
            None => None,
        };

        Ok(Analyzer {
            sequential: SequentialBackend,
            accelerated,
            cache: self.cache,
            swings: SwingExtractor::new(),
            harmonic: HarmonicMatcher::new(self.catalog),
            validator: PatternValidator::new(self.catalog),
        })
    }
}

// ============================================================
// BATCH ANALYSIS
// ============================================================

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisOutcome {
    pub symbol: String,
    pub result: AnalysisResult,
}

/// Error from analyzing a single instrument
#[derive(Debug)]
pub struct AnalysisFailure {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Analyze many instruments on the global rayon pool
pub fn analyze_parallel<'a, I>(
    analyzer: &Analyzer,
    instruments: I,
    config: &AnalysisConfig,
) -> (Vec<AnalysisOutcome>, Vec<AnalysisFailure>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a [PricePoint])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, prices)| {
            analyzer
                .analyze(prices, config)
                .map(|result| AnalysisOutcome { symbol: symbol.to_string(), result })
                .map_err(|error| AnalysisFailure { symbol: symbol.to_string(), error })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
