//! Compute backends for the ratio + structural stage
//!
//! [`SequentialBackend`] is the reference. [`ParallelBackend`] runs the same per-index work on
//! rayon (the global pool, or a dedicated one when sized explicitly) and shares the merge step,
//! so both produce the same candidate set.

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;

use crate::detectors::ratios::first_zero_divisor;
use crate::detectors::{RatioCalculator, StructuralDetector, WindowHits};
use crate::{AnalysisError, GeometricRatio, Pattern, PricePoint, Result};

/// Smallest unit of work handed to a rayon worker
const MIN_CHUNK: usize = 256;

/// Detector parameters that affect backend output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub tolerance: f64,
    pub window_size: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            tolerance: crate::DEFAULT_TOLERANCE,
            window_size: crate::DEFAULT_WINDOW_SIZE,
        }
    }
}

impl DetectionParams {
    fn calculator(&self) -> RatioCalculator {
        RatioCalculator::new(self.tolerance)
    }

    fn detector(&self) -> StructuralDetector {
        StructuralDetector::new(self.tolerance, self.window_size)
    }
}

/// Ratios plus raw structural candidates
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutput {
    pub ratios: Vec<GeometricRatio>,
    pub candidates: Vec<Pattern>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ComputeBackendError {
    #[error("Compute backend unavailable: {0}")]
    Unavailable(String),

    #[error("Compute backend panicked: {0}")]
    Panicked(String),
}

pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_accelerated(&self) -> bool;

    fn compute(&self, prices: &[PricePoint], params: &DetectionParams) -> Result<BackendOutput>;
}

// ============================================================
// SEQUENTIAL
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialBackend;

impl ComputeBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn is_accelerated(&self) -> bool {
        false
    }

    fn compute(&self, prices: &[PricePoint], params: &DetectionParams) -> Result<BackendOutput> {
        let ratios = params.calculator().compute(prices)?;
        let candidates = params.detector().detect(prices, &ratios);
        Ok(BackendOutput { ratios, candidates })
    }
}

// ============================================================
// PARALLEL
// ============================================================

/// Runs ratio computation and window scans on rayon.
///
/// A dedicated pool is torn down when the backend is dropped. Without one, work runs on the
/// global pool, so building a backend spawns no threads.
#[derive(Debug)]
pub struct ParallelBackend {
    pool: Option<rayon::ThreadPool>,
}

impl ParallelBackend {
    /// `threads == 0` uses rayon's global pool. Any other count builds a dedicated pool.
    pub fn new(threads: usize) -> std::result::Result<Self, ComputeBackendError> {
        if threads == 0 {
            return Ok(Self::global());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("phipattern-{i}"))
            .build()
            .map_err(|e| ComputeBackendError::Unavailable(e.to_string()))?;
        Ok(Self { pool: Some(pool) })
    }

    /// Backend on rayon's global pool
    pub const fn global() -> Self {
        Self { pool: None }
    }

    pub fn has_dedicated_pool(&self) -> bool {
        self.pool.is_some()
    }

    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `work` on the pool, turning a panic into [`ComputeBackendError::Panicked`]
    fn guarded<T, F>(&self, work: F) -> std::result::Result<T, ComputeBackendError>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        panic::catch_unwind(AssertUnwindSafe(|| match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }))
        .map_err(|payload| ComputeBackendError::Panicked(panic_message(payload.as_ref())))
    }
}

impl ComputeBackend for ParallelBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn is_accelerated(&self) -> bool {
        true
    }

    fn compute(&self, prices: &[PricePoint], params: &DetectionParams) -> Result<BackendOutput> {
        if let Some(index) = first_zero_divisor(prices) {
            return Err(AnalysisError::DivisionByZero { index });
        }
        let calculator = params.calculator();
        let detector = params.detector();

        let (ratios, hits) = self.guarded(|| {
            let ratios: Vec<GeometricRatio> = prices
                .par_windows(2)
                .with_min_len(MIN_CHUNK)
                .map(|pair| calculator.ratio_at(&pair[0], &pair[1]))
                .collect();
            let hits: Vec<WindowHits> = (0..detector.window_count(ratios.len()))
                .into_par_iter()
                .with_min_len(MIN_CHUNK)
                .map(|start| detector.scan_window(&ratios, start))
                .collect();
            (ratios, hits)
        })?;

        let candidates = detector.assemble(&hits, prices, &ratios);
        Ok(BackendOutput { ratios, candidates })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================
// TESTS
// ============================================================
