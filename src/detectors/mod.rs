//! Pattern detectors
//!
//! This module turns a price series into raw pattern candidates.
//!
//! # Pipeline
//!
//! - **Ratios**: consecutive price ratios with significance weights
//! - **Structural**: sliding-window GoldenSpiral / FibonacciExtension scan over the ratios
//! - **Swings**: alternating local extrema
//! - **Harmonic**: XABCD swing runs matched against the template catalog (Gartley, Butterfly,
//!   Bat, Crab)
//! - **Retracement**: swing triples near canonical Fibonacci retracement levels

pub mod helpers;

pub mod harmonic;
pub mod ratios;
pub mod retracement;
pub mod structural;
pub mod swing;
pub mod templates;

// Re-export detectors for convenience
pub use harmonic::{harmonic_direction, HarmonicMatcher};
pub use helpers::GOLDEN_RATIO;
pub use ratios::RatioCalculator;
pub use retracement::RetracementScanner;
pub use structural::{StructuralDetector, WindowHits};
pub use swing::SwingExtractor;
pub use templates::{PatternTemplate, TemplateCatalog, STANDARD_TEMPLATES};
