//! Parameter metadata for analysis tuning
//!
//! Describes the tunable analysis parameters so callers can:
//! - run grid searches over tolerance / window size
//! - document parameter ranges
//! - build configs from loosely-typed key/value maps
//!
//! # Example
//!
//! ```rust
//! use phipattern::params::{generate_grid, Parameterized};
//! use phipattern::AnalysisConfig;
//!
//! for param in AnalysisConfig::param_meta() {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let configs: Vec<AnalysisConfig> = generate_grid(AnalysisConfig::param_meta())
//!   .unwrap()
//!   .iter()
//!   .map(|point| AnalysisConfig::with_params(point).unwrap())
//!   .collect();
//! assert!(!configs.is_empty());
//! ```

use std::collections::HashMap;

use crate::{AnalysisConfig, AnalysisError, Result, Tolerance, WindowSize};

/// Upper bound on points in a single parameter grid or a combined grid
pub const MAX_GRID_POINTS: usize = 100_000;

// ============================================================
// PARAMETER TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fractional match tolerance
  Tolerance,
  /// Window length in ratios (integer)
  WindowSize,
}

/// Metadata for a single tunable parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn tolerance(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Tolerance, default, range, description }
  }

  pub const fn window(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::WindowSize, default, range, description }
  }

  /// Every value from min to max inclusive. Steps are counted, not accumulated.
  ///
  /// Fails when the range would produce more than [`MAX_GRID_POINTS`] values.
  pub fn generate_grid(&self) -> Result<Vec<f64>> {
    let (min, max, step) = self.range;
    if step <= 0.0 || max < min {
      return Ok(vec![min]);
    }
    let steps = ((max - min) / step + 1e-9).floor();
    if !steps.is_finite() || steps >= MAX_GRID_POINTS as f64 {
      return Err(AnalysisError::InvalidConfig(format!(
        "{}: step {step} yields more than {MAX_GRID_POINTS} grid points",
        self.name
      )));
    }
    Ok((0..=steps as usize).map(|k| min + k as f64 * step).collect())
  }

  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Tolerance => Tolerance::new(value).map(|_| ()),
      ParamType::WindowSize => {
        if value.fract() != 0.0 {
          return Err(AnalysisError::InvalidValue("window_size must be an integer"));
        }
        WindowSize::new(value as usize).map(|_| ())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Types that can be built from a parameter map
pub trait Parameterized: Sized {
  fn param_meta() -> &'static [ParamMeta];

  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

static ANALYSIS_PARAMS: [ParamMeta; 2] = [
  ParamMeta::tolerance(
    "tolerance",
    crate::DEFAULT_TOLERANCE,
    (0.01, 0.10, 0.01),
    "Absolute band around a target ratio that still counts as a match",
  ),
  ParamMeta::window(
    "window_size",
    crate::DEFAULT_WINDOW_SIZE as f64,
    (3.0, 8.0, 1.0),
    "Consecutive ratios per structural window",
  ),
];

impl Parameterized for AnalysisConfig {
  fn param_meta() -> &'static [ParamMeta] {
    &ANALYSIS_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for key in params.keys() {
      if !ANALYSIS_PARAMS.iter().any(|m| m.name == *key) {
        return Err(AnalysisError::InvalidConfig(format!("unknown parameter: {key}")));
      }
    }
    Ok(
      AnalysisConfig::default()
        .tolerance(get_tolerance(params, "tolerance", crate::DEFAULT_TOLERANCE)?)
        .window_size(get_window_size(params, "window_size", crate::DEFAULT_WINDOW_SIZE)?),
    )
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

pub fn get_tolerance(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Tolerance> {
  let value = params.get(key).copied().unwrap_or(default);
  Tolerance::new(value)
}

pub fn get_window_size(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<WindowSize> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(AnalysisError::InvalidValue("window_size must be a non-negative integer"));
  }
  WindowSize::new(value as usize)
}

/// Cartesian product of every parameter's grid, bounded by [`MAX_GRID_POINTS`]
pub fn generate_grid(metas: &[ParamMeta]) -> Result<Vec<HashMap<&'static str, f64>>> {
  let grids = metas.iter().map(ParamMeta::generate_grid).collect::<Result<Vec<_>>>()?;
  let total = grids.iter().try_fold(1usize, |acc, values| {
    acc.checked_mul(values.len()).filter(|n| *n <= MAX_GRID_POINTS)
  });
  if total.is_none() {
    return Err(AnalysisError::InvalidConfig(format!(
      "combined grid exceeds {MAX_GRID_POINTS} points"
    )));
  }

  Ok(metas.iter().zip(&grids).fold(vec![HashMap::new()], |points, (meta, values)| {
    points
      .iter()
      .flat_map(|point| {
        values.iter().map(move |v| {
          let mut next = point.clone();
          next.insert(meta.name, *v);
          next
        })
      })
      .collect()
  }))
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta() {
    let metas = AnalysisConfig::param_meta();
    assert_eq!(metas.len(), 2);
    assert_eq!(metas[0].name, "tolerance");
    assert_eq!(metas[0].param_type, ParamType::Tolerance);
    assert_eq!(metas[0].default, 0.03);
    assert_eq!(metas[1].param_type, ParamType::WindowSize);
    assert_eq!(metas[1].default, 3.0);
  }

  #[test]
  fn test_meta_grid() {
    let meta = ParamMeta::tolerance("t", 0.03, (0.01, 0.05, 0.02), "t");
    let grid = meta.generate_grid().unwrap();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.01).abs() < 1e-12);
    assert!((grid[1] - 0.03).abs() < 1e-12);
    assert!((grid[2] - 0.05).abs() < 1e-12);
  }

  #[test]
  fn test_full_grid_is_cartesian() {
    let grid = generate_grid(AnalysisConfig::param_meta()).unwrap();
    // 10 tolerances x 6 window sizes
    assert_eq!(grid.len(), 60);
    for point in &grid {
      assert!(AnalysisConfig::with_params(point).is_ok());
    }
  }

  #[test]
  fn test_oversized_grid_is_rejected() {
    let fine = ParamMeta::tolerance("t", 0.03, (0.01, 0.10, 1e-12), "t");
    assert!(matches!(fine.generate_grid(), Err(AnalysisError::InvalidConfig(_))));

    let max = MAX_GRID_POINTS as f64 - 1.0;
    let edge = ParamMeta::window("w", 3.0, (0.0, max, 1.0), "w");
    assert_eq!(edge.generate_grid().unwrap().len(), MAX_GRID_POINTS);

    // Each grid fits on its own, the product does not
    let wide = ParamMeta::window("w", 3.0, (0.0, 999.0, 1.0), "w");
    let other = ParamMeta::tolerance("t", 0.03, (0.0, 0.999, 0.001), "t");
    assert!(matches!(generate_grid(&[wide, other]), Err(AnalysisError::InvalidConfig(_))));
  }

  #[test]
  fn test_validate() {
    let metas = AnalysisConfig::param_meta();
    assert!(metas[0].validate(0.05).is_ok());
    assert!(metas[0].validate(0.5).is_err());
    assert!(metas[1].validate(4.0).is_ok());
    assert!(metas[1].validate(4.5).is_err());
    assert!(metas[1].validate(2.0).is_err());
  }

  #[test]
  fn test_with_params() {
    let mut params = HashMap::new();
    params.insert("tolerance", 0.05);
    let config = AnalysisConfig::with_params(&params).unwrap();
    assert_eq!(config.tolerance.get(), 0.05);
    assert_eq!(config.window_size.get(), 3);

    params.insert("window_size", 5.0);
    assert_eq!(AnalysisConfig::with_params(&params).unwrap().window_size.get(), 5);

    params.insert("bogus", 1.0);
    assert!(matches!(AnalysisConfig::with_params(&params), Err(AnalysisError::InvalidConfig(_))));
  }

  #[test]
  fn test_value_helpers() {
    let mut params = HashMap::new();
    params.insert("w", 7.0);
    assert_eq!(get_window_size(&params, "w", 3).unwrap().get(), 7);
    assert_eq!(get_window_size(&params, "missing", 3).unwrap().get(), 3);
    assert!(get_tolerance(&params, "missing", 0.0).is_err());
  }
}
