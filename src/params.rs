//! Detector threshold descriptors
//!
//! Each tunable threshold of a detector is published as a [`ParamMeta`]: its kind, the
//! value the detector ships with and a sweep range. A detector can then be rebuilt from a
//! flat `name -> value` map, which is how calibration runs and config files feed it.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use klinescan::params::ParameterizedDetector;
//! use klinescan::prelude::*;
//!
//! for param in TweezerDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("level_tolerance", 0.003);
//! let tight = TweezerDetector::with_params(&params).unwrap();
//! assert_eq!(tight.level_tolerance.get(), 0.003);
//! ```

use std::collections::HashMap;

use crate::{PatternError, PatternId, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// How a threshold value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0, read into a [`Ratio`]
  Ratio,
  /// Bar count, read into a [`Period`]
  Period,
  /// Positive multiplier that may exceed 1.0, e.g. shadow length over body
  Factor,
}

/// One tunable detector threshold
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Key used in parameter maps, equal to the detector field name
  pub name: &'static str,
  pub param_type: ParamType,
  /// Value used by the detector's `Default`
  pub default: f64,
  /// Sweep range as (low, high, step), both ends inclusive
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  const fn new(
    name: &'static str,
    param_type: ParamType,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type, default, range, description }
  }

  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self::new(name, ParamType::Ratio, default, range, description)
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self::new(name, ParamType::Factor, default, range, description)
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self::new(name, ParamType::Period, default, range, description)
  }

  /// Sweep values from `low` to `high`.
  ///
  /// Values are computed from the step index so float drift cannot add or drop the
  /// upper end. A non-positive step yields just `low`.
  pub fn generate_grid(&self) -> Vec<f64> {
    let (low, high, step) = self.range;
    if step <= 0.0 || high < low {
      return vec![low];
    }
    let steps = ((high - low) / step + 1e-9).floor() as usize;
    (0..=steps).map(|k| low + k as f64 * step).collect()
  }

  /// Check `value` against the sweep range and the rules of its kind
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Factor if value <= 0.0 => {
        Err(PatternError::InvalidValue("Factor must be positive"))
      },
      ParamType::Period if value < 1.0 || value.fract() != 0.0 => {
        Err(PatternError::InvalidValue("Period must be a positive integer"))
      },
      _ => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Detector constructible from a parameter map.
///
/// Keys missing from the map fall back to the detector's defaults; a value that fails
/// its type check is an error, never silently clamped.
pub trait ParameterizedDetector: Sized {
  fn param_meta() -> &'static [ParamMeta];

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Every pattern id this detector may report
  fn emitted_ids() -> &'static [PatternId];

  /// The shipped value of every parameter, keyed by name
  fn default_params() -> HashMap<&'static str, f64> {
    Self::param_meta().iter().map(|m| (m.name, m.default)).collect()
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// `params[key]` as a [`Ratio`], or `default` when absent
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  Ratio::new(params.get(key).copied().unwrap_or(default))
}

/// `params[key]` as a positive finite multiplier, or `default` when absent
pub fn get_factor(params: &HashMap<&str, f64>, key: &'static str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() || value <= 0.0 {
    return Err(PatternError::OutOfRange { field: key, value, min: f64::MIN_POSITIVE, max: f64::MAX });
  }
  Ok(value)
}

/// `params[key]` as a [`Period`], or `default` when absent
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(PatternError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detectors::{
    DojiDetector, EngulfingDetector, HeadAndShouldersDetector, TweezerDetector,
  };

  #[test]
  fn test_constructors_set_kind() {
    let body = ParamMeta::ratio("body_max_ratio", 0.1, (0.05, 0.15, 0.05), "Doji body");
    let wick = ParamMeta::factor("shadow_factor", 2.0, (1.5, 3.0, 0.5), "Wick over body");
    let span = ParamMeta::period("min_span", 10.0, (5.0, 20.0, 5.0), "Span");

    assert_eq!(body.param_type, ParamType::Ratio);
    assert_eq!(wick.param_type, ParamType::Factor);
    assert_eq!(span.param_type, ParamType::Period);
    assert_eq!(span.default, 10.0);
  }

  #[test]
  fn test_grid_includes_both_ends() {
    let meta = ParamMeta::ratio("near_tolerance", 0.005, (0.0025, 0.01, 0.0025), "Near");
    let grid = meta.generate_grid();

    assert_eq!(grid.len(), 4);
    assert!((grid[0] - 0.0025).abs() < 1e-12);
    assert!((grid[3] - 0.01).abs() < 1e-12);
  }

  #[test]
  fn test_grid_with_bad_step() {
    let meta = ParamMeta::period("lookback", 5.0, (3.0, 8.0, 0.0), "Lookback");
    assert_eq!(meta.generate_grid(), vec![3.0]);
  }

  #[test]
  fn test_validate_by_kind() {
    let ratio = ParamMeta::ratio("level_tolerance", 0.02, (0.01, 0.04, 0.005), "Level");
    assert!(ratio.validate(0.01).is_ok());
    assert!(ratio.validate(0.04).is_ok());
    assert!(ratio.validate(0.05).is_err());

    let period = ParamMeta::period("max_span", 60.0, (40.0, 80.0, 10.0), "Span");
    assert!(period.validate(50.0).is_ok());
    assert!(period.validate(50.5).is_err());
    assert!(period.validate(90.0).is_err());

    let factor = ParamMeta::factor("shadow_factor", 2.0, (1.5, 3.0, 0.5), "Wick");
    assert!(factor.validate(2.5).is_ok());
    assert!(factor.validate(3.5).is_err());
  }

  #[test]
  fn test_value_helpers() {
    let mut params = HashMap::new();
    params.insert("level_tolerance", 0.01);
    params.insert("min_span", 12.0);
    params.insert("shadow_factor", 2.5);
    params.insert("bad_span", 2.5);
    params.insert("bad_factor", -1.0);

    assert_eq!(get_ratio(&params, "level_tolerance", 0.02).unwrap().get(), 0.01);
    assert_eq!(get_ratio(&params, "missing", 0.02).unwrap().get(), 0.02);
    assert_eq!(get_period(&params, "min_span", 10).unwrap().get(), 12);
    assert_eq!(get_period(&params, "missing", 10).unwrap().get(), 10);
    assert!(get_period(&params, "bad_span", 10).is_err());
    assert_eq!(get_factor(&params, "shadow_factor", 2.0).unwrap(), 2.5);
    assert!(get_factor(&params, "bad_factor", 2.0).is_err());
  }

  #[test]
  fn test_defaults_are_valid_and_rebuild_default() {
    let tweezer = TweezerDetector::with_params(&TweezerDetector::default_params()).unwrap();
    assert_eq!(tweezer.level_tolerance, TweezerDetector::default().level_tolerance);
    assert!(TweezerDetector::emitted_ids().contains(&crate::ids::TWEEZER_TOP));

    for meta in EngulfingDetector::param_meta() {
      assert!(meta.validate(meta.default).is_ok(), "{}", meta.name);
    }
    for meta in HeadAndShouldersDetector::param_meta() {
      assert!(meta.validate(meta.default).is_ok(), "{}", meta.name);
    }
  }

  #[test]
  fn test_with_params_rejects_bad_ratio() {
    let mut params = HashMap::new();
    params.insert("body_max_ratio", 1.5);
    assert!(DojiDetector::with_params(&params).is_err());
  }
}
