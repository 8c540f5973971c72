//! Parameter metadata for detectors and sessions
//!
//! This module provides metadata about tunable parameters, enabling:
//! - Range validation of loaded configuration
//! - Parameter documentation
//! - Construction of detectors from loose key/value maps
//!
//! # Example
//!
//! ```rust
//! use yamsd::prelude::*;
//!
//! // Get parameter metadata for a detector
//! let params = EqualLevelDetector::param_meta();
//! for param in params {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{DetectError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer: candles, seconds or entries)
  Period,
}

/// Metadata for a single parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "tolerance")
  pub name: &'static str,
  /// Parameter type (Ratio or Period)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Accepted range: (min, max)
  pub range: (f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(name: &'static str, default: f64, range: (f64, f64), description: &'static str) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(name: &'static str, default: f64, range: (f64, f64), description: &'static str) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(DetectError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(DetectError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

/// Validate `(name, value)` pairs against a metadata table.
///
/// Names missing from the table are a configuration error.
pub fn validate_params(metas: &[ParamMeta], values: &[(&str, f64)]) -> Result<()> {
  for (name, value) in values {
    let meta = metas
      .iter()
      .find(|m| m.name == *name)
      .ok_or_else(|| DetectError::InvalidConfig(format!("unknown parameter '{name}'")))?;
    meta.validate(*value)?;
  }
  Ok(())
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors that support parameterization
///
/// Implementing this trait enables:
/// - Discovery of available parameters
/// - Creation of detectors with custom parameter values
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the detector ID string
  fn detector_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(DetectError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("tolerance", 0.0008, (0.0, 0.05), "Equality tolerance");

    assert_eq!(meta.name, "tolerance");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, 0.0008);
  }

  #[test]
  fn test_param_meta_period() {
    let meta = ParamMeta::period("retest_window", 20.0, (3.0, 500.0), "Retest window");

    assert_eq!(meta.param_type, ParamType::Period);
    assert!(meta.validate(20.0).is_ok());
    assert!(meta.validate(3.0).is_ok());
    assert!(meta.validate(2.0).is_err());
    assert!(meta.validate(501.0).is_err());
    assert!(meta.validate(20.5).is_err());
  }

  #[test]
  fn test_validate_ratio() {
    let meta = ParamMeta::ratio("tolerance", 0.0008, (0.0, 0.05), "Test");

    assert!(meta.validate(0.0).is_ok());
    assert!(meta.validate(0.05).is_ok());
    assert!(meta.validate(0.06).is_err());
    assert!(meta.validate(f64::NAN).is_err());
  }

  #[test]
  fn test_validate_params_rejects_unknown_name() {
    let metas = [ParamMeta::period("limit", 10.0, (1.0, 100.0), "Test")];

    assert!(validate_params(&metas, &[("limit", 5.0)]).is_ok());
    assert!(matches!(
      validate_params(&metas, &[("limt", 5.0)]),
      Err(DetectError::InvalidConfig(_))
    ));
  }

  #[test]
  fn test_get_ratio_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 0.001);

    assert!((get_ratio(&params, "key1", 0.5).unwrap().get() - 0.001).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "key2", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
  }

  #[test]
  fn test_get_period_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 20.0);
    params.insert("bad", -3.0);

    assert_eq!(get_period(&params, "key1", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "key2", 14).unwrap().get(), 14);
    assert!(get_period(&params, "bad", 14).is_err());
  }
}
