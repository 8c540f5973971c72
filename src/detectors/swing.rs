//! Swing point detection over a 3-candle neighborhood
//!
//! Swings are always recomputed over the whole window: a candle appended later
//! can confirm or disqualify an earlier swing, so incremental patching is never
//! attempted.

use std::collections::HashMap;

use crate::{
  params::{get_period, validate_params, ParamMeta, ParameterizedDetector},
  Candle, DetectorId, OHLCVExt, Period, Result, OHLCV,
};

/// Which extreme a swing marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SwingKind {
  High,
  Low,
}

/// A local extreme, pointing back at its originating candle.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SwingPoint {
  pub kind: SwingKind,
  /// Position in the window at detection time
  pub index: usize,
  /// `high` for swing highs, `low` for swing lows
  pub price: f64,
  pub candle: Candle,
}

impl SwingPoint {
  #[inline]
  pub fn time(&self) -> i64 {
    self.candle.time
  }

  #[inline]
  pub fn body_high(&self) -> f64 {
    self.candle.body_high()
  }

  #[inline]
  pub fn body_low(&self) -> f64 {
    self.candle.body_low()
  }
}

/// Parallel swing-high / swing-low sequences, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwingSet {
  pub highs: Vec<SwingPoint>,
  pub lows: Vec<SwingPoint>,
}

impl SwingSet {
  /// Copy holding only the most recent `n` swings of each kind.
  pub fn capped(&self, n: usize) -> SwingSet {
    SwingSet {
      highs: self.highs[self.highs.len().saturating_sub(n)..].to_vec(),
      lows: self.lows[self.lows.len().saturating_sub(n)..].to_vec(),
    }
  }

  pub fn of_kind(&self, kind: SwingKind) -> &[SwingPoint] {
    match kind {
      SwingKind::High => &self.highs,
      SwingKind::Low => &self.lows,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.highs.is_empty() && self.lows.is_empty()
  }

  pub fn clear(&mut self) {
    self.highs.clear();
    self.lows.clear();
  }
}

/// Scan every interior candle and collect non-strict local extrema.
///
/// Ties count: `high[i] >= high[i-1] && high[i] >= high[i+1]` is a swing high,
/// the `<=` mirror on lows is a swing low. A flat candle can be both.
pub fn find_swings<T: OHLCV>(candles: &[T]) -> SwingSet {
  let mut set = SwingSet::default();
  if candles.len() < 3 {
    return set;
  }

  for i in 1..candles.len() - 1 {
    let (prev, curr, next) = (&candles[i - 1], &candles[i], &candles[i + 1]);

    if curr.high() >= prev.high() && curr.high() >= next.high() {
      set.highs.push(SwingPoint { kind: SwingKind::High, index: i, price: curr.high(), candle: Candle::from_ohlcv(curr) });
    }
    if curr.low() <= prev.low() && curr.low() <= next.low() {
      set.lows.push(SwingPoint { kind: SwingKind::Low, index: i, price: curr.low(), candle: Candle::from_ohlcv(curr) });
    }
  }
  set
}

// ============================================================
// SWING DETECTOR
// ============================================================

static SWING_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("structure_cap", 20.0, (2.0, 500.0), "Swings kept for BOS/CHoCH detection"),
  ParamMeta::period("level_cap", 100.0, (2.0, 1000.0), "Swings kept for equal-level detection"),
];

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SwingDetector {
  pub structure_cap: Period,
  pub level_cap: Period,
}

impl Default for SwingDetector {
  fn default() -> Self {
    Self {
      structure_cap: Period::new_const(super::helpers::STRUCTURE_SWING_CAP),
      level_cap: Period::new_const(super::helpers::LEVEL_SWING_CAP),
    }
  }
}

impl SwingDetector {
  pub fn id(&self) -> DetectorId {
    DetectorId("SWING")
  }

  pub fn min_bars(&self) -> usize {
    3
  }

  /// Full recompute over `candles`, keeping the most recent `level_cap` swings of each kind.
  pub fn detect<T: OHLCV>(&self, candles: &[T]) -> SwingSet {
    let set = find_swings(candles);
    if set.highs.len() > self.level_cap.get() || set.lows.len() > self.level_cap.get() {
      log::debug!(
        "swing cap {} reached ({} highs, {} lows)",
        self.level_cap.get(),
        set.highs.len(),
        set.lows.len()
      );
    }
    set.capped(self.level_cap.get())
  }

  /// The shorter view used by the structure state machine.
  pub fn structure_view(&self, swings: &SwingSet) -> SwingSet {
    swings.capped(self.structure_cap.get())
  }

  pub fn validate_config(&self) -> Result<()> {
    validate_params(
      SWING_PARAMS,
      &[("structure_cap", self.structure_cap.get() as f64), ("level_cap", self.level_cap.get() as f64)],
    )
  }
}

impl ParameterizedDetector for SwingDetector {
  fn param_meta() -> &'static [ParamMeta] {
    SWING_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let detector = Self {
      structure_cap: get_period(params, "structure_cap", super::helpers::STRUCTURE_SWING_CAP)?,
      level_cap: get_period(params, "level_cap", super::helpers::LEVEL_SWING_CAP)?,
    };
    detector.validate_config()?;
    Ok(detector)
  }

  fn detector_id_str() -> &'static str {
    "SWING"
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bars_from_highs(highs: &[f64]) -> Vec<Candle> {
    highs
      .iter()
      .enumerate()
      .map(|(i, &h)| Candle::new(60 * i as i64, h - 0.5, h, h - 1.0, h - 0.25))
      .collect()
  }

  #[test]
  fn test_swing_highs_scenario() {
    let bars = bars_from_highs(&[10.0, 12.0, 11.0, 13.0, 9.0]);
    let swings = SwingDetector::default().detect(&bars);

    let found: Vec<(usize, f64)> = swings.highs.iter().map(|s| (s.index, s.price)).collect();
    assert_eq!(found, vec![(1, 12.0), (3, 13.0)]);
    assert_eq!(swings.lows.len(), 1);
    assert_eq!(swings.lows[0].index, 2);
  }

  #[test]
  fn test_ties_count_as_swings() {
    let bars = bars_from_highs(&[10.0, 10.0, 10.0]);
    let swings = SwingDetector::default().detect(&bars);
    assert_eq!(swings.highs.len(), 1);
    assert_eq!(swings.lows.len(), 1);
  }

  #[test]
  fn test_too_few_candles() {
    let bars = bars_from_highs(&[10.0, 11.0]);
    assert!(SwingDetector::default().detect(&bars).is_empty());
  }

  #[test]
  fn test_level_cap_keeps_most_recent() {
    // zig-zag: every odd index is a swing high
    let highs: Vec<f64> = (0..21).map(|i| if i % 2 == 1 { 20.0 + i as f64 } else { 10.0 }).collect();
    let bars = bars_from_highs(&highs);
    let detector = SwingDetector { structure_cap: Period::new_const(3), level_cap: Period::new_const(5) };

    let swings = detector.detect(&bars);
    assert_eq!(swings.highs.len(), 5);
    assert_eq!(swings.highs.last().unwrap().index, 19);

    let view = detector.structure_view(&swings);
    let idx: Vec<usize> = view.highs.iter().map(|s| s.index).collect();
    assert_eq!(idx, vec![15, 17, 19]);
  }

  #[test]
  fn test_with_params_validates() {
    let mut params = HashMap::new();
    params.insert("structure_cap", 10.0);
    let d = SwingDetector::with_params(&params).unwrap();
    assert_eq!(d.structure_cap.get(), 10);
    assert_eq!(d.level_cap.get(), 100);

    params.insert("level_cap", 1.0);
    assert!(SwingDetector::with_params(&params).is_err());
  }
}
