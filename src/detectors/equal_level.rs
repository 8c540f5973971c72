//! Equal-High / Equal-Low liquidity level detection
//!
//! A candidate pair of same-side swings must pass, in order: price equality
//! within tolerance, the body test, a root swing between the pair, an
//! uninterrupted gap, and the violation budget. Survivors are then classified
//! by breakout and retest. EQL is the exact mirror of EQH; every comparison
//! goes through [`LevelKind`] so the two sides cannot drift apart.

use std::collections::HashMap;

use super::helpers::{
  within_tolerance, Proximity, CLOSE_PROXIMITY_BARS, CLOSE_VIOLATION_BUDGET, EQUAL_TOLERANCE, FAR_VIOLATION_BUDGET,
  RETEST_WINDOW, VIOLATION_LEVELS,
};
use super::swing::{SwingKind, SwingPoint, SwingSet};
use crate::{
  params::{get_period, get_ratio, validate_params, ParamMeta, ParameterizedDetector},
  DetectorId, Period, Ratio, Result, WindowDetector, OHLCV,
};

// ============================================================
// TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LevelKind {
  EqualHigh,
  EqualLow,
}

impl LevelKind {
  pub fn label(self) -> &'static str {
    match self {
      LevelKind::EqualHigh => "EQH",
      LevelKind::EqualLow => "EQL",
    }
  }

  fn side(self) -> SwingKind {
    match self {
      LevelKind::EqualHigh => SwingKind::High,
      LevelKind::EqualLow => SwingKind::Low,
    }
  }

  fn opposite_side(self) -> SwingKind {
    match self {
      LevelKind::EqualHigh => SwingKind::Low,
      LevelKind::EqualLow => SwingKind::High,
    }
  }

  /// `a` lies further out than `b` (above for EQH, below for EQL)
  #[inline]
  fn beyond(self, a: f64, b: f64) -> bool {
    match self {
      LevelKind::EqualHigh => a > b,
      LevelKind::EqualLow => a < b,
    }
  }

  #[inline]
  fn extreme<T: OHLCV>(self, bar: &T) -> f64 {
    match self {
      LevelKind::EqualHigh => bar.high(),
      LevelKind::EqualLow => bar.low(),
    }
  }

  #[inline]
  fn inner_extreme<T: OHLCV>(self, bar: &T) -> f64 {
    match self {
      LevelKind::EqualHigh => bar.low(),
      LevelKind::EqualLow => bar.high(),
    }
  }

  #[inline]
  fn body_edge(self, swing: &SwingPoint) -> f64 {
    match self {
      LevelKind::EqualHigh => swing.body_high(),
      LevelKind::EqualLow => swing.body_low(),
    }
  }
}

/// Outcome of the post-breakout retest search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum RetestStatus {
  #[default]
  #[serde(rename = "Manual Check")]
  ManualCheck,
  Continuation,
  Reversal,
}

impl RetestStatus {
  pub fn label(self) -> &'static str {
    match self {
      RetestStatus::ManualCheck => "Manual Check",
      RetestStatus::Continuation => "Continuation",
      RetestStatus::Reversal => "Reversal",
    }
  }
}

/// A validated equal-level pair.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EqualLevel {
  pub kind: LevelKind,
  pub level: f64,
  pub current_time: i64,
  pub previous_time: i64,
  pub current_price: f64,
  pub previous_price: f64,
  pub root_price: f64,
  pub root_time: i64,
  pub breakout: bool,
  pub breakout_time: Option<i64>,
  pub retest: bool,
  pub status: RetestStatus,
  pub proximity: Proximity,
}

// ============================================================
// EQUAL LEVEL DETECTOR
// ============================================================

static EQUAL_LEVEL_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("tolerance", 0.0008, (0.0, 0.05), "Relative distance at which two extrema count as equal"),
  ParamMeta::period("close_proximity", 20.0, (1.0, 500.0), "Max candles between swings of a close pair"),
  ParamMeta::period("close_budget", 1.0, (1.0, 10.0), "Violations invalidating a close pair"),
  ParamMeta::period("far_budget", 3.0, (1.0, 10.0), "Violations invalidating a far pair"),
  ParamMeta::period("violation_levels", 3.0, (1.0, 10.0), "Opposite swings used as violation levels"),
  ParamMeta::period("retest_window", 20.0, (3.0, 500.0), "Candles searched for a retest after breakout"),
  ParamMeta::period("min_bars", 5.0, (3.0, 100.0), "Candles required before pairs are evaluated"),
];

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EqualLevelDetector {
  pub tolerance: Ratio,
  pub close_proximity: Period,
  pub close_budget: Period,
  pub far_budget: Period,
  pub violation_levels: Period,
  pub retest_window: Period,
  pub min_bars: Period,
}

impl Default for EqualLevelDetector {
  fn default() -> Self {
    Self {
      tolerance: Ratio::new_const(EQUAL_TOLERANCE),
      close_proximity: Period::new_const(CLOSE_PROXIMITY_BARS),
      close_budget: Period::new_const(CLOSE_VIOLATION_BUDGET),
      far_budget: Period::new_const(FAR_VIOLATION_BUDGET),
      violation_levels: Period::new_const(VIOLATION_LEVELS),
      retest_window: Period::new_const(RETEST_WINDOW),
      min_bars: Period::new_const(5),
    }
  }
}

impl EqualLevelDetector {
  /// All surviving pairs of one kind, ordered by the later swing.
  pub fn scan_kind<T: OHLCV>(&self, kind: LevelKind, candles: &[T], swings: &SwingSet) -> Vec<EqualLevel> {
    let mut found = Vec::new();
    if candles.len() < self.min_bars.get() {
      return found;
    }
    let same = swings.of_kind(kind.side());
    let opposite = swings.of_kind(kind.opposite_side());

    for (i, current) in same.iter().enumerate() {
      for previous in &same[..i] {
        if let Some(level) = self.evaluate(kind, candles, same, opposite, previous, current) {
          found.push(level);
        }
      }
    }
    found
  }

  fn evaluate<T: OHLCV>(
    &self,
    kind: LevelKind,
    candles: &[T],
    same: &[SwingPoint],
    opposite: &[SwingPoint],
    previous: &SwingPoint,
    current: &SwingPoint,
  ) -> Option<EqualLevel> {
    if kind.beyond(current.price, previous.price)
      || !within_tolerance(current.price, previous.price, current.price, self.tolerance.get())
    {
      return None;
    }
    if !kind.beyond(current.price, kind.body_edge(previous)) {
      return None;
    }

    let proximity = Proximity::between(current.index, previous.index, self.close_proximity.get());

    let Some(root) = find_root(kind, opposite, previous, current) else {
      log::debug!("{} {}->{}: no root swing, discarded", kind.label(), previous.time(), current.time());
      return None;
    };

    if !gap_holds(kind, candles, previous, current) {
      return None;
    }

    let levels: Vec<f64> = {
      let prior: Vec<f64> = opposite.iter().filter(|s| s.index < current.index).map(|s| s.price).collect();
      prior[prior.len().saturating_sub(self.violation_levels.get())..].to_vec()
    };
    let budget = match proximity {
      Proximity::Close => self.close_budget.get(),
      Proximity::Far => self.far_budget.get(),
    };
    if violated(kind, candles, current.index, &levels, budget) {
      log::debug!("{} {}->{}: violation budget {} spent", kind.label(), previous.time(), current.time(), budget);
      return None;
    }

    let breakout_index = candles
      .iter()
      .enumerate()
      .skip(current.index + 1)
      .find(|(_, c)| kind.beyond(kind.extreme(*c), previous.price))
      .map(|(i, _)| i);

    let (retest, status) = match breakout_index {
      Some(b) => self.classify_retest(kind, candles, same, current.price, b),
      None => (false, RetestStatus::ManualCheck),
    };

    Some(EqualLevel {
      kind,
      level: current.price,
      current_time: current.time(),
      previous_time: previous.time(),
      current_price: current.price,
      previous_price: previous.price,
      root_price: root.price,
      root_time: root.time(),
      breakout: breakout_index.is_some(),
      breakout_time: breakout_index.map(|b| candles[b].time()),
      retest,
      status,
      proximity,
    })
  }

  /// Look for a fresh local extreme touching `level` in the candles after breakout.
  fn classify_retest<T: OHLCV>(
    &self,
    kind: LevelKind,
    candles: &[T],
    same: &[SwingPoint],
    level: f64,
    breakout: usize,
  ) -> (bool, RetestStatus) {
    let end = (breakout + self.retest_window.get()).min(candles.len());
    let window = &candles[breakout..end];

    let touched = window.windows(3).any(|w| {
      let (prev, c, next) = (&w[0], &w[1], &w[2]);
      !kind.beyond(kind.inner_extreme(c), level)
        && kind.beyond(kind.extreme(c), kind.extreme(prev))
        && kind.beyond(kind.extreme(c), kind.extreme(next))
    });
    if !touched {
      return (false, RetestStatus::ManualCheck);
    }

    let status = match same.iter().find(|s| s.index > breakout) {
      Some(after) if window.iter().any(|c| kind.beyond(c.close(), after.price)) => RetestStatus::Continuation,
      Some(_) => RetestStatus::Reversal,
      None => RetestStatus::ManualCheck,
    };
    (true, status)
  }
}

/// The most extreme opposite swing strictly between the pair and inside both prices.
fn find_root<'a>(
  kind: LevelKind,
  opposite: &'a [SwingPoint],
  previous: &SwingPoint,
  current: &SwingPoint,
) -> Option<&'a SwingPoint> {
  opposite
    .iter()
    .filter(|s| s.time() > previous.time() && s.time() < current.time())
    .filter(|s| kind.beyond(previous.price, s.price) && kind.beyond(current.price, s.price))
    .fold(None, |best: Option<&SwingPoint>, s| match best {
      Some(b) if !kind.beyond(b.price, s.price) => Some(b),
      _ => Some(s),
    })
}

/// Every candle strictly between the pair stays inside the earlier swing's price.
fn gap_holds<T: OHLCV>(kind: LevelKind, candles: &[T], previous: &SwingPoint, current: &SwingPoint) -> bool {
  let between = candles.get(previous.index + 1..current.index).unwrap_or(&[]);
  between.iter().all(|c| kind.beyond(previous.price, kind.extreme(c)))
}

/// Count closes through successive `levels` after `start`.
///
/// Reaching `budget` invalidates. Once at least one violation happened, a close
/// back beyond the outermost level ends the scan without invalidation.
fn violated<T: OHLCV>(kind: LevelKind, candles: &[T], start: usize, levels: &[f64], budget: usize) -> bool {
  let Some(&first) = levels.first() else {
    return false;
  };
  let outer = levels.iter().copied().fold(first, |a, b| if kind.beyond(b, a) { b } else { a });
  let mut count = 0;

  for c in candles.iter().skip(start + 1) {
    if let Some(&level) = levels.get(count) {
      if kind.beyond(level, c.close()) {
        count += 1;
        if count >= budget {
          return true;
        }
      }
    }
    // a close back beyond the outermost level ends the scan, but only once something was violated
    if count > 0 && kind.beyond(c.close(), outer) {
      return false;
    }
  }
  false
}

impl WindowDetector for EqualLevelDetector {
  type Output = EqualLevel;

  fn id(&self) -> DetectorId {
    DetectorId("EQUAL_LEVEL")
  }

  fn min_bars(&self) -> usize {
    self.min_bars.get()
  }

  /// EQH pairs followed by EQL pairs.
  fn scan<T: OHLCV>(&self, candles: &[T], swings: &SwingSet) -> Vec<EqualLevel> {
    let mut levels = self.scan_kind(LevelKind::EqualHigh, candles, swings);
    levels.extend(self.scan_kind(LevelKind::EqualLow, candles, swings));
    levels
  }

  fn validate_config(&self) -> Result<()> {
    validate_params(
      EQUAL_LEVEL_PARAMS,
      &[
        ("tolerance", self.tolerance.get()),
        ("close_proximity", self.close_proximity.get() as f64),
        ("close_budget", self.close_budget.get() as f64),
        ("far_budget", self.far_budget.get() as f64),
        ("violation_levels", self.violation_levels.get() as f64),
        ("retest_window", self.retest_window.get() as f64),
        ("min_bars", self.min_bars.get() as f64),
      ],
    )
  }
}

impl ParameterizedDetector for EqualLevelDetector {
  fn param_meta() -> &'static [ParamMeta] {
    EQUAL_LEVEL_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let detector = Self {
      tolerance: get_ratio(params, "tolerance", EQUAL_TOLERANCE)?,
      close_proximity: get_period(params, "close_proximity", CLOSE_PROXIMITY_BARS)?,
      close_budget: get_period(params, "close_budget", CLOSE_VIOLATION_BUDGET)?,
      far_budget: get_period(params, "far_budget", FAR_VIOLATION_BUDGET)?,
      violation_levels: get_period(params, "violation_levels", VIOLATION_LEVELS)?,
      retest_window: get_period(params, "retest_window", RETEST_WINDOW)?,
      min_bars: get_period(params, "min_bars", 5)?,
    };
    detector.validate_config()?;
    Ok(detector)
  }

  fn detector_id_str() -> &'static str {
    "EQUAL_LEVEL"
  }
}
