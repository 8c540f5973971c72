//! Break-of-Structure / Change-of-Character state machine
//!
//! Every pass walks the whole window in time order against the current swing
//! view. The tracker's broken-level set and cooldown timers carry over between
//! passes, so a candle already judged on an earlier pass cannot fire again.

use std::collections::{HashMap, HashSet};

use super::helpers::{cooled_down, SIGNAL_COOLDOWN_SECS};
use super::swing::{SwingPoint, SwingSet};
use crate::{
  params::{get_period, validate_params, ParamMeta, ParameterizedDetector},
  Candle, DetectorId, Direction, Period, Result, OHLCV,
};

/// Directional state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum StructureState {
  #[default]
  None,
  BosUp,
  BosDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StructureKind {
  Bos(Direction),
  Choch(Direction),
}

impl StructureKind {
  pub fn label(self) -> &'static str {
    match self {
      StructureKind::Bos(Direction::Bullish) => "BOS (Bullish)",
      StructureKind::Bos(Direction::Bearish) => "BOS (Bearish)",
      StructureKind::Choch(Direction::Bullish) => "CHoCH (Bullish)",
      StructureKind::Choch(Direction::Bearish) => "CHoCH (Bearish)",
    }
  }

  #[inline]
  pub fn is_bos(self) -> bool {
    matches!(self, StructureKind::Bos(_))
  }

  pub fn direction(self) -> Direction {
    match self {
      StructureKind::Bos(d) | StructureKind::Choch(d) => d,
    }
  }
}

/// One BOS or CHoCH transition.
///
/// For a BOS `candle` is the candle whose close broke the level; for a CHoCH it
/// is the newest swing, and `reference` the swing it is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureEvent {
  pub kind: StructureKind,
  pub candle: Candle,
  pub reference: SwingPoint,
}

/// Per-session mutable structure context.
#[derive(Debug, Clone, Default)]
pub struct StructureTracker {
  state: StructureState,
  broken: HashSet<i64>,
  last_bos: Option<i64>,
  last_choch: Option<i64>,
}

impl StructureTracker {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn state(&self) -> StructureState {
    self.state
  }

  /// True when the swing opened at `time` has already fired a BOS.
  #[inline]
  pub fn is_broken(&self, time: i64) -> bool {
    self.broken.contains(&time)
  }

  pub fn broken_count(&self) -> usize {
    self.broken.len()
  }

  pub fn last_bos(&self) -> Option<i64> {
    self.last_bos
  }

  pub fn last_choch(&self) -> Option<i64> {
    self.last_choch
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }
}

// ============================================================
// STRUCTURE DETECTOR
// ============================================================

static STRUCTURE_PARAMS: &[ParamMeta] = &[
  ParamMeta::period("cooldown_secs", 60.0, (1.0, 86400.0), "Minimum seconds between two BOS or two CHoCH signals"),
  ParamMeta::period("min_bars", 5.0, (3.0, 100.0), "Candles required before structure is evaluated"),
];

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StructureDetector {
  pub cooldown_secs: Period,
  pub min_bars: Period,
}

impl Default for StructureDetector {
  fn default() -> Self {
    Self { cooldown_secs: Period::new_const(SIGNAL_COOLDOWN_SECS as usize), min_bars: Period::new_const(5) }
  }
}

impl StructureDetector {
  pub fn id(&self) -> DetectorId {
    DetectorId("STRUCTURE")
  }

  pub fn min_bars(&self) -> usize {
    self.min_bars.get()
  }

  /// Walk `candles` in order and return the transitions that fire on this pass.
  ///
  /// `swings` is the capped structure view. Checks run per candle in a fixed
  /// order: bullish BOS, bearish BOS, bullish CHoCH, bearish CHoCH. BOS in
  /// either direction shares one cooldown timer, CHoCH another.
  pub fn advance<T: OHLCV>(&self, tracker: &mut StructureTracker, candles: &[T], swings: &SwingSet) -> Vec<StructureEvent> {
    let mut events = Vec::new();
    if candles.len() < self.min_bars() {
      return events;
    }
    let cooldown = self.cooldown_secs.get() as i64;

    for bar in candles {
      let now = bar.time();

      if let Some(level) = second_last(&swings.highs) {
        if !tracker.is_broken(level.time()) && bar.close() > level.price && cooled_down(tracker.last_bos, now, cooldown) {
          tracker.broken.insert(level.time());
          tracker.last_bos = Some(now);
          tracker.state = StructureState::BosUp;
          events.push(StructureEvent {
            kind: StructureKind::Bos(Direction::Bullish),
            candle: Candle::from_ohlcv(bar),
            reference: *level,
          });
        }
      }

      if let Some(level) = second_last(&swings.lows) {
        if !tracker.is_broken(level.time()) && bar.close() < level.price && cooled_down(tracker.last_bos, now, cooldown) {
          tracker.broken.insert(level.time());
          tracker.last_bos = Some(now);
          tracker.state = StructureState::BosDown;
          events.push(StructureEvent {
            kind: StructureKind::Bos(Direction::Bearish),
            candle: Candle::from_ohlcv(bar),
            reference: *level,
          });
        }
      }

      if tracker.state == StructureState::BosUp && cooled_down(tracker.last_choch, now, cooldown) {
        if let Some((prev, last)) = last_pair(&swings.lows) {
          if last.price > prev.price {
            tracker.last_choch = Some(now);
            tracker.state = StructureState::None;
            events.push(StructureEvent {
              kind: StructureKind::Choch(Direction::Bullish),
              candle: last.candle,
              reference: *prev,
            });
          }
        }
      }

      if tracker.state == StructureState::BosDown && cooled_down(tracker.last_choch, now, cooldown) {
        if let Some((prev, last)) = last_pair(&swings.highs) {
          if last.price < prev.price {
            tracker.last_choch = Some(now);
            tracker.state = StructureState::None;
            events.push(StructureEvent {
              kind: StructureKind::Choch(Direction::Bearish),
              candle: last.candle,
              reference: *prev,
            });
          }
        }
      }
    }

    if !events.is_empty() {
      log::debug!("structure pass: {} transition(s), state {:?}", events.len(), tracker.state);
    }
    events
  }

  pub fn validate_config(&self) -> Result<()> {
    validate_params(
      STRUCTURE_PARAMS,
      &[("cooldown_secs", self.cooldown_secs.get() as f64), ("min_bars", self.min_bars.get() as f64)],
    )
  }
}

#[inline]
fn second_last(swings: &[SwingPoint]) -> Option<&SwingPoint> {
  swings.len().checked_sub(2).map(|i| &swings[i])
}

#[inline]
fn last_pair(swings: &[SwingPoint]) -> Option<(&SwingPoint, &SwingPoint)> {
  match swings {
    [.., prev, last] => Some((prev, last)),
    _ => None,
  }
}

impl ParameterizedDetector for StructureDetector {
  fn param_meta() -> &'static [ParamMeta] {
    STRUCTURE_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let detector = Self {
      cooldown_secs: get_period(params, "cooldown_secs", SIGNAL_COOLDOWN_SECS as usize)?,
      min_bars: get_period(params, "min_bars", 5)?,
    };
    detector.validate_config()?;
    Ok(detector)
  }

  fn detector_id_str() -> &'static str {
    "STRUCTURE"
  }
}
