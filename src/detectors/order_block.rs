//! Order block detection over consecutive candle triples
//!
//! Independent of swings and structure state: only raw candles are read.

use std::collections::{HashMap, HashSet};

use super::helpers::ORDER_BLOCK_LIMIT;
use super::swing::SwingSet;
use crate::{
  params::{get_period, validate_params, ParamMeta, ParameterizedDetector},
  Candle, DetectorId, Direction, OHLCVExt, Period, Result, WindowDetector, OHLCV,
};

/// A candle preceding a displacement gap.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrderBlock {
  pub direction: Direction,
  pub candle: Candle,
  /// Price traded back into the block after the displacement candle
  pub revisited: bool,
}

impl OrderBlock {
  pub fn label(&self) -> &'static str {
    match self.direction {
      Direction::Bullish => "Bullish Order Block",
      Direction::Bearish => "Bearish Order Block",
    }
  }
}

static ORDER_BLOCK_PARAMS: &[ParamMeta] =
  &[ParamMeta::period("limit", 10.0, (1.0, 100.0), "Order blocks reported per scan")];

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrderBlockDetector {
  pub limit: Period,
}

impl Default for OrderBlockDetector {
  fn default() -> Self {
    Self { limit: Period::new_const(ORDER_BLOCK_LIMIT) }
  }
}

impl OrderBlockDetector {
  /// `ob` is bearish-bodied, `mid` stays under its high, `next` gaps fully above it.
  #[inline]
  fn is_bullish_block<T: OHLCV>(ob: &T, mid: &T, next: &T) -> bool {
    ob.is_bearish() && mid.high() < ob.high() && next.low() > ob.high()
  }

  /// `ob` is bullish-bodied, `mid` stays over its low, `next` gaps fully below it.
  #[inline]
  fn is_bearish_block<T: OHLCV>(ob: &T, mid: &T, next: &T) -> bool {
    ob.is_bullish() && mid.low() > ob.low() && next.high() < ob.low()
  }

  fn revisited<T: OHLCV>(direction: Direction, ob: &T, later: &[T]) -> bool {
    match direction {
      Direction::Bullish => later.iter().any(|c| c.low() <= ob.high()),
      Direction::Bearish => later.iter().any(|c| c.high() >= ob.low()),
    }
  }
}

impl WindowDetector for OrderBlockDetector {
  type Output = OrderBlock;

  fn id(&self) -> DetectorId {
    DetectorId("ORDER_BLOCK")
  }

  fn min_bars(&self) -> usize {
    3
  }

  /// Blocks in window order, deduplicated by `(open, close)`, at most `limit`.
  fn scan<T: OHLCV>(&self, candles: &[T], _swings: &SwingSet) -> Vec<OrderBlock> {
    let mut blocks = Vec::new();
    if candles.len() < self.min_bars() {
      return blocks;
    }
    let mut seen = HashSet::new();

    for (i, triple) in candles.windows(3).enumerate() {
      let (ob, mid, next) = (&triple[0], &triple[1], &triple[2]);
      let later = &candles[i + 3..];

      for direction in [Direction::Bullish, Direction::Bearish] {
        let hit = match direction {
          Direction::Bullish => Self::is_bullish_block(ob, mid, next),
          Direction::Bearish => Self::is_bearish_block(ob, mid, next),
        };
        if hit && seen.insert((ob.open().to_bits(), ob.close().to_bits())) {
          blocks.push(OrderBlock {
            direction,
            candle: Candle::from_ohlcv(ob),
            revisited: Self::revisited(direction, ob, later),
          });
        }
      }
    }

    blocks.truncate(self.limit.get());
    blocks
  }

  fn validate_config(&self) -> Result<()> {
    validate_params(ORDER_BLOCK_PARAMS, &[("limit", self.limit.get() as f64)])
  }
}

impl ParameterizedDetector for OrderBlockDetector {
  fn param_meta() -> &'static [ParamMeta] {
    ORDER_BLOCK_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let detector = Self { limit: get_period(params, "limit", ORDER_BLOCK_LIMIT)? };
    detector.validate_config()?;
    Ok(detector)
  }

  fn detector_id_str() -> &'static str {
    "ORDER_BLOCK"
  }
}
