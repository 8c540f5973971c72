//! Bounded, time-ordered candle buffer
//!
//! The newest candle may be replaced in place while its period is still open;
//! every earlier candle is immutable. Capacity overflow evicts from the front.

use crate::{Candle, OHLCVExt};

/// Why a candle was not stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DropReason {
  /// Epoch older than the newest stored candle
  OutOfOrder { last: i64, got: i64 },
  /// Non-finite prices or `high < low`
  Malformed(&'static str),
  /// The owning session has been torn down
  SessionClosed,
}

/// Outcome of [`CandleWindow::append_or_update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowUpdate {
  /// New candle stored; `evicted` is the epoch of the candle pushed out, if any
  Appended { evicted: Option<i64> },
  /// Newest candle updated in place
  Replaced,
  Dropped(DropReason),
}

impl WindowUpdate {
  #[inline]
  pub fn is_dropped(&self) -> bool {
    matches!(self, WindowUpdate::Dropped(_))
  }
}

#[derive(Debug, Clone)]
pub struct CandleWindow {
  candles: Vec<Candle>,
  capacity: usize,
}

impl CandleWindow {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self { candles: Vec::with_capacity(capacity + 1), capacity }
  }

  /// Merge `candle` into the window.
  ///
  /// Equal epoch to the newest candle replaces it, a greater epoch appends,
  /// a smaller epoch is dropped without touching stored state.
  pub fn append_or_update(&mut self, candle: Candle) -> WindowUpdate {
    if let Err(err) = candle.validate() {
      let reason = match err {
        crate::DetectError::InvalidCandle { reason, .. } => reason,
        _ => "invalid candle",
      };
      return WindowUpdate::Dropped(DropReason::Malformed(reason));
    }

    match self.candles.last().map(|c| c.time) {
      Some(last) if candle.time == last => {
        if let Some(newest) = self.candles.last_mut() {
          *newest = candle;
        }
        WindowUpdate::Replaced
      },
      Some(last) if candle.time < last => WindowUpdate::Dropped(DropReason::OutOfOrder { last, got: candle.time }),
      _ => {
        self.candles.push(candle);
        let evicted = if self.candles.len() > self.capacity { Some(self.candles.remove(0).time) } else { None };
        WindowUpdate::Appended { evicted }
      },
    }
  }

  #[inline]
  pub fn candles(&self) -> &[Candle] {
    &self.candles
  }

  #[inline]
  pub fn last(&self) -> Option<&Candle> {
    self.candles.last()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.candles.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.candles.is_empty()
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn clear(&mut self) {
    self.candles.clear();
  }
}
