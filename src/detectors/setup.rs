//! "S" setups: a four-candle break with a retest of the order block's open

use std::collections::HashMap;

use super::swing::SwingSet;
use crate::{
  params::{get_period, validate_params, ParamMeta, ParameterizedDetector},
  Candle, DetectorId, Direction, OHLCVExt, Period, Result, WindowDetector, OHLCV,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum SetupStatus {
  #[default]
  NotRetested,
  Retested,
  RetestSurpassed,
}

impl SetupStatus {
  pub fn label(self) -> &'static str {
    match self {
      SetupStatus::NotRetested => "Not Retested",
      SetupStatus::Retested => "Retested",
      SetupStatus::RetestSurpassed => "Retest Surpassed",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Setup {
  pub direction: Direction,
  /// Candle whose close broke the order block
  pub bos_candle: Candle,
  pub order_block: Candle,
  /// The order block's open
  pub retest_zone: f64,
  pub retest_candle: Option<Candle>,
  pub status: SetupStatus,
}

impl Setup {
  pub fn label(&self) -> &'static str {
    match self.direction {
      Direction::Bullish => "Bullish S Setup",
      Direction::Bearish => "Bearish S Setup",
    }
  }
}

static SETUP_PARAMS: &[ParamMeta] =
  &[ParamMeta::period("min_bars", 10.0, (4.0, 500.0), "Candles required before setups are evaluated")];

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SetupDetector {
  pub min_bars: Period,
}

impl Default for SetupDetector {
  fn default() -> Self {
    Self { min_bars: Period::new_const(10) }
  }
}

impl SetupDetector {
  fn classify<T: OHLCV>(direction: Direction, c0: &T, c1: &T, c2: &T) -> bool {
    match direction {
      Direction::Bearish => c2.close() < c1.low() && c1.close() > c0.high(),
      Direction::Bullish => c2.close() > c1.high() && c1.close() < c0.low(),
    }
  }
}

impl WindowDetector for SetupDetector {
  type Output = Setup;

  fn id(&self) -> DetectorId {
    DetectorId("S_SETUP")
  }

  fn min_bars(&self) -> usize {
    self.min_bars.get()
  }

  fn scan<T: OHLCV>(&self, candles: &[T], _swings: &SwingSet) -> Vec<Setup> {
    let mut setups = Vec::new();
    if candles.len() < self.min_bars() {
      return setups;
    }

    for i in 3..candles.len() {
      let (c0, c1, c2) = (&candles[i - 3], &candles[i - 2], &candles[i - 1]);

      for direction in [Direction::Bearish, Direction::Bullish] {
        if !Self::classify(direction, c0, c1, c2) {
          continue;
        }
        let zone = c1.open();
        let retest = candles[i..].iter().find(|c| c.contains(zone));
        let status = match retest {
          None => SetupStatus::NotRetested,
          Some(c) => {
            let surpassed = match direction {
              Direction::Bearish => c.close() > c1.high(),
              Direction::Bullish => c.close() < c1.low(),
            };
            if surpassed {
              SetupStatus::RetestSurpassed
            } else {
              SetupStatus::Retested
            }
          },
        };

        setups.push(Setup {
          direction,
          bos_candle: Candle::from_ohlcv(c2),
          order_block: Candle::from_ohlcv(c1),
          retest_zone: zone,
          retest_candle: retest.map(Candle::from_ohlcv),
          status,
        });
      }
    }
    setups
  }

  fn validate_config(&self) -> Result<()> {
    validate_params(SETUP_PARAMS, &[("min_bars", self.min_bars.get() as f64)])
  }
}

impl ParameterizedDetector for SetupDetector {
  fn param_meta() -> &'static [ParamMeta] {
    SETUP_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let detector = Self { min_bars: get_period(params, "min_bars", 10)? };
    detector.validate_config()?;
    Ok(detector)
  }

  fn detector_id_str() -> &'static str {
    "S_SETUP"
  }
}
