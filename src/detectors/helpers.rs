//! Shared thresholds and comparison helpers for structure detection

// ============================================================
// DEFAULT THRESHOLDS
// ============================================================

/// Relative price tolerance for two extrema to count as equal (~8 bps)
pub const EQUAL_TOLERANCE: f64 = 0.0008;
/// Two swings at most this many candles apart are "close"
pub const CLOSE_PROXIMITY_BARS: usize = 20;
/// Violations tolerated before a close-proximity pair is invalidated
pub const CLOSE_VIOLATION_BUDGET: usize = 1;
/// Violations tolerated before a far-proximity pair is invalidated
pub const FAR_VIOLATION_BUDGET: usize = 3;
/// Candles inspected after a breakout when looking for a retest
pub const RETEST_WINDOW: usize = 20;
/// Opposite-side swings used as violation levels
pub const VIOLATION_LEVELS: usize = 3;
/// Minimum seconds between two BOS (or two CHoCH) signals
pub const SIGNAL_COOLDOWN_SECS: i64 = 60;
/// Swings retained for the structure state machine
pub const STRUCTURE_SWING_CAP: usize = 20;
/// Swings retained for equal-level detection
pub const LEVEL_SWING_CAP: usize = 100;
/// Order blocks reported per scan
pub const ORDER_BLOCK_LIMIT: usize = 10;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// `|a - b| <= tolerance * |reference|`
#[inline]
pub fn within_tolerance(a: f64, b: f64, reference: f64, tolerance: f64) -> bool {
  (a - b).abs() <= tolerance * reference.abs()
}

/// True when no signal fired yet, or at least `cooldown` seconds passed since `last`.
#[inline]
pub fn cooled_down(last: Option<i64>, now: i64, cooldown: i64) -> bool {
  last.map_or(true, |t| now - t >= cooldown)
}

/// Qualitative distance between two window positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
  Close,
  Far,
}

impl Proximity {
  /// Classify two window positions; `close_bars` apart or fewer is [`Proximity::Close`].
  #[inline]
  pub fn between(a: usize, b: usize, close_bars: usize) -> Self {
    if a.abs_diff(b) <= close_bars {
      Proximity::Close
    } else {
      Proximity::Far
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Proximity::Close => "close",
      Proximity::Far => "far",
    }
  }
}
