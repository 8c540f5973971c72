//! # YAMSD - Yet Another Market Structure Detector
//!
//! Incremental market-structure detection over a live candle stream: swing points,
//! Break-of-Structure / Change-of-Character transitions, order blocks, Equal-High /
//! Equal-Low liquidity levels and "S" setups.
//!
//! ## Quick Start
//!
//! ```rust
//! use yamsd::prelude::*;
//!
//! // One session per (symbol, granularity)
//! let mut session = SessionBuilder::new("R_10", Granularity::Min1)
//!     .build()
//!     .unwrap();
//!
//! // Feed candles as the transport delivers them
//! for (i, close) in [10.0, 12.0, 11.0, 13.0, 9.0].into_iter().enumerate() {
//!     let time = 60 * i as i64;
//!     let report = session.process(Candle::new(time, close, close + 0.5, close - 0.5, close));
//!     assert!(!report.update.is_dropped());
//! }
//!
//! assert_eq!(session.swings().highs.len(), 2);
//! ```

use std::fmt;

use rayon::prelude::*;

pub mod alert;
pub mod detectors;
pub mod params;
pub mod session;
pub mod signals;
pub mod window;

pub mod prelude {
    pub use crate::{
        // Alerts
        alert::{
            spawn_alert_worker, spawn_sink_worker, AlertSink, ChannelAlertSink, LogAlertSink, PriceAlert, ThresholdAlerts,
        },
        // Detectors
        detectors::*,
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Parallel
        replay_parallel,
        // Sessions
        session::{CancelHandle, ProcessReport, Session, SessionBuilder, SessionConfig, SessionManager},
        // Signals
        signals::{
            EqualLevelEntry, OrderBlockEntry, SetupEntry, Signal, SignalEntry, SignalKey, SignalList, SignalSink,
            StructureEntry, SwingRef, Upsert,
        },
        // Window
        window::{CandleWindow, DropReason, WindowUpdate},
        // Types
        Candle,
        DetectError,
        DetectorId,
        Direction,
        Granularity,
        OHLCVExt,
        Period,
        Ratio,
        ReplayError,
        ReplayResult,
        Result,
        SessionKey,
        WindowDetector,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, DetectError>;

/// Errors raised while configuring sessions or validating input
#[derive(Debug, Clone, thiserror::Error)]
pub enum DetectError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid candle at epoch {time}: {reason}")]
    InvalidCandle { time: i64, reason: &'static str },

    #[error("Unknown granularity: {0}s")]
    UnknownGranularity(u32),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(DetectError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(DetectError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Count of candles, seconds or entries (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(DetectError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait. `time` is the candle's opening epoch in seconds.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn time(&self) -> i64;

    fn volume(&self) -> f64 {
        0.0
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// Top of the real body: `max(open, close)`
    #[inline]
    fn body_high(&self) -> f64 {
        self.open().max(self.close())
    }

    /// Bottom of the real body: `min(open, close)`
    #[inline]
    fn body_low(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// True when `price` lies within `[low, high]`
    #[inline]
    fn contains(&self, price: f64) -> bool {
        self.low() <= price && price <= self.high()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let time = self.time();
        if self.open().is_nan() || self.high().is_nan() || self.low().is_nan() || self.close().is_nan() {
            return Err(DetectError::InvalidCandle {
                time,
                reason: "NaN in OHLC",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(DetectError::InvalidCandle {
                time,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(DetectError::InvalidCandle {
                time,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// CANDLE
// ============================================================

/// A single price candle as delivered by the market-data feed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    #[serde(alias = "epoch")]
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Candle {
    pub fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    /// Copy any OHLCV bar into a `Candle`; a zero volume is treated as absent.
    pub fn from_ohlcv<T: OHLCV>(bar: &T) -> Self {
        Self {
            time: bar.time(),
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
            volume: Some(bar.volume()).filter(|v| *v != 0.0),
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn time(&self) -> i64 {
        self.time
    }

    fn volume(&self) -> f64 {
        self.volume.unwrap_or(0.0)
    }
}

/// Direction/bias of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Bullish => "Bullish",
            Direction::Bearish => "Bearish",
        }
    }
}

// ============================================================
// GRANULARITY / SESSION KEY
// ============================================================

/// Candle periods accepted from the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Granularity {
    Min1,
    Min2,
    Min3,
    Min5,
    Min10,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Hour8,
    Hour24,
}

impl Granularity {
    /// Duration of one candle in seconds.
    pub fn seconds(self) -> u32 {
        match self {
            Granularity::Min1 => 60,
            Granularity::Min2 => 120,
            Granularity::Min3 => 180,
            Granularity::Min5 => 300,
            Granularity::Min10 => 600,
            Granularity::Min15 => 900,
            Granularity::Min30 => 1800,
            Granularity::Hour1 => 3600,
            Granularity::Hour2 => 7200,
            Granularity::Hour4 => 14400,
            Granularity::Hour8 => 28800,
            Granularity::Hour24 => 86400,
        }
    }

    /// Short label, e.g. "15m" or "4h".
    pub fn label(self) -> &'static str {
        match self {
            Granularity::Min1 => "1m",
            Granularity::Min2 => "2m",
            Granularity::Min3 => "3m",
            Granularity::Min5 => "5m",
            Granularity::Min10 => "10m",
            Granularity::Min15 => "15m",
            Granularity::Min30 => "30m",
            Granularity::Hour1 => "1h",
            Granularity::Hour2 => "2h",
            Granularity::Hour4 => "4h",
            Granularity::Hour8 => "8h",
            Granularity::Hour24 => "24h",
        }
    }

    /// All granularities, finest first.
    pub fn all() -> &'static [Granularity] {
        &[
            Granularity::Min1,
            Granularity::Min2,
            Granularity::Min3,
            Granularity::Min5,
            Granularity::Min10,
            Granularity::Min15,
            Granularity::Min30,
            Granularity::Hour1,
            Granularity::Hour2,
            Granularity::Hour4,
            Granularity::Hour8,
            Granularity::Hour24,
        ]
    }

    pub fn from_seconds(seconds: u32) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|g| g.seconds() == seconds)
            .ok_or(DetectError::UnknownGranularity(seconds))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifies one detection session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionKey {
    pub symbol: String,
    pub granularity: Granularity,
}

impl SessionKey {
    pub fn new(symbol: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            symbol: symbol.into(),
            granularity,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.granularity)
    }
}

// ============================================================
// WINDOW DETECTOR TRAIT
// ============================================================

/// Unique identifier for a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetectorId(pub &'static str);

impl DetectorId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// A stateless detector that rescans the whole window on every pass.
pub trait WindowDetector: Send + Sync {
    type Output;

    fn id(&self) -> DetectorId;
    fn min_bars(&self) -> usize;
    fn scan<T: OHLCV>(&self, candles: &[T], swings: &detectors::SwingSet) -> Vec<Self::Output>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// PARALLEL REPLAY
// ============================================================

/// Final state of one replayed session
#[derive(Debug)]
pub struct ReplayResult {
    pub key: SessionKey,
    pub signals: signals::SignalSink,
    /// Number of signals newly emitted over the whole replay
    pub emitted: usize,
}

/// Error from replaying a single session
#[derive(Debug)]
pub struct ReplayError {
    pub key: SessionKey,
    pub error: DetectError,
}

/// Replay independent candle histories in parallel, one session per key.
///
/// Each history is fed candle by candle, exactly as a live feed would be, so the
/// result matches what an incremental session would have emitted.
pub fn replay_parallel<'a, I>(config: &session::SessionConfig, histories: I) -> (Vec<ReplayResult>, Vec<ReplayError>)
where
    I: IntoParallelIterator<Item = (SessionKey, &'a [Candle])>,
{
    let results: Vec<_> = histories
        .into_par_iter()
        .map(|(key, candles)| {
            session::SessionBuilder::from_key(key.clone())
                .config(config.clone())
                .build()
                .map(|mut session| {
                    let emitted = candles.iter().map(|c| session.process(*c).signals.len()).sum();
                    ReplayResult {
                        key: key.clone(),
                        signals: session.into_signals(),
                        emitted,
                    }
                })
                .map_err(|error| ReplayError { key, error })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
