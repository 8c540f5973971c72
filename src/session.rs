//! Per-(symbol, granularity) detection sessions
//!
//! A [`Session`] owns every piece of mutable detection state for one key: the
//! candle window, swing sequences, structure tracker, signal sink and threshold
//! alerts. Nothing is shared between sessions. [`SessionManager`] keeps at most
//! one session active and tears the previous one down before wiring a new key.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{
    alert::{spawn_sink_worker, AlertSink, ChannelAlertSink, PriceAlert, ThresholdAlerts},
    detectors::{
        EqualLevelDetector, OrderBlockDetector, SetupDetector, StructureDetector, StructureState, StructureTracker,
        SwingDetector, SwingSet,
    },
    params::{get_period, validate_params, ParamMeta, ParameterizedDetector},
    signals::{
        EqualLevelEntry, OrderBlockEntry, SetupEntry, Signal, SignalSink, StructureEntry, Upsert,
    },
    window::{CandleWindow, DropReason, WindowUpdate},
    Candle, DetectError, DetectorId, Granularity, Period, Result, SessionKey, WindowDetector,
};

// ============================================================
// CONFIGURATION
// ============================================================

static SESSION_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window_capacity", 100.0, (5.0, 10000.0), "Candles kept in the rolling window"),
    ParamMeta::period("signal_capacity", 10.0, (1.0, 1000.0), "Entries kept per signal list"),
];

/// Everything tunable about a session
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub window_capacity: Period,
    pub signal_capacity: Period,
    pub swing: SwingDetector,
    pub structure: StructureDetector,
    pub order_block: OrderBlockDetector,
    pub equal_level: EqualLevelDetector,
    pub setup: SetupDetector,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_capacity: Period::new_const(100),
            signal_capacity: Period::new_const(10),
            swing: SwingDetector::default(),
            structure: StructureDetector::default(),
            order_block: OrderBlockDetector::default(),
            equal_level: EqualLevelDetector::default(),
            setup: SetupDetector::default(),
        }
    }
}

impl SessionConfig {
    pub fn param_meta() -> &'static [ParamMeta] {
        SESSION_PARAMS
    }

    /// Build a config from flat parameters.
    ///
    /// Session-level names stand alone (`window_capacity`); detector parameters
    /// are prefixed with their section (`equal_level.tolerance`). Missing names
    /// keep their defaults.
    pub fn from_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let mut own: HashMap<&str, f64> = HashMap::new();
        let mut sections: HashMap<&str, HashMap<&str, f64>> = HashMap::new();
        for (&name, &value) in params {
            match name.split_once('.') {
                Some((section, param)) => {
                    sections.entry(section).or_default().insert(param, value);
                }
                None => {
                    own.insert(name, value);
                }
            }
        }
        if let Some(section) = sections.keys().find(|s| !CONFIG_SECTIONS.contains(*s)) {
            return Err(DetectError::InvalidConfig(format!("unknown section '{section}'")));
        }

        let pairs: Vec<(&str, f64)> = own.iter().map(|(&k, &v)| (k, v)).collect();
        validate_params(SESSION_PARAMS, &pairs)?;

        let config = Self {
            window_capacity: get_period(&own, "window_capacity", 100)?,
            signal_capacity: get_period(&own, "signal_capacity", 10)?,
            swing: section(&sections, "swing")?,
            structure: section(&sections, "structure")?,
            order_block: section(&sections, "order_block")?,
            equal_level: section(&sections, "equal_level")?,
            setup: section(&sections, "setup")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter against its metadata.
    pub fn validate(&self) -> Result<()> {
        validate_params(
            SESSION_PARAMS,
            &[
                ("window_capacity", self.window_capacity.get() as f64),
                ("signal_capacity", self.signal_capacity.get() as f64),
            ],
        )?;
        self.swing.validate_config()?;
        self.structure.validate_config()?;
        self.order_block.validate_config()?;
        self.equal_level.validate_config()?;
        self.setup.validate_config()?;
        Ok(())
    }
}

const CONFIG_SECTIONS: &[&str] = &["swing", "structure", "order_block", "equal_level", "setup"];

fn section<D: ParameterizedDetector>(sections: &HashMap<&str, HashMap<&str, f64>>, name: &str) -> Result<D> {
    let Some(params) = sections.get(name) else {
        return D::with_params(&HashMap::new());
    };
    let pairs: Vec<(&str, f64)> = params.iter().map(|(&k, &v)| (k, v)).collect();
    validate_params(D::param_meta(), &pairs)
        .inspect_err(|e| log::warn!("{} parameters under '{name}' rejected: {e}", D::detector_id_str()))?;
    D::with_params(params)
}

// ============================================================
// CANCELLATION
// ============================================================

/// Clonable, thread-safe cancellation flag scoped to one session.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================
// SESSION
// ============================================================

/// What one call to [`Session::process`] did
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub update: WindowUpdate,
    /// Signals newly inserted into the sink on this pass
    pub signals: Vec<Signal>,
    /// Alerts queued for delivery
    pub alerts_sent: usize,
}

impl ProcessReport {
    fn dropped(reason: DropReason) -> Self {
        Self {
            update: WindowUpdate::Dropped(reason),
            signals: Vec::new(),
            alerts_sent: 0,
        }
    }
}

pub struct Session {
    key: SessionKey,
    config: SessionConfig,
    window: CandleWindow,
    swings: SwingSet,
    structure: StructureTracker,
    sink: SignalSink,
    thresholds: ThresholdAlerts,
    alerts: Option<ChannelAlertSink>,
    cancel: CancelHandle,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("candles", &self.window.len())
            .field("state", &self.structure.state())
            .field("signals", &self.sink.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Ingest one candle: merge it into the window, run every detector, emit.
    ///
    /// Never fails. Rejected candles come back as [`WindowUpdate::Dropped`] and
    /// leave all state untouched; a panicking detector is logged and skipped.
    pub fn process(&mut self, candle: Candle) -> ProcessReport {
        if self.is_closed() {
            return ProcessReport::dropped(DropReason::SessionClosed);
        }

        let update = self.window.append_or_update(candle);
        match update {
            WindowUpdate::Dropped(reason) => {
                log::warn!("{}: dropped candle at {}: {:?}", self.key, candle.time, reason);
                return ProcessReport::dropped(reason);
            }
            WindowUpdate::Appended { evicted: Some(_) } => {
                if let Some(oldest) = self.window.candles().first() {
                    self.sink.forget_before(oldest.time);
                }
            }
            _ => {}
        }

        let signals = self.run_pass();
        self.finish(update, signals, candle.close)
    }

    /// Announce a pass and check price alerts, unless the session was cancelled meanwhile.
    fn finish(&mut self, update: WindowUpdate, signals: Vec<Signal>, price: f64) -> ProcessReport {
        let cancelled = ProcessReport {
            update,
            signals: Vec::new(),
            alerts_sent: 0,
        };
        if self.is_closed() {
            log::debug!("{}: cancelled before announcing {} signal(s)", self.key, signals.len());
            return cancelled;
        }
        let mut alerts_sent = self.announce(&signals);

        if self.is_closed() {
            return cancelled;
        }
        for message in self.thresholds.check(&self.key.symbol, price) {
            alerts_sent += usize::from(self.dispatch(&message));
        }

        ProcessReport {
            update,
            signals,
            alerts_sent,
        }
    }

    /// Replace the window with a history snapshot and run a single pass over it.
    ///
    /// The broken-level set and existing signals survive, so a snapshot that
    /// overlaps what was already seen does not re-announce it.
    pub fn load_history(&mut self, candles: &[Candle]) -> Vec<Signal> {
        if self.is_closed() {
            return Vec::new();
        }
        self.window.clear();
        self.swings.clear();

        let dropped = candles
            .iter()
            .filter(|c| self.window.append_or_update(**c).is_dropped())
            .count();
        if dropped > 0 {
            log::warn!("{}: {} of {} history candles dropped", self.key, dropped, candles.len());
        }
        log::info!("{}: loaded {} candles", self.key, self.window.len());

        let signals = self.run_pass();
        self.announce(&signals);
        signals
    }

    /// Discard all detection state; threshold alerts are re-armed.
    pub fn reset(&mut self) {
        self.window.clear();
        self.swings.clear();
        self.structure.reset();
        self.sink.clear();
        self.thresholds.reset();
        log::info!("{}: session reset", self.key);
    }

    /// Cancel the session and drop its state. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.is_closed() {
            return;
        }
        self.cancel.cancel();
        self.window.clear();
        self.swings.clear();
        self.structure.reset();
        self.sink.clear();
        log::info!("{}: session closed", self.key);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }

    pub fn swings(&self) -> &SwingSet {
        &self.swings
    }

    pub fn structure_state(&self) -> StructureState {
        self.structure.state()
    }

    pub fn structure(&self) -> &StructureTracker {
        &self.structure
    }

    pub fn signals(&self) -> &SignalSink {
        &self.sink
    }

    pub fn thresholds(&self) -> &ThresholdAlerts {
        &self.thresholds
    }

    pub fn thresholds_mut(&mut self) -> &mut ThresholdAlerts {
        &mut self.thresholds
    }

    pub fn into_signals(self) -> SignalSink {
        self.sink
    }

    /// Recompute swings and run every detector over the current window.
    fn run_pass(&mut self) -> Vec<Signal> {
        let Session {
            key,
            config,
            window,
            swings,
            structure,
            sink,
            cancel,
            ..
        } = self;
        let candles = window.candles();
        if candles.len() < config.swing.min_bars() {
            return Vec::new();
        }

        if let Some(fresh) = guarded(key, config.swing.id(), || config.swing.detect(candles)) {
            *swings = fresh;
        }
        log::debug!(
            "{key}: {} swing highs, {} swing lows over {} candles",
            swings.highs.len(),
            swings.lows.len(),
            candles.len()
        );

        let mut found = Vec::new();

        let view = config.swing.structure_view(swings);
        if let Some(events) = guarded(key, config.structure.id(), || config.structure.advance(structure, candles, &view)) {
            found.extend(events.iter().map(|e| Signal::Structure(StructureEntry::from(e))));
        }
        if let Some(blocks) = guarded(key, config.order_block.id(), || config.order_block.scan(candles, swings)) {
            found.extend(blocks.iter().map(|b| Signal::OrderBlock(OrderBlockEntry::from(b))));
        }
        if let Some(levels) = guarded(key, config.equal_level.id(), || config.equal_level.scan(candles, swings)) {
            found.extend(levels.iter().map(|l| Signal::EqualLevel(EqualLevelEntry::from(l))));
        }
        if let Some(setups) = guarded(key, config.setup.id(), || config.setup.scan(candles, swings)) {
            found.extend(setups.iter().map(|s| Signal::Setup(SetupEntry::from(s))));
        }

        let mut emitted = Vec::new();
        for signal in found {
            if cancel.is_cancelled() {
                log::debug!("{key}: cancelled mid-pass, remaining signals discarded");
                break;
            }
            match sink.upsert(&signal) {
                Upsert::Inserted => {
                    log::info!("{key}: {}", signal.describe());
                    emitted.push(signal);
                }
                Upsert::Updated => log::debug!("{key}: updated {}", signal.describe()),
                Upsert::Unchanged => {}
            }
        }
        emitted
    }

    fn announce(&self, signals: &[Signal]) -> usize {
        signals
            .iter()
            .filter(|s| self.dispatch(&format!("[{}] {}", self.key, s.describe())))
            .count()
    }

    fn dispatch(&self, message: &str) -> bool {
        let Some(sink) = &self.alerts else {
            return false;
        };
        match sink.deliver(message) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}: {e}", self.key);
                false
            }
        }
    }
}

/// Run one detector, turning a panic into a logged skip.
fn guarded<R>(key: &SessionKey, detector: DetectorId, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(out) => Some(out),
        Err(_) => {
            log::error!("{key}: {} detector panicked, skipped for this candle", detector.as_str());
            None
        }
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`Session`]
pub struct SessionBuilder {
    key: SessionKey,
    config: SessionConfig,
    alerts: Option<ChannelAlertSink>,
    thresholds: ThresholdAlerts,
}

impl SessionBuilder {
    pub fn new(symbol: impl Into<String>, granularity: Granularity) -> Self {
        Self::from_key(SessionKey::new(symbol, granularity))
    }

    pub fn from_key(key: SessionKey) -> Self {
        Self {
            key,
            config: SessionConfig::default(),
            alerts: None,
            thresholds: ThresholdAlerts::new(),
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Deliver alerts through `sink` on a background worker.
    ///
    /// The session only ever queues messages; a slow or failing sink never
    /// holds up candle processing.
    pub fn alert_sink(self, sink: impl AlertSink + 'static) -> Self {
        self.shared_alert_sink(Arc::new(sink))
    }

    /// Share one sink between several sessions, each with its own worker.
    pub fn shared_alert_sink(self, sink: Arc<dyn AlertSink>) -> Self {
        let (tx, _worker) = spawn_sink_worker(sink);
        self.alert_channel(tx)
    }

    /// Queue alerts straight onto an existing channel.
    pub fn alert_channel(mut self, tx: ChannelAlertSink) -> Self {
        self.alerts = Some(tx);
        self
    }

    pub fn price_alert(mut self, alert: PriceAlert) -> Self {
        self.thresholds.add(alert);
        self
    }

    pub fn build(self) -> Result<Session> {
        if self.key.symbol.trim().is_empty() {
            return Err(DetectError::InvalidConfig("symbol must not be empty".into()));
        }
        self.config.validate()?;

        log::info!("{}: session opened", self.key);
        Ok(Session {
            window: CandleWindow::new(self.config.window_capacity.get()),
            swings: SwingSet::default(),
            structure: StructureTracker::new(),
            sink: SignalSink::new(self.config.signal_capacity.get()),
            thresholds: self.thresholds,
            alerts: self.alerts,
            cancel: CancelHandle::default(),
            key: self.key,
            config: self.config,
        })
    }
}

// ============================================================
// MANAGER
// ============================================================

/// Holds the single active session and switches it on demand.
pub struct SessionManager {
    config: SessionConfig,
    alerts: Option<ChannelAlertSink>,
    active: Option<Session>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            alerts: None,
            active: None,
        }
    }

    /// One delivery worker serves every session this manager activates.
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        let (tx, _worker) = spawn_sink_worker(sink);
        self.alerts = Some(tx);
        self
    }

    /// Make `(symbol, granularity)` the active session.
    ///
    /// Re-activating the current key keeps its state. Any other key tears the
    /// previous session down first, so nothing carries across.
    pub fn activate(&mut self, symbol: &str, granularity: Granularity) -> Result<&mut Session> {
        let key = SessionKey::new(symbol, granularity);
        let keep = self
            .active
            .as_ref()
            .is_some_and(|s| s.key() == &key && !s.is_closed());
        if keep {
            return self.active.as_mut().ok_or(DetectError::SessionClosed);
        }

        if let Some(mut previous) = self.active.take() {
            previous.teardown();
        }

        let mut builder = SessionBuilder::from_key(key).config(self.config.clone());
        if let Some(tx) = &self.alerts {
            builder = builder.alert_channel(tx.clone());
        }
        let session = builder.build()?;
        Ok(self.active.insert(session))
    }

    /// Route a candle to the active session.
    pub fn process(&mut self, candle: Candle) -> Result<ProcessReport> {
        self.active
            .as_mut()
            .map(|s| s.process(candle))
            .ok_or(DetectError::SessionClosed)
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut Session> {
        self.active.as_mut()
    }

    /// Tear down and drop the active session, if any.
    pub fn deactivate(&mut self) {
        if let Some(mut session) = self.active.take() {
            session.teardown();
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ChannelAlertSink;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn zigzag(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = (if i % 2 == 0 { 100.0 } else { 102.0 }) + i as f64 * 0.5;
                Candle::new(60 * i as i64, base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect()
    }

    fn session() -> Session {
        SessionBuilder::new("R_10", Granularity::Min1).build().unwrap()
    }

    #[test]
    fn test_config_defaults_and_serde() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_capacity.get(), 100);
        assert_eq!(config.signal_capacity.get(), 10);

        let parsed: SessionConfig = serde_json::from_str(r#"{"window_capacity": 50}"#).unwrap();
        assert_eq!(parsed.window_capacity.get(), 50);
        assert_eq!(parsed.equal_level, EqualLevelDetector::default());

        let json = serde_json::to_string(&config).unwrap();
        let back: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_rejects_out_of_range() {
        let mut config = SessionConfig::default();
        config.signal_capacity = Period::new_const(5000);
        assert!(matches!(config.validate(), Err(DetectError::OutOfRange { .. })));

        assert!(serde_json::from_str::<SessionConfig>(r#"{"signal_capacity": 0}"#).is_err());
    }

    #[test]
    fn test_builder_rejects_empty_symbol() {
        assert!(matches!(
            SessionBuilder::new("  ", Granularity::Min1).build(),
            Err(DetectError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_process_drops_out_of_order() {
        let mut s = session();
        s.process(Candle::new(120, 1.0, 2.0, 0.5, 1.5));
        let report = s.process(Candle::new(60, 1.0, 2.0, 0.5, 1.5));
        assert!(report.update.is_dropped());
        assert_eq!(s.window().len(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent_and_final() {
        let mut s = session();
        for c in zigzag(10) {
            s.process(c);
        }
        s.teardown();
        s.teardown();
        assert!(s.is_closed());
        assert!(s.window().is_empty());

        let report = s.process(Candle::new(10_000, 1.0, 2.0, 0.5, 1.5));
        assert_eq!(report.update, WindowUpdate::Dropped(DropReason::SessionClosed));
        assert!(report.signals.is_empty());
    }

    #[test]
    fn test_cancel_handle_stops_emission() {
        let mut s = session();
        let handle = s.cancel_handle();
        handle.cancel();
        let report = s.process(Candle::new(0, 1.0, 2.0, 0.5, 1.5));
        assert!(report.update.is_dropped());
        assert!(s.is_closed());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut s = session();
        for c in zigzag(30) {
            s.process(c);
        }
        assert!(!s.swings().is_empty());

        s.reset();
        assert!(s.window().is_empty());
        assert!(s.swings().is_empty());
        assert!(s.signals().is_empty());
        assert_eq!(s.structure_state(), StructureState::None);
        assert_eq!(s.structure().broken_count(), 0);
    }

    #[test]
    fn test_load_history_matches_incremental_swings() {
        let candles = zigzag(40);
        let mut incremental = session();
        for c in &candles {
            incremental.process(*c);
        }
        let mut snapshot = session();
        snapshot.load_history(&candles);

        assert_eq!(snapshot.swings(), incremental.swings());
        assert_eq!(snapshot.window().len(), 40);
    }

    #[test]
    fn test_signals_are_alerted() {
        let (tx, rx) = mpsc::channel();
        let mut s = SessionBuilder::new("R_10", Granularity::Min1)
            .alert_channel(ChannelAlertSink::new(tx))
            .price_alert(PriceAlert::new("upper", 110.0))
            .build()
            .unwrap();

        let mut sent = 0;
        let mut emitted = 0;
        for c in zigzag(40) {
            let report = s.process(c);
            sent += report.alerts_sent;
            emitted += report.signals.len();
        }
        let messages: Vec<String> = rx.try_iter().collect();
        assert_eq!(messages.len(), sent);
        assert!(emitted > 0);
        assert!(messages.iter().any(|m| m.starts_with("Your upper price for R_10")));
        assert!(messages.iter().all(|m| m.starts_with("[R_10 1m]") || m.starts_with("Your ")));
    }

    #[test]
    fn test_failing_alert_sink_does_not_affect_detection() {
        let failing = |_: &str| -> Result<()> { Err(DetectError::AlertDelivery("offline".into())) };
        let mut quiet = session();
        let mut noisy = SessionBuilder::new("R_10", Granularity::Min1).alert_sink(failing).build().unwrap();

        for c in zigzag(40) {
            let a = quiet.process(c);
            let b = noisy.process(c);
            assert_eq!(a.signals, b.signals);
            assert_eq!(a.alerts_sent, 0);
        }
        assert_eq!(quiet.signals().len(), noisy.signals().len());
    }

    #[test]
    fn test_slow_alert_sink_does_not_delay_processing() {
        let slow = |_: &str| -> Result<()> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        };
        let mut s = SessionBuilder::new("R_10", Granularity::Min1).alert_sink(slow).build().unwrap();

        let mut worst = Duration::ZERO;
        let mut queued = 0;
        for c in zigzag(40) {
            let started = Instant::now();
            let report = s.process(c);
            worst = worst.max(started.elapsed());
            queued += report.alerts_sent;
        }
        assert!(queued > 0);
        assert!(worst < Duration::from_millis(250), "process blocked for {worst:?}");
    }

    #[test]
    fn test_cancel_mid_pass_suppresses_alerts() {
        let (tx, rx) = mpsc::channel();
        let mut s = SessionBuilder::new("R_10", Granularity::Min1)
            .alert_channel(ChannelAlertSink::new(tx))
            .price_alert(PriceAlert::new("upper", 200.0))
            .build()
            .unwrap();

        let mut last = None;
        for c in zigzag(40) {
            let report = s.process(c);
            if !report.signals.is_empty() {
                last = Some(report.signals);
            }
        }
        let pending = last.unwrap();
        let before = rx.try_iter().count();
        assert!(before > 0);

        // detectors already ran when the flag flips
        s.cancel_handle().cancel();
        let update = WindowUpdate::Appended { evicted: None };
        let report = s.finish(update, pending, 250.0);

        assert!(report.signals.is_empty());
        assert_eq!(report.alerts_sent, 0);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_panicking_detector_does_not_stop_others() {
        let key = SessionKey::new("R_10", Granularity::Min1);
        let config = SessionConfig::default();
        let candles = zigzag(12);

        let failed: Option<SwingSet> = guarded(&key, config.swing.id(), || panic!("corrupt window"));
        let blocks = guarded(&key, config.order_block.id(), || config.order_block.scan(&candles, &SwingSet::default()));

        assert!(failed.is_none());
        assert!(blocks.is_some());
    }

    #[test]
    fn test_config_from_flat_params() {
        let mut params = HashMap::new();
        params.insert("window_capacity", 50.0);
        params.insert("equal_level.tolerance", 0.001);
        params.insert("structure.cooldown_secs", 120.0);

        let config = SessionConfig::from_params(&params).unwrap();
        assert_eq!(config.window_capacity.get(), 50);
        assert_eq!(config.signal_capacity.get(), 10);
        assert_eq!(config.equal_level.tolerance.get(), 0.001);
        assert_eq!(config.structure.cooldown_secs.get(), 120);
        assert_eq!(config.swing, SwingDetector::default());

        params.insert("equal_level.tolerance", 0.5);
        assert!(SessionConfig::from_params(&params).is_err());

        params.remove("equal_level.tolerance");
        params.insert("equal_level.nope", 1.0);
        assert!(matches!(SessionConfig::from_params(&params), Err(DetectError::InvalidConfig(_))));

        params.remove("equal_level.nope");
        params.insert("volume.limit", 1.0);
        assert!(matches!(SessionConfig::from_params(&params), Err(DetectError::InvalidConfig(_))));
    }

    #[test]
    fn test_manager_switch_tears_down_previous() {
        let mut manager = SessionManager::new(SessionConfig::default());
        manager.activate("R_10", Granularity::Min1).unwrap();
        for c in zigzag(20) {
            manager.process(c).unwrap();
        }
        let handle = manager.active().unwrap().cancel_handle();

        // same key keeps state
        manager.activate("R_10", Granularity::Min1).unwrap();
        assert_eq!(manager.active().unwrap().window().len(), 20);

        let next = manager.activate("R_10", Granularity::Min5).unwrap();
        assert!(next.window().is_empty());
        assert!(next.swings().is_empty());
        assert!(handle.is_cancelled());

        manager.deactivate();
        assert!(matches!(manager.process(Candle::new(0, 1.0, 2.0, 0.5, 1.5)), Err(DetectError::SessionClosed)));
    }
}
