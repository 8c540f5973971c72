//! Alert dispatch and price threshold alerts
//!
//! Detection never waits on delivery: sinks either log, or hand the message to
//! a channel drained by a background worker. Failed deliveries are logged and
//! dropped, never retried.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::{DetectError, Result};

// ============================================================
// SINKS
// ============================================================

/// Receives one formatted message per newly emitted signal or crossed threshold.
pub trait AlertSink: Send + Sync {
  fn deliver(&self, message: &str) -> Result<()>;
}

impl<F> AlertSink for F
where
  F: Fn(&str) -> Result<()> + Send + Sync,
{
  fn deliver(&self, message: &str) -> Result<()> {
    self(message)
  }
}

/// Writes alerts to the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
  fn deliver(&self, message: &str) -> Result<()> {
    log::info!(target: "yamsd::alert", "{message}");
    Ok(())
  }
}

/// Non-blocking handoff to a receiver on another thread.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
  tx: Sender<String>,
}

impl ChannelAlertSink {
  pub fn new(tx: Sender<String>) -> Self {
    Self { tx }
  }
}

impl AlertSink for ChannelAlertSink {
  fn deliver(&self, message: &str) -> Result<()> {
    self.tx.send(message.to_owned()).map_err(|_| DetectError::AlertDelivery("alert receiver disconnected".into()))
  }
}

/// Spawn a thread that drains alerts into `deliver`.
///
/// The worker exits once every clone of the returned sink is dropped.
pub fn spawn_alert_worker<F>(mut deliver: F) -> (ChannelAlertSink, JoinHandle<()>)
where
  F: FnMut(&str) -> std::result::Result<(), String> + Send + 'static,
{
  let (tx, rx) = mpsc::channel::<String>();
  let handle = thread::spawn(move || {
    while let Ok(message) = rx.recv() {
      if let Err(e) = deliver(&message) {
        log::warn!("alert delivery failed: {e}");
      }
    }
    log::debug!("alert worker stopped");
  });
  (ChannelAlertSink::new(tx), handle)
}

/// Put any sink behind a channel so the caller only ever does a non-blocking send.
pub fn spawn_sink_worker(sink: Arc<dyn AlertSink>) -> (ChannelAlertSink, JoinHandle<()>) {
  spawn_alert_worker(move |message| sink.deliver(message).map_err(|e| e.to_string()))
}

// ============================================================
// PRICE THRESHOLD ALERTS
// ============================================================

/// One armed price level
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceAlert {
  pub label: String,
  pub threshold: f64,
  #[serde(skip)]
  fired: bool,
}

impl PriceAlert {
  pub fn new(label: impl Into<String>, threshold: f64) -> Self {
    Self { label: label.into(), threshold, fired: false }
  }

  #[inline]
  pub fn fired(&self) -> bool {
    self.fired
  }

  /// Thresholds that are non-finite or not positive never fire.
  #[inline]
  pub fn is_armed(&self) -> bool {
    !self.fired && self.threshold.is_finite() && self.threshold > 0.0
  }
}

/// Threshold alerts for one session, checked against each processed close.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ThresholdAlerts {
  alerts: Vec<PriceAlert>,
  #[serde(skip)]
  last_price: Option<f64>,
}

impl ThresholdAlerts {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add an alert; every alert is re-armed.
  pub fn add(&mut self, alert: PriceAlert) {
    self.alerts.push(alert);
    self.rearm();
  }

  /// Replace the alert at `index`; every alert is re-armed.
  pub fn update(&mut self, index: usize, alert: PriceAlert) -> Result<()> {
    let slot = self.alerts.get_mut(index).ok_or(DetectError::InvalidValue("no alert at that index"))?;
    *slot = alert;
    self.rearm();
    Ok(())
  }

  pub fn remove(&mut self, index: usize) -> Option<PriceAlert> {
    (index < self.alerts.len()).then(|| self.alerts.remove(index))
  }

  pub fn alerts(&self) -> &[PriceAlert] {
    &self.alerts
  }

  pub fn last_price(&self) -> Option<f64> {
    self.last_price
  }

  pub fn rearm(&mut self) {
    for alert in &mut self.alerts {
      alert.fired = false;
    }
  }

  /// Forget the previous price and re-arm everything.
  pub fn reset(&mut self) {
    self.last_price = None;
    self.rearm();
  }

  /// Feed the latest price and return one message per alert crossed since the previous price.
  ///
  /// The very first price only seeds the comparison.
  pub fn check(&mut self, symbol: &str, price: f64) -> Vec<String> {
    let mut messages = Vec::new();
    if let Some(last) = self.last_price {
      for alert in self.alerts.iter_mut().filter(|a| a.is_armed()) {
        let t = alert.threshold;
        let crossed = (last < t && price >= t) || (last > t && price <= t);
        if crossed {
          alert.fired = true;
          messages.push(format!(
            "Your {} price for {} has been crossed! Threshold: {}, Current Price: {}",
            alert.label, symbol, t, price
          ));
        }
      }
    }
    if price.is_finite() {
      self.last_price = Some(price);
    }
    messages
  }
}
