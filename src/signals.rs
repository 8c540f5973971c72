//! Signal entries and the capped, deduplicated sink they are emitted into
//!
//! Every list is most-recent-first and never holds more than its capacity.
//! Keys stay remembered after eviction so a signal that scrolled out is not
//! re-announced when a later pass rediscovers it.

use std::collections::{HashSet, VecDeque};

use crate::detectors::{
  EqualLevel, LevelKind, OrderBlock, RetestStatus, Setup, StructureEvent, StructureKind, SwingPoint,
};
use crate::Candle;

// ============================================================
// FORMATTING
// ============================================================

/// `YYYY-MM-DD` in UTC
pub fn format_date(epoch: i64) -> String {
  chrono::DateTime::from_timestamp(epoch, 0)
    .map(|dt| dt.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| epoch.to_string())
}

/// `HH:MM` in UTC, 24-hour clock
pub fn format_time(epoch: i64) -> String {
  chrono::DateTime::from_timestamp(epoch, 0)
    .map(|dt| dt.format("%H:%M").to_string())
    .unwrap_or_else(|| epoch.to_string())
}

fn format_stamp(epoch: i64) -> String {
  format!("{} {}", format_date(epoch), format_time(epoch))
}

// ============================================================
// KEYS AND ENTRIES
// ============================================================

/// Identity of an entry within its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalKey {
  pub time: i64,
  pub tag: &'static str,
  /// Second timestamp for pair signals, 0 otherwise
  pub reference: i64,
}

/// Anything the sink can hold.
pub trait SignalEntry: Clone + PartialEq {
  fn key(&self) -> SignalKey;

  /// One-line human readable message, used for alerts.
  fn describe(&self) -> String;
}

/// A candle reference as shown next to a structure signal.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SwingRef {
  pub date: String,
  pub time: String,
  pub high: f64,
  pub low: f64,
  pub epoch: i64,
}

impl From<&Candle> for SwingRef {
  fn from(c: &Candle) -> Self {
    Self { date: format_date(c.time), time: format_time(c.time), high: c.high, low: c.low, epoch: c.time }
  }
}

impl From<&SwingPoint> for SwingRef {
  fn from(s: &SwingPoint) -> Self {
    SwingRef::from(&s.candle)
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StructureEntry {
  #[serde(skip)]
  pub kind: StructureKind,
  #[serde(rename = "type")]
  pub label: &'static str,
  pub date: String,
  pub time: String,
  pub high: f64,
  pub low: f64,
  pub epoch: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub broken_swing: Option<SwingRef>,
}

impl From<&StructureEvent> for StructureEntry {
  fn from(event: &StructureEvent) -> Self {
    let c = &event.candle;
    Self {
      kind: event.kind,
      label: event.kind.label(),
      date: format_date(c.time),
      time: format_time(c.time),
      high: c.high,
      low: c.low,
      epoch: c.time,
      broken_swing: Some(SwingRef::from(&event.reference)),
    }
  }
}

impl SignalEntry for StructureEntry {
  fn key(&self) -> SignalKey {
    SignalKey { time: self.epoch, tag: self.label, reference: 0 }
  }

  fn describe(&self) -> String {
    match &self.broken_swing {
      Some(swing) => format!(
        "{} at {} {} (high {}, low {}), reference swing {} {} (high {}, low {})",
        self.label, self.date, self.time, self.high, self.low, swing.date, swing.time, swing.high, swing.low
      ),
      None => format!("{} at {} {} (high {}, low {})", self.label, self.date, self.time, self.high, self.low),
    }
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EqualLevelEntry {
  #[serde(flatten)]
  pub level: EqualLevel,
  pub current_swing: String,
  pub previous_swing: String,
  pub root_swing_time: String,
}

impl From<&EqualLevel> for EqualLevelEntry {
  fn from(level: &EqualLevel) -> Self {
    Self {
      level: *level,
      current_swing: format_stamp(level.current_time),
      previous_swing: format_stamp(level.previous_time),
      root_swing_time: format_stamp(level.root_time),
    }
  }
}

impl EqualLevelEntry {
  #[inline]
  pub fn kind(&self) -> LevelKind {
    self.level.kind
  }

  #[inline]
  pub fn status(&self) -> RetestStatus {
    self.level.status
  }
}

impl SignalEntry for EqualLevelEntry {
  fn key(&self) -> SignalKey {
    SignalKey { time: self.level.current_time, tag: self.level.kind.label(), reference: self.level.previous_time }
  }

  fn describe(&self) -> String {
    let l = &self.level;
    format!(
      "{} at {} ({} vs {} @ {}, {}), root {} @ {}, breakout: {}, retest: {}, status: {}",
      l.kind.label(),
      l.level,
      self.current_swing,
      l.previous_price,
      self.previous_swing,
      l.proximity.label(),
      l.root_price,
      self.root_swing_time,
      l.breakout,
      l.retest,
      l.status.label()
    )
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OrderBlockEntry {
  #[serde(flatten)]
  pub block: OrderBlock,
  #[serde(rename = "type")]
  pub label: &'static str,
  pub date: String,
}

impl From<&OrderBlock> for OrderBlockEntry {
  fn from(block: &OrderBlock) -> Self {
    Self { block: *block, label: block.label(), date: format_date(block.candle.time) }
  }
}

impl SignalEntry for OrderBlockEntry {
  fn key(&self) -> SignalKey {
    SignalKey { time: self.block.candle.time, tag: self.label, reference: 0 }
  }

  fn describe(&self) -> String {
    let c = &self.block.candle;
    format!(
      "{} at {} (open {}, high {}, low {}, close {})",
      self.label,
      format_stamp(c.time),
      c.open,
      c.high,
      c.low,
      c.close
    )
  }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SetupEntry {
  #[serde(flatten)]
  pub setup: Setup,
  #[serde(rename = "type")]
  pub label: &'static str,
  pub time: String,
}

impl From<&Setup> for SetupEntry {
  fn from(setup: &Setup) -> Self {
    Self { setup: *setup, label: setup.label(), time: format_stamp(setup.bos_candle.time) }
  }
}

impl SignalEntry for SetupEntry {
  fn key(&self) -> SignalKey {
    SignalKey { time: self.setup.bos_candle.time, tag: self.label, reference: 0 }
  }

  fn describe(&self) -> String {
    format!(
      "{} at {}, order block {}, retest zone {}, status: {}",
      self.label,
      self.time,
      format_stamp(self.setup.order_block.time),
      self.setup.retest_zone,
      self.setup.status.label()
    )
  }
}

/// A newly emitted signal of any family
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Signal {
  Structure(StructureEntry),
  EqualLevel(EqualLevelEntry),
  OrderBlock(OrderBlockEntry),
  Setup(SetupEntry),
}

impl Signal {
  pub fn describe(&self) -> String {
    match self {
      Signal::Structure(e) => e.describe(),
      Signal::EqualLevel(e) => e.describe(),
      Signal::OrderBlock(e) => e.describe(),
      Signal::Setup(e) => e.describe(),
    }
  }

  pub fn key(&self) -> SignalKey {
    match self {
      Signal::Structure(e) => e.key(),
      Signal::EqualLevel(e) => e.key(),
      Signal::OrderBlock(e) => e.key(),
      Signal::Setup(e) => e.key(),
    }
  }
}

// ============================================================
// SIGNAL LIST
// ============================================================

/// Result of [`SignalList::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
  /// New key, stored at the front
  Inserted,
  /// Known key still in the list, contents changed
  Updated,
  /// Identical entry, or a key that was already evicted
  Unchanged,
}

#[derive(Debug, Clone)]
pub struct SignalList<T> {
  entries: VecDeque<T>,
  seen: HashSet<SignalKey>,
  capacity: usize,
}

impl<T: SignalEntry> SignalList<T> {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self { entries: VecDeque::with_capacity(capacity + 1), seen: HashSet::new(), capacity }
  }

  pub fn upsert(&mut self, entry: T) -> Upsert {
    let key = entry.key();
    if let Some(existing) = self.entries.iter_mut().find(|e| e.key() == key) {
      if *existing == entry {
        return Upsert::Unchanged;
      }
      *existing = entry;
      return Upsert::Updated;
    }
    if !self.seen.insert(key) {
      return Upsert::Unchanged;
    }
    self.entries.push_front(entry);
    self.entries.truncate(self.capacity);
    Upsert::Inserted
  }

  /// Drop remembered keys older than `epoch`; stored entries are kept.
  pub fn forget_before(&mut self, epoch: i64) {
    self.seen.retain(|k| k.time >= epoch);
  }

  /// Most recent first
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.entries.iter()
  }

  pub fn latest(&self) -> Option<&T> {
    self.entries.front()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.seen.clear();
  }
}

impl<T: serde::Serialize> serde::Serialize for SignalList<T> {
  fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(self.entries.iter())
  }
}

// ============================================================
// SIGNAL SINK
// ============================================================

/// Every list a session exposes to the UI and alerting collaborators.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SignalSink {
  pub bos: SignalList<StructureEntry>,
  pub choch: SignalList<StructureEntry>,
  pub eqh: SignalList<EqualLevelEntry>,
  pub eql: SignalList<EqualLevelEntry>,
  pub order_blocks: SignalList<OrderBlockEntry>,
  pub setups: SignalList<SetupEntry>,
}

impl SignalSink {
  pub fn new(capacity: usize) -> Self {
    Self {
      bos: SignalList::new(capacity),
      choch: SignalList::new(capacity),
      eqh: SignalList::new(capacity),
      eql: SignalList::new(capacity),
      order_blocks: SignalList::new(capacity),
      setups: SignalList::new(capacity),
    }
  }

  /// Route an entry to its list.
  pub fn upsert(&mut self, signal: &Signal) -> Upsert {
    match signal {
      Signal::Structure(e) if e.kind.is_bos() => self.bos.upsert(e.clone()),
      Signal::Structure(e) => self.choch.upsert(e.clone()),
      Signal::EqualLevel(e) => match e.kind() {
        LevelKind::EqualHigh => self.eqh.upsert(e.clone()),
        LevelKind::EqualLow => self.eql.upsert(e.clone()),
      },
      Signal::OrderBlock(e) => self.order_blocks.upsert(e.clone()),
      Signal::Setup(e) => self.setups.upsert(e.clone()),
    }
  }

  pub fn forget_before(&mut self, epoch: i64) {
    self.bos.forget_before(epoch);
    self.choch.forget_before(epoch);
    self.eqh.forget_before(epoch);
    self.eql.forget_before(epoch);
    self.order_blocks.forget_before(epoch);
    self.setups.forget_before(epoch);
  }

  pub fn len(&self) -> usize {
    self.bos.len() + self.choch.len() + self.eqh.len() + self.eql.len() + self.order_blocks.len() + self.setups.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&mut self) {
    self.bos.clear();
    self.choch.clear();
    self.eqh.clear();
    self.eql.clear();
    self.order_blocks.clear();
    self.setups.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Direction;

  fn block(time: i64) -> OrderBlockEntry {
    OrderBlockEntry::from(&OrderBlock {
      direction: Direction::Bullish,
      candle: Candle::new(time, 10.0, 10.0, 8.8, 9.0),
      revisited: false,
    })
  }

  #[test]
  fn test_format_date_time() {
    assert_eq!(format_date(1_700_000_000), "2023-11-14");
    assert_eq!(format_time(1_700_000_000), "22:13");
    assert_eq!(format_time(0), "00:00");
  }

  #[test]
  fn test_list_is_most_recent_first_and_capped() {
    let mut list = SignalList::new(3);
    for t in 0..5 {
      assert_eq!(list.upsert(block(t * 60)), Upsert::Inserted);
    }
    let times: Vec<i64> = list.iter().map(|e| e.block.candle.time).collect();
    assert_eq!(times, vec![240, 180, 120]);
  }

  #[test]
  fn test_duplicate_and_update() {
    let mut list = SignalList::new(10);
    assert_eq!(list.upsert(block(60)), Upsert::Inserted);
    assert_eq!(list.upsert(block(60)), Upsert::Unchanged);

    let mut revisited = block(60);
    revisited.block.revisited = true;
    assert_eq!(list.upsert(revisited), Upsert::Updated);
    assert_eq!(list.len(), 1);
    assert!(list.latest().unwrap().block.revisited);
  }

  #[test]
  fn test_evicted_key_not_reinserted() {
    let mut list = SignalList::new(1);
    list.upsert(block(60));
    list.upsert(block(120));
    assert_eq!(list.upsert(block(60)), Upsert::Unchanged);
    assert_eq!(list.latest().unwrap().block.candle.time, 120);

    list.forget_before(100);
    assert_eq!(list.upsert(block(60)), Upsert::Inserted);
  }

  #[test]
  fn test_sink_serializes_lists_as_arrays() {
    let mut sink = SignalSink::new(10);
    sink.upsert(&Signal::OrderBlock(block(0)));
    let json = serde_json::to_value(&sink).unwrap();

    let blocks = json["order_blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["type"], "Bullish Order Block");
    assert_eq!(blocks[0]["date"], "1970-01-01");
    assert!(json["bos"].as_array().unwrap().is_empty());
  }
}
