//! Integration tests for swing, structure and order-block detection
//!
//! Detectors are driven both directly over a foreign bar type and through a
//! live [`Session`], the way a market-data feed would drive them.

use yamsd::prelude::*;

/// Bar type owned by the caller, not by the crate
#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
}

impl OHLCV for TestBar {
    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }

    fn time(&self) -> i64 {
        self.t
    }
}

fn bar(t: i64, o: f64, h: f64, l: f64, c: f64) -> TestBar {
    TestBar { t, o, h, l, c }
}

fn candle(t: i64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(t, (high + low) / 2.0, high, low, close)
}

/// Swing highs 100 at 1000 and 105 at 2000, then a close of 106 at 2100.
fn bullish_break() -> Vec<Candle> {
    vec![
        candle(940, 98.0, 96.0, 97.0),
        candle(1000, 100.0, 97.0, 99.0),
        candle(1060, 99.0, 95.0, 97.5),
        candle(1940, 101.0, 96.0, 99.5),
        candle(2000, 105.0, 98.0, 99.8),
        candle(2030, 102.0, 97.0, 99.0),
        candle(2060, 103.0, 98.0, 99.5),
        candle(2080, 101.0, 96.5, 99.0),
        candle(2100, 107.0, 99.0, 106.0),
        candle(2130, 108.0, 105.0, 107.0),
    ]
}

fn feed(session: &mut Session, candles: &[Candle]) -> Vec<Signal> {
    candles.iter().flat_map(|c| session.process(*c).signals).collect()
}

fn bos_entries(signals: &[Signal]) -> Vec<&StructureEntry> {
    signals
        .iter()
        .filter_map(|s| match s {
            Signal::Structure(e) if e.kind.is_bos() => Some(e),
            _ => None,
        })
        .collect()
}

// ============================================================
// SWINGS
// ============================================================

#[test]
fn test_swings_over_foreign_bar_type() {
    let closes = [10.0, 12.0, 11.0, 13.0, 9.0];
    let bars: Vec<TestBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(60 * i as i64, c, c + 0.5, c - 0.5, c))
        .collect();

    let swings = SwingDetector::with_defaults().detect(&bars);

    let high_idx: Vec<usize> = swings.highs.iter().map(|s| s.index).collect();
    let low_idx: Vec<usize> = swings.lows.iter().map(|s| s.index).collect();
    assert_eq!(high_idx, vec![1, 3]);
    assert_eq!(low_idx, vec![2]);
    assert_eq!(swings.highs[1].price, 13.5);
    assert_eq!(swings.highs[1].time(), 180);
}

#[test]
fn test_session_swings_follow_window() {
    let mut session = SessionBuilder::new("R_10", Granularity::Min1).build().unwrap();
    feed(&mut session, &bullish_break());

    let highs: Vec<i64> = session.swings().highs.iter().map(|s| s.time()).collect();
    assert_eq!(highs, vec![1000, 2000, 2060]);
    let lows: Vec<i64> = session.swings().lows.iter().map(|s| s.time()).collect();
    assert_eq!(lows, vec![1060, 2030, 2080]);
}

// ============================================================
// BREAK OF STRUCTURE
// ============================================================

#[test]
fn test_bullish_bos_through_session() {
    let mut session = SessionBuilder::new("R_10", Granularity::Min1).build().unwrap();
    let candles = bullish_break();

    let emitted = feed(&mut session, &candles[..9]);
    let bos = bos_entries(&emitted);
    assert_eq!(bos.len(), 1);
    assert_eq!(bos[0].label, "BOS (Bullish)");
    assert_eq!(bos[0].epoch, 2100);
    assert_eq!(bos[0].broken_swing.as_ref().map(|s| s.epoch), Some(2000));
    assert_eq!(session.structure_state(), StructureState::BosUp);

    // the next close above 105 does not break the same swing again
    let report = session.process(candles[9]);
    assert!(bos_entries(&report.signals).is_empty());
    assert_eq!(session.signals().bos.len(), 1);
    assert!(session.signals().choch.is_empty());
}

#[test]
fn test_bos_describe_names_both_candles() {
    let mut session = SessionBuilder::new("R_10", Granularity::Min1).build().unwrap();
    let emitted = feed(&mut session, &bullish_break());
    let bos = emitted.iter().find(|s| matches!(s, Signal::Structure(_))).unwrap();

    let text = bos.describe();
    assert!(text.starts_with("BOS (Bullish) at 1970-01-01 00:35"));
    assert!(text.contains("reference swing 1970-01-01 00:33"));
}

#[test]
fn test_history_snapshot_is_not_reannounced() {
    let candles = bullish_break();
    let mut session = SessionBuilder::new("R_10", Granularity::Min1).build().unwrap();

    let first = session.load_history(&candles);
    assert_eq!(bos_entries(&first).len(), 1);

    let again = session.load_history(&candles);
    assert!(bos_entries(&again).is_empty());
    assert_eq!(session.signals().bos.len(), 1);
}

// ============================================================
// ORDER BLOCKS
// ============================================================

#[test]
fn test_order_block_over_foreign_bar_type() {
    let bars = vec![
        bar(0, 10.0, 10.5, 9.5, 9.8),
        bar(60, 10.0, 10.4, 9.9, 10.3),
        bar(120, 10.7, 11.5, 10.6, 11.4),
        bar(180, 11.4, 11.6, 10.4, 10.5),
    ];
    let blocks = OrderBlockDetector::with_defaults().scan(&bars, &SwingSet::default());

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].direction, Direction::Bullish);
    assert_eq!(blocks[0].candle.time, 0);
    assert!(blocks[0].revisited);
}

#[test]
fn test_order_block_emitted_once_per_session() {
    let mut session = SessionBuilder::new("R_10", Granularity::Min1).build().unwrap();
    let candles = vec![
        Candle::new(0, 10.0, 10.5, 9.5, 9.8),
        Candle::new(60, 10.0, 10.4, 9.9, 10.3),
        Candle::new(120, 10.7, 11.5, 10.6, 11.4),
        Candle::new(180, 11.4, 11.8, 11.2, 11.6),
    ];

    let emitted = feed(&mut session, &candles);
    let blocks: Vec<&OrderBlockEntry> = emitted
        .iter()
        .filter_map(|s| match s {
            Signal::OrderBlock(e) => Some(e),
            _ => None,
        })
        .collect();

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].label, "Bullish Order Block");
    assert_eq!(session.signals().order_blocks.len(), 1);
}

// ============================================================
// SESSIONS
// ============================================================

#[test]
fn test_switching_session_starts_clean() {
    let mut manager = SessionManager::new(SessionConfig::default());
    manager.activate("R_10", Granularity::Min1).unwrap();
    for c in bullish_break() {
        manager.process(c).unwrap();
    }
    assert_eq!(manager.active().unwrap().signals().bos.len(), 1);

    let next = manager.activate("R_25", Granularity::Min1).unwrap();
    assert_eq!(next.key().to_string(), "R_25 1m");
    assert!(next.signals().is_empty());
    assert_eq!(next.structure_state(), StructureState::None);
    assert_eq!(next.structure().broken_count(), 0);

    // the same candles break structure again in the new session
    let mut bos = 0;
    for c in bullish_break() {
        bos += bos_entries(&manager.process(c).unwrap().signals).len();
    }
    assert_eq!(bos, 1);
}

#[test]
fn test_replay_parallel_matches_incremental() {
    let up = bullish_break();
    let mirrored: Vec<Candle> = up
        .iter()
        .map(|c| Candle::new(c.time, 200.0 - c.open, 200.0 - c.low, 200.0 - c.high, 200.0 - c.close))
        .collect();

    let config = SessionConfig::default();
    let histories = vec![
        (SessionKey::new("R_10", Granularity::Min1), up.as_slice()),
        (SessionKey::new("R_25", Granularity::Min1), mirrored.as_slice()),
    ];
    let (results, errors) = replay_parallel(&config, histories);
    assert!(errors.is_empty());
    assert_eq!(results.len(), 2);

    for (result, candles) in results.iter().zip([&up, &mirrored]) {
        let mut session = SessionBuilder::from_key(result.key.clone()).build().unwrap();
        let emitted = feed(&mut session, candles);
        assert_eq!(result.emitted, emitted.len());
        let expected: Vec<&StructureEntry> = session.signals().bos.iter().collect();
        let got: Vec<&StructureEntry> = result.signals.bos.iter().collect();
        assert_eq!(got, expected);
    }

    let bearish = results[1].signals.bos.latest().unwrap();
    assert_eq!(bearish.label, "BOS (Bearish)");
}
