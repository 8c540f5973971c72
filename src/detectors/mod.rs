//! Market-structure detectors
//!
//! # Detector Families
//!
//! - **Swing**: 3-candle local extrema, recomputed over the full window
//! - **Structure**: BOS / CHoCH state machine over the swing view
//! - **Order block**: displacement-gap triples, independent of swings
//! - **Equal level**: EQH / EQL pairs with violation, breakout and retest
//! - **Setup**: four-candle "S" setups with order-block retest

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod equal_level;
pub mod order_block;
pub mod setup;
pub mod structure;
pub mod swing;

impl_with_defaults!(
  SwingDetector,
  StructureDetector,
  OrderBlockDetector,
  EqualLevelDetector,
  SetupDetector,
);

// Re-export all detectors for convenience
pub use equal_level::*;
pub use helpers::*;
pub use order_block::*;
pub use setup::*;
pub use structure::*;
pub use swing::*;
