//! Incremental indicator updaters
//!
//! Each updater is a pure function producing the next snapshot from the
//! snapshot one candle earlier plus the new candle. When no earlier snapshot
//! exists the documented bootstrap value is used instead.

pub mod ema;
pub mod macd;
pub mod mean_average;
pub mod rsi;

pub use ema::*;
pub use macd::*;
pub use mean_average::*;
pub use rsi::*;
