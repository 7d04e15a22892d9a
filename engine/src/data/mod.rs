//! Data management module
//!
//! Candles, time keys and the per-symbol indicator repository.

pub mod candle;
pub mod repository;
pub mod store;
pub mod time;

pub use candle::*;
pub use repository::*;
pub use store::*;
pub use time::*;
