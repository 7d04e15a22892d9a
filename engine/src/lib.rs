//! Cryptobot engine: per-symbol trading bots on a shared indicator store
//!
//! This crate provides the runtime behind the `cryptobot` binary:
//! - an incremental indicator store (WSMA, RSI, MACD, mean average) fed once a
//!   minute by one storage worker per symbol
//! - a phase scheduler that runs the buy-the-dip strategy and forks itself
//!   while waiting for a green candle, with a single committer per family
//! - a paper exchange and replay feed so the same code backtests on logical time
//!
//! # Features
//!
//! - **Data Management**: 1-minute klines folded into N-minute candles
//! - **Technical Indicators**: Wilder smoothing, RSI, EMA, MACD, mean average
//! - **Strategy Engine**: polling phases on a pluggable clock
//! - **Backtesting**: replay of recorded candles with a result report
//! - **Persistence**: CSV export and restore of the indicator store
//!
//! # Example
//!
//! ```no_run
//! use cryptobot_engine::prelude::*;
//!
//! # async fn example(feed: ReplayFeed) -> Result<()> {
//! let runner = BacktestRunner::new(
//!     feed,
//!     IndicatorConfig::default(),
//!     StrategyConfig::default(),
//!     RiskConfig::default(),
//!     1000.0,
//! )?;
//! let report = runner.run(&[], &CancelScope::root()).await?;
//! println!("{}", report.format());
//! # Ok(())
//! # }
//! ```

pub mod backtest;
pub mod bot;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod notify;
pub mod phase;
pub mod polling;
pub mod provider;
pub mod storage;
pub mod strategy;

// Re-export commonly used types
pub mod prelude {
    pub use crate::backtest::*;
    pub use crate::bot::*;
    pub use crate::cancel::CancelScope;
    pub use crate::clock::*;
    pub use crate::config::*;
    pub use crate::data::*;
    pub use crate::error::EngineError;
    pub use crate::exchange::*;
    pub use crate::indicators::*;
    pub use crate::notify::*;
    pub use crate::phase::*;
    pub use crate::polling::*;
    pub use crate::provider::DataProvider;
    pub use crate::storage::*;
    pub use crate::strategy::*;

    pub use crate::Result;
}

/// Result type alias
pub type Result<T> = std::result::Result<T, error::EngineError>;
