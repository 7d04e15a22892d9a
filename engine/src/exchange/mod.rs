//! Exchange integration module
//!
//! The [`ExchangeClient`] trait is the venue seam; [`PaperExchange`] fills
//! against any [`MarketFeed`], replayed or live.

pub mod client;
pub mod feed;
pub mod order;
pub mod paper;

pub use client::*;
pub use feed::*;
pub use order::*;
pub use paper::*;
