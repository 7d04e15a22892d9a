//! Storage worker and CSV persistence

pub mod export;
pub mod worker;

pub use export::*;
pub use worker::*;
