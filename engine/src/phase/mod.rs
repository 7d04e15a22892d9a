//! Phase execution and the phase log

pub mod executor;
pub mod log;

pub use executor::*;
pub use log::*;
