//! Strategy building blocks
//!
//! Entry-signal samples, the lookback queue and the validators the phase
//! executor consults.

pub mod signal;
pub mod validator;

pub use signal::*;
pub use validator::*;
