//! Currency bot: the recursive scheduler and its results

pub mod currency_bot;
pub mod result;

pub use currency_bot::*;
pub use result::*;
