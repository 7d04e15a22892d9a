//! Engine error type

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cooperative cancellation reached a suspension point
    #[error("operation cancelled")]
    Cancelled,

    #[error("{repository} has no entry for {symbol} at {time}")]
    NotFound {
        repository: &'static str,
        symbol: String,
        time: DateTime<Utc>,
    },

    #[error("market data for {symbol} ends before {time}")]
    DataExhausted { symbol: String, time: DateTime<Utc> },

    #[error("{label} timed out after {iterations} polls")]
    TimedOut { label: String, iterations: u32 },

    #[error("invalid candle: {0}")]
    InvalidCandle(String),

    #[error("configuration rejected: {0}")]
    Config(String),

    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("order {order_id} for {symbol} was not filled")]
    OrderNotFilled { symbol: String, order_id: String },

    #[error("insufficient {asset} balance: need {needed:.8}, have {available:.8}")]
    InsufficientBalance {
        asset: String,
        needed: f64,
        available: f64,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// True for the cooperative cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True for faults worth retrying on idempotent reads
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Exchange(_))
    }

    /// Logical time the failure refers to, when it carries one
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::NotFound { time, .. } | Self::DataExhausted { time, .. } => Some(*time),
            _ => None,
        }
    }

    pub fn not_found(repository: &'static str, symbol: &str, time: DateTime<Utc>) -> Self {
        Self::NotFound {
            repository,
            symbol: symbol.to_string(),
            time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::Cancelled.is_transient());
        assert!(EngineError::Exchange("502".into()).is_transient());
        assert!(!EngineError::Config("bad".into()).is_transient());
    }
}
