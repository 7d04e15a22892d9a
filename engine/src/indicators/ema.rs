//! EMA (Exponential Moving Average) recurrence

/// Smoothing factor `2 / (period + 1)`
pub fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Next EMA value from the previous one
pub fn next_ema(value: f64, previous: f64, period: usize) -> f64 {
    (value - previous) * ema_alpha(period) + previous
}
