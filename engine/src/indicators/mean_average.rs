//! Running mean average of candle closes

/// Next mean average; the first observation seeds the average with the close
pub fn next_mean_average(previous: Option<f64>, close: f64, period: usize) -> f64 {
    match previous {
        Some(previous) => {
            let n = period as f64;
            (previous * (n - 1.0) + close) / n
        }
        None => close,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_seeds_close() {
        assert_eq!(next_mean_average(None, 42.5, 20), 42.5);
    }

    #[test]
    fn test_converges_to_closed_form() {
        // avg_n = c + (c0 - c) * ((N - 1) / N)^n
        let (c0, c, period) = (120.0, 100.0, 20usize);
        let mut avg = next_mean_average(None, c0, period);
        for n in 1..=40 {
            avg = next_mean_average(Some(avg), c, period);
            let expected = c + (c0 - c) * ((period as f64 - 1.0) / period as f64).powi(n);
            assert!((avg - expected).abs() < 1e-9);
        }
    }
}
