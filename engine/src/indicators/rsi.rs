//! RSI (Relative Strength Index) from Wilder's smoothed moving average

use crate::data::Candle;
use serde::{Deserialize, Serialize};

/// Wilder-smoothed averages of upward and downward candle moves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wsma {
    pub up: f64,
    pub down: f64,
}

impl Wsma {
    /// Seed from a single candle: the move goes to `up` or `down` by sign
    pub fn bootstrap(candle: &Candle) -> Self {
        let (up, down) = split_move(candle.change());
        Self { up, down }
    }
}

fn split_move(change: f64) -> (f64, f64) {
    if change >= 0.0 {
        (change, 0.0)
    } else {
        (0.0, -change)
    }
}

/// Next WSMA pair from the pair one candle earlier
pub fn next_wsma(previous: Option<&Wsma>, candle: &Candle, period: usize) -> Wsma {
    let previous = match previous {
        Some(previous) => previous,
        None => return Wsma::bootstrap(candle),
    };

    let weight = 1.0 / period as f64;
    let (up_move, down_move) = split_move(candle.change());

    Wsma {
        up: previous.up * (1.0 - weight) + weight * up_move,
        down: previous.down * (1.0 - weight) + weight * down_move,
    }
}

/// RSI from a WSMA pair; 50 when there is no downward movement to compare
pub fn rsi(wsma: &Wsma) -> f64 {
    if wsma.down == 0.0 {
        return 50.0;
    }
    100.0 - 100.0 / (1.0 + wsma.up / wsma.down)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(index: i64, open: f64, close: f64) -> Candle {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(index);
        Candle::one_minute(t, open, open.max(close), open.min(close), close).unwrap()
    }

    #[test]
    fn test_bootstrap_is_deterministic() {
        let down = candle(0, 10.0, 7.0);
        assert_eq!(next_wsma(None, &down, 14), Wsma { up: 0.0, down: 3.0 });
        assert_eq!(next_wsma(None, &down, 14), next_wsma(None, &down, 14));

        let up = candle(0, 10.0, 12.5);
        assert_eq!(next_wsma(None, &up, 14), Wsma { up: 2.5, down: 0.0 });
    }

    #[test]
    fn test_rsi_without_downward_moves_is_neutral() {
        assert_eq!(rsi(&Wsma { up: 3.0, down: 0.0 }), 50.0);
        assert_eq!(rsi(&Wsma { up: 0.0, down: 0.0 }), 50.0);
        assert_eq!(rsi(&Wsma { up: 1.0, down: 1.0 }), 50.0);
        assert!((rsi(&Wsma { up: 3.0, down: 1.0 }) - 75.0).abs() < 1e-12);
    }

    #[test]
    fn test_recurrence_matches_closed_form() {
        // one falling candle seeds down = d, then n rising candles of size u:
        // up_n = u * (1 - (1 - a)^n), down_n = d * (1 - a)^n with a = 1/N
        let period = 14;
        let (d, u) = (2.0, 1.0);
        let a = 1.0 / period as f64;

        let mut wsma = next_wsma(None, &candle(0, 100.0, 100.0 - d), period);
        for n in 1..=60 {
            let open = 100.0 + n as f64;
            wsma = next_wsma(Some(&wsma), &candle(n, open, open + u), period);

            let decay = (1.0 - a).powi(n as i32);
            let up = u * (1.0 - decay);
            let down = d * decay;
            assert!((wsma.up - up).abs() < 1e-9);
            assert!((wsma.down - down).abs() < 1e-9);
            assert!((rsi(&wsma) - (100.0 - 100.0 / (1.0 + up / down))).abs() < 1e-6);
        }
        assert!(rsi(&wsma) > 95.0);
    }
}
