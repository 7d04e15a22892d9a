//! Time alignment helpers for storage keys

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

/// Truncate to the start of the minute
pub fn align_to_minute(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::minutes(1)).unwrap_or(time)
}

/// Truncate to the whole second
pub fn align_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(Duration::seconds(1)).unwrap_or(time)
}

pub fn is_minute_aligned(time: DateTime<Utc>) -> bool {
    time.second() == 0 && time.nanosecond() == 0
}
