//! Price/RSI samples and the sliding-window lookback queue

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One sampled point of the entry signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAndRsi {
    pub price: f64,
    pub rsi: f64,
    pub time: DateTime<Utc>,
}

/// Bounded FIFO of earlier samples, owned by exactly one bot generation
///
/// Forking clones the queue; branches never share one.
#[derive(Debug, Clone)]
pub struct SignalQueue {
    capacity: usize,
    age_threshold: Duration,
    samples: VecDeque<PriceAndRsi>,
}

impl SignalQueue {
    pub fn new(capacity: usize, age_threshold: Duration) -> Self {
        Self {
            capacity,
            age_threshold,
            samples: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append, evicting the oldest sample once over capacity
    pub fn enqueue(&mut self, sample: PriceAndRsi) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// First stored sample with a lower RSI and a higher price than
    /// `sample`, taken more than the age threshold earlier
    pub fn find_older_higher_rsi_lower_price(&self, sample: &PriceAndRsi) -> Option<PriceAndRsi> {
        let cutoff = sample.time - self.age_threshold;
        self.samples
            .iter()
            .find(|stored| stored.rsi < sample.rsi && stored.price > sample.price && stored.time < cutoff)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceAndRsi> {
        self.samples.iter()
    }
}
