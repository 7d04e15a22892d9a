//! Time-keyed indicator repository

use crate::data::time::align_to_second;
use crate::error::EngineError;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Per-symbol store of snapshots keyed by exact second-aligned time
///
/// Symbols live in separate `DashMap` shards so the storage worker of one
/// symbol never blocks readers of another. When a retention window is set,
/// every write prunes the keys at or before `latest - retention`.
#[derive(Debug)]
pub struct Repository<T> {
    name: &'static str,
    entries: DashMap<String, BTreeMap<DateTime<Utc>, T>>,
    retention: Option<Duration>,
}

impl<T: Clone> Repository<T> {
    /// Create a repository that keeps everything
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            retention: None,
        }
    }

    /// Create a repository with sliding-window eviction
    pub fn with_retention(name: &'static str, retention: Option<Duration>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            retention,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Exact-key lookup
    pub fn get(&self, symbol: &str, time: DateTime<Utc>) -> Result<T> {
        self.try_get(symbol, time)
            .ok_or_else(|| EngineError::not_found(self.name, symbol, align_to_second(time)))
    }

    /// Exact-key lookup, `None` when absent
    pub fn try_get(&self, symbol: &str, time: DateTime<Utc>) -> Option<T> {
        let key = align_to_second(time);
        self.entries
            .get(symbol)
            .and_then(|series| series.get(&key).cloned())
    }

    /// Upsert a value, then prune outside the retention window
    pub fn add(&self, symbol: &str, time: DateTime<Utc>, value: T) {
        let key = align_to_second(time);
        let mut series = self.entries.entry(symbol.to_string()).or_default();
        series.insert(key, value);

        if let Some(retention) = self.retention {
            let latest = match series.keys().next_back() {
                Some(latest) => *latest,
                None => return,
            };
            // keys are whole seconds, so "after the horizon" starts one second later
            let keep_from = latest - retention + Duration::seconds(1);
            let kept = series.split_off(&keep_from);
            *series = kept;
        }
    }

    /// Latest entry for a symbol
    pub fn latest(&self, symbol: &str) -> Option<(DateTime<Utc>, T)> {
        self.entries
            .get(symbol)
            .and_then(|series| series.iter().next_back().map(|(k, v)| (*k, v.clone())))
    }

    /// Ordered keys for a symbol
    pub fn keys(&self, symbol: &str) -> Vec<DateTime<Utc>> {
        self.entries
            .get(symbol)
            .map(|series| series.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Ordered copy of a symbol's entries
    pub fn entries(&self, symbol: &str) -> Vec<(DateTime<Utc>, T)> {
        self.entries
            .get(symbol)
            .map(|series| series.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Number of entries stored for a symbol
    pub fn len(&self, symbol: &str) -> usize {
        self.entries.get(symbol).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.value().is_empty())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
