//! Named counters.

use std::collections::HashMap;

use parking_lot::Mutex;

pub const CHECKPOINT_LOAD: &str = "beacon.config.checkpoint.load";
pub const CACHE_LOAD: &str = "beacon.config.cache.load";
pub const STREAM_START: &str = "beacon.config.stream.start";
pub const UPSERT: &str = "beacon.config.upsert";

pub trait StatsSink: Send + Sync {
    fn increment(&self, name: &str);
}

/// Discards every counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn increment(&self, _name: &str) {}
}

/// Keeps counts in memory; handy for hosts that scrape periodically.
#[derive(Debug, Default)]
pub struct MemoryStats {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.lock().clone()
    }
}

impl StatsSink for MemoryStats {
    fn increment(&self, name: &str) {
        *self.counts.lock().entry(name.to_string()).or_insert(0) += 1;
    }
}
