use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use common::Bar;

/// Warm-up state of a buffer relative to a strategy window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    /// Fewer bars than the window.
    Warming,
    /// At least `window` bars. Never left once reached, since bars are only
    /// ever evicted to make room for newer ones.
    Ready,
}

/// Bounded, time-ordered, deduplicated bar cache for one symbol.
///
/// Keyed by bar time, so ingesting a bar whose time is already present
/// replaces it (newest write wins) and iteration is always ascending.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    symbol: String,
    capacity: usize,
    bars: BTreeMap<DateTime<Utc>, Bar>,
}

impl RollingBuffer {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            capacity: capacity.max(1),
            bars: BTreeMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Merge `bars` into the buffer and evict the oldest entries beyond
    /// capacity. Bars for another symbol are skipped. Returns how many
    /// timestamps were not present before.
    ///
    /// Ingesting the same batch twice leaves the buffer as after the first.
    pub fn ingest<I>(&mut self, bars: I) -> usize
    where
        I: IntoIterator<Item = Bar>,
    {
        let mut added = 0;
        for bar in bars {
            if bar.symbol != self.symbol {
                warn!(buffer = %self.symbol, bar = %bar.symbol, "Skipping bar for another symbol");
                continue;
            }
            if self.bars.insert(bar.time, bar).is_none() {
                added += 1;
            }
        }
        while self.bars.len() > self.capacity {
            self.bars.pop_first();
        }
        added
    }

    /// Time of the newest bar held.
    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.bars.keys().next_back().copied()
    }

    pub fn state(&self, window: usize) -> BufferState {
        match self.bars.len() {
            0 => BufferState::Empty,
            n if n < window => BufferState::Warming,
            _ => BufferState::Ready,
        }
    }

    /// Copy of the contents, ascending by time.
    pub fn snapshot(&self) -> Vec<Bar> {
        self.bars.values().cloned().collect()
    }
}
