//! Bounded per-(pool, protocol) tick history.
//!
//! Each history is a fixed-capacity ring buffer: once full, appending a tick
//! overwrites the oldest one in place. Every append recomputes the volatility
//! summary, so the stored score always reflects the current window.

use alloy::primitives::Address;
use arrayvec::ArrayVec;
use guardian_chain::PoolId;
use smallvec::SmallVec;
use std::collections::HashMap;

use crate::volatility;

/// Maximum ticks retained per history.
pub const HISTORY_CAPACITY: usize = 100;

/// Composite key of a history: (pool, protocol).
pub type HistoryKey = (PoolId, Address);

/// Recent ticks for one (pool, protocol) pair plus their volatility summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickHistory {
    ticks: ArrayVec<i32, HISTORY_CAPACITY>,
    /// Slot holding the oldest tick once the buffer is full
    head: usize,
    last_update_timestamp: u64,
    volatility_score: u8,
    average_tick_movement: u64,
}

impl TickHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tick observed at `timestamp` and refresh the volatility summary.
    pub fn record(&mut self, tick: i32, timestamp: u64) {
        if self.ticks.is_full() {
            self.ticks[self.head] = tick;
            self.head = (self.head + 1) % HISTORY_CAPACITY;
        } else {
            self.ticks.push(tick);
        }
        self.last_update_timestamp = timestamp;

        let estimate = volatility::estimate(self);
        self.volatility_score = estimate.score;
        self.average_tick_movement = estimate.average_tick_movement;
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Ticks oldest first.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let (newer, older) = self.ticks.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// The most recent `n` ticks, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = i32> + '_ {
        self.iter().skip(self.len().saturating_sub(n))
    }

    pub fn last_update_timestamp(&self) -> u64 {
        self.last_update_timestamp
    }

    pub fn volatility_score(&self) -> u8 {
        self.volatility_score
    }

    pub fn average_tick_movement(&self) -> u64 {
        self.average_tick_movement
    }
}

/// All tick histories owned by an engine, indexed by pool.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    histories: HashMap<HistoryKey, TickHistory>,
    pool_protocols: HashMap<PoolId, SmallVec<[Address; 4]>>,
}

impl HistoryStore {
    pub fn get(&self, key: &HistoryKey) -> Option<&TickHistory> {
        self.histories.get(key)
    }

    /// Store a history, registering its protocol under the pool.
    pub fn insert(&mut self, key: HistoryKey, history: TickHistory) {
        let protocols = self.pool_protocols.entry(key.0).or_default();
        if !protocols.contains(&key.1) {
            protocols.push(key.1);
        }
        self.histories.insert(key, history);
    }

    /// Protocols that have recorded history for `pool_id`.
    pub fn protocols(&self, pool_id: &PoolId) -> &[Address] {
        self.pool_protocols
            .get(pool_id)
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }
}
