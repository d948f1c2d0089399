//! Engine-owned state and per-invocation staging.
//!
//! A mutating invocation never writes to [`EngineStore`] directly. It reads
//! through a [`Txn`], which keeps modified copies of the records it touches
//! together with the events they produce, and is folded into the store in
//! one step once the whole invocation has succeeded. Dropping a `Txn`
//! discards everything it staged.

use alloy::primitives::{Address, B256};
use guardian_chain::PoolId;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

use crate::events::EngineEvent;
use crate::history::{HistoryKey, HistoryStore, TickHistory};
use crate::position::{PoolPosition, PositionRecord};
use crate::registry::AdapterRegistry;

#[derive(Debug, Default)]
pub struct EngineStore {
    pub registry: AdapterRegistry,
    pub liquidators: HashSet<Address>,
    pub histories: HistoryStore,
    pub pool_positions: HashMap<HistoryKey, PoolPosition>,
    pub positions: HashMap<B256, PositionRecord>,
}

#[derive(Debug, Default)]
pub struct Txn {
    histories: HashMap<HistoryKey, TickHistory>,
    pool_positions: HashMap<HistoryKey, PoolPosition>,
    positions: HashMap<B256, PositionRecord>,
    events: Vec<EngineEvent>,
}

impl Txn {
    /// Staged copy of a history, created from the committed one on first use.
    pub fn history_mut(&mut self, store: &EngineStore, key: HistoryKey) -> &mut TickHistory {
        self.histories
            .entry(key)
            .or_insert_with(|| store.histories.get(&key).cloned().unwrap_or_default())
    }

    pub fn history<'a>(&'a self, store: &'a EngineStore, key: &HistoryKey) -> Option<&'a TickHistory> {
        self.histories.get(key).or_else(|| store.histories.get(key))
    }

    /// Protocols with committed or staged history for `pool_id`.
    pub fn pool_protocols(&self, store: &EngineStore, pool_id: &PoolId) -> SmallVec<[Address; 4]> {
        let mut protocols: SmallVec<[Address; 4]> = store.histories.protocols(pool_id).iter().copied().collect();
        for (pool, protocol) in self.histories.keys() {
            if pool == pool_id && !protocols.contains(protocol) {
                protocols.push(*protocol);
            }
        }
        protocols
    }

    pub fn pool_position(&self, store: &EngineStore, key: &HistoryKey) -> PoolPosition {
        self.pool_positions
            .get(key)
            .or_else(|| store.pool_positions.get(key))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_pool_position(&mut self, key: HistoryKey, position: PoolPosition) {
        self.pool_positions.insert(key, position);
    }

    pub fn set_position(&mut self, key: B256, record: PositionRecord) {
        self.positions.insert(key, record);
    }

    pub fn emit(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    /// Fold staged records into `store`, returning the events to publish.
    pub fn commit(self, store: &mut EngineStore) -> Vec<EngineEvent> {
        for (key, history) in self.histories {
            store.histories.insert(key, history);
        }
        store.pool_positions.extend(self.pool_positions);
        store.positions.extend(self.positions);
        self.events
    }
}
