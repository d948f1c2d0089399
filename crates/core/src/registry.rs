//! Protocol adapter registry.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;

/// Adapter metadata for one lending protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    pub protocol_id: Address,
    pub adapter_address: Address,
    pub enabled: bool,
    /// 1e18 scale; compared against the normalized health metric
    pub liquidation_threshold: U256,
}

/// Keyed table of adapters. Entries are overwritten, never removed.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Address, AdapterConfig>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `config.protocol_id`.
    pub fn set(&mut self, config: AdapterConfig) {
        self.adapters.insert(config.protocol_id, config);
    }

    /// Entry for `protocol_id`, or a disabled zero config when unknown.
    pub fn get(&self, protocol_id: Address) -> AdapterConfig {
        self.adapters.get(&protocol_id).copied().unwrap_or_default()
    }
}
