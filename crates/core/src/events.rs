//! Engine notifications.
//!
//! Events go out on a broadcast channel. Nothing is queued for absent
//! subscribers and nothing is retried.

use alloy::primitives::{Address, B256, U256};
use guardian_chain::PoolId;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    LiquidationExecuted {
        protocol_id: Address,
        liquidator: Address,
        borrower: Address,
        collateral_asset: Address,
        debt_asset: Address,
        debt_to_cover: U256,
        debt_repaid: U256,
        collateral_seized: U256,
        tx_hash: Option<B256>,
    },
    PositionRebalanced {
        pool_id: PoolId,
        protocol_id: Address,
        old_lower: i32,
        old_upper: i32,
        new_lower: i32,
        new_upper: i32,
        liquidity: u128,
    },
    TickRangeUpdated {
        pool_id: PoolId,
        owner: Address,
        old_lower: i32,
        old_upper: i32,
        new_lower: i32,
        new_upper: i32,
    },
    AdapterUpdated {
        protocol_id: Address,
        adapter: Address,
        enabled: bool,
        liquidation_threshold: U256,
    },
    LiquidatorAuthorizationChanged {
        liquidator: Address,
        authorized: bool,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
    AutoRebalanceEnabled {
        pool_id: PoolId,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    },
    AutoRebalanceDisabled {
        pool_id: PoolId,
        owner: Address,
    },
}

/// Fan-out of engine events to any number of observers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
