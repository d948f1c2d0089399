//! Position state tracked by the engine.

use alloy::primitives::{Address, U256};
use serde::Serialize;

/// A user's opted-in position, keyed by `position_key(pool_id, owner)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub auto_rebalance_enabled: bool,
}

impl PositionRecord {
    /// Whether `tick` lies within `[tick_lower, tick_upper]`.
    pub fn contains(&self, tick: i32) -> bool {
        (self.tick_lower..=self.tick_upper).contains(&tick)
    }
}

/// Liquidity the engine itself provides for a (pool, protocol) pair.
///
/// Fee counters are reset on every reposition and not otherwise maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolPosition {
    pub liquidity: u128,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub last_update_timestamp: u64,
    pub fees_earned0: U256,
    pub fees_earned1: U256,
}

impl PoolPosition {
    pub fn contains(&self, tick: i32) -> bool {
        (self.lower_tick..=self.upper_tick).contains(&tick)
    }
}
