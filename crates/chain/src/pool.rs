//! Pool identity and trade types shared with the trade-execution host.
//!
//! These mirror the Uniswap V4 pool manager types the engine is invoked with.
//! Identities are derived exactly as the pool manager derives them so keys
//! computed off-chain match the on-chain ones.

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// Identifier of a pool: `keccak256(abi.encode(PoolKey))`.
pub type PoolId = B256;

/// Static description of a pool as supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    /// Lower-sorted currency
    pub currency0: Address,
    /// Higher-sorted currency
    pub currency1: Address,
    /// Fee tier in hundredths of a bip (3000 = 0.30%)
    pub fee: u32,
    /// Tick spacing of the pool
    pub tick_spacing: i32,
    /// Hook contract attached to the pool
    pub hooks: Address,
}

impl PoolKey {
    /// Derive the pool id.
    ///
    /// `uint24`/`int24` words encode identically to `uint32`/`int32` words,
    /// so the plain integer fields can be encoded directly.
    pub fn id(&self) -> PoolId {
        let encoded = (
            self.currency0,
            self.currency1,
            self.fee,
            self.tick_spacing,
            self.hooks,
        )
            .abi_encode();
        keccak256(encoded)
    }
}

/// Derive the per-owner position key for a pool: `keccak256(abi.encode(poolId, owner))`.
pub fn position_key(pool_id: PoolId, owner: Address) -> B256 {
    keccak256((pool_id, owner).abi_encode())
}

/// Current price state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot0 {
    /// sqrt(price) as a Q64.96 fixed-point number
    pub sqrt_price_x96: U256,
    /// Current tick
    pub tick: i32,
}

/// Net token deltas realized by a trade or a liquidity modification.
///
/// Signs follow the pool manager convention: negative amounts are owed to
/// the pool, positive amounts are owed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub amount0: i128,
    pub amount1: i128,
}

impl BalanceDelta {
    pub const ZERO: Self = Self { amount0: 0, amount1: 0 };

    pub fn new(amount0: i128, amount1: i128) -> Self {
        Self { amount0, amount1 }
    }

    /// Absolute token amounts, used as the budget for re-depositing liquidity.
    pub fn absolute_amounts(&self) -> (u128, u128) {
        (self.amount0.unsigned_abs(), self.amount1.unsigned_abs())
    }

    /// Unpack the pool manager's packed `int256` (amount0 in the high 128 bits).
    pub fn from_packed(raw: U256) -> Self {
        let limbs = raw.as_limbs();
        let low = (limbs[1] as u128) << 64 | limbs[0] as u128;
        let high = (limbs[3] as u128) << 64 | limbs[2] as u128;
        Self {
            amount0: high as i128,
            amount1: low as i128,
        }
    }
}

/// Trade parameters forwarded by the host. The engine only logs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwapParams {
    pub zero_for_one: bool,
    pub amount_specified: i128,
    pub sqrt_price_limit_x96: U256,
}

/// Parameters for adding or removing liquidity at a tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifyLiquidityParams {
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// Positive to deposit, negative to withdraw
    pub liquidity_delta: i128,
    pub salt: B256,
}
