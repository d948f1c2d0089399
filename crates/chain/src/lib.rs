//! Guardian chain interaction layer.
//!
//! This crate provides:
//! - Pool identity and trade types shared with the trade-execution host
//! - Contract bindings for AAVE V3 Pool, Compound V3 Comet and the V4 periphery
//! - Protocol traits for shape-A (health factor) and shape-B (liquidatable flag) lenders
//! - Pool manager access (slot0 reads, liquidity modification)
//! - Transaction signing and sending

pub mod contracts;
pub mod pool;
mod pool_manager;
pub mod protocol;
mod signer;

pub use pool::{
    position_key, BalanceDelta, ModifyLiquidityParams, PoolId, PoolKey, Slot0, SwapParams,
};
pub use pool_manager::{EvmPoolManager, PoolManager};
pub use protocol::{
    AccountData, CollateralFlagLending, EvmLendingGateway, HealthFactorLending, LendingGateway,
    LiquidationCallParams, Settlement,
};
pub use signer::{NonceTracker, TransactionSender};
