//! Protocol abstraction layer for heterogeneous lending protocols.
//!
//! Lending protocols come in two interface families that the engine must
//! tell apart at runtime:
//!
//! - [`HealthFactorLending`] (shape A): exposes a continuous health factor
//!   through an account-data read and liquidates via a direct call.
//! - [`CollateralFlagLending`] (shape B): only exposes binary
//!   liquidatable/collateralized predicates and liquidates by absorption.
//!
//! Every call is addressed to an adapter address. Calling a function the
//! adapter does not implement fails like any other RPC failure, which is
//! what capability probing relies on.
//!
//! # Example
//!
//! ```rust,ignore
//! use guardian_chain::protocol::{HealthFactorLending, LendingGateway};
//!
//! let gateway = EvmLendingGateway::new(read_url, sender);
//! let data = gateway.get_user_account_data(pool, borrower).await?;
//! if data.health_factor < WAD {
//!     gateway.liquidation_call(pool, &params).await?;
//! }
//! ```

mod aave_v3;
mod compound_v3;
mod gateway;

pub use gateway::EvmLendingGateway;

use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Account data returned by a shape-A protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountData {
    pub total_collateral_base: U256,
    pub total_debt_base: U256,
    pub available_borrows_base: U256,
    pub current_liquidation_threshold: U256,
    pub ltv: U256,
    /// Health factor (WAD, 1e18 = at threshold)
    pub health_factor: U256,
}

/// Parameters for a shape-A liquidation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationCallParams {
    /// Collateral asset to seize
    pub collateral_asset: Address,
    /// Debt asset to repay
    pub debt_asset: Address,
    /// User to liquidate
    pub user: Address,
    /// Amount of debt to cover (or max U256 for full liquidation)
    pub debt_to_cover: U256,
    /// Whether to receive the aToken instead of the underlying
    pub receive_a_token: bool,
}

/// Amounts realized by a settled liquidation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settlement {
    /// Transaction that settled the call, if it went on-chain
    pub tx_hash: Option<B256>,
    /// Debt repaid (shape A) or base paid out on absorption (shape B)
    pub debt_repaid: U256,
    /// Collateral seized or purchased
    pub collateral_seized: U256,
}

impl Settlement {
    /// Combine two settlements of the same liquidation (absorb + buy).
    pub fn merge(self, other: Settlement) -> Settlement {
        Settlement {
            tx_hash: other.tx_hash.or(self.tx_hash),
            debt_repaid: self.debt_repaid.saturating_add(other.debt_repaid),
            collateral_seized: self.collateral_seized.saturating_add(other.collateral_seized),
        }
    }
}

/// Shape-A lending protocol: continuous health factor.
#[async_trait]
pub trait HealthFactorLending: Send + Sync + Debug {
    /// Read the account data for `user` from the protocol at `adapter`.
    async fn get_user_account_data(&self, adapter: Address, user: Address) -> Result<AccountData>;

    /// Liquidate through the protocol's direct liquidation call.
    async fn liquidation_call(
        &self,
        adapter: Address,
        params: &LiquidationCallParams,
    ) -> Result<Settlement>;
}

/// Shape-B lending protocol: binary liquidatable / collateralized flags.
#[async_trait]
pub trait CollateralFlagLending: Send + Sync + Debug {
    /// Whether `account` can be absorbed right now.
    async fn is_liquidatable(&self, adapter: Address, account: Address) -> Result<bool>;

    /// Whether `account`'s borrow is fully collateralized.
    async fn is_borrow_collateralized(&self, adapter: Address, account: Address) -> Result<bool>;

    /// Absorb the given underwater accounts on behalf of `absorber`.
    async fn absorb(
        &self,
        adapter: Address,
        absorber: Address,
        accounts: &[Address],
    ) -> Result<Settlement>;

    /// Buy absorbed collateral from the protocol's reserves.
    async fn buy_collateral(
        &self,
        adapter: Address,
        asset: Address,
        min_amount: U256,
        base_amount: U256,
        recipient: Address,
    ) -> Result<Settlement>;
}

/// A gateway able to address both protocol families.
pub trait LendingGateway: HealthFactorLending + CollateralFlagLending {}

impl<T: HealthFactorLending + CollateralFlagLending> LendingGateway for T {}
