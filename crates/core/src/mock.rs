//! In-memory collaborators for engine tests.

use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use guardian_chain::{
    AccountData, BalanceDelta, CollateralFlagLending, HealthFactorLending, LiquidationCallParams,
    ModifyLiquidityParams, PoolId, PoolKey, PoolManager, Settlement, Slot0,
};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::tick_math::sqrt_ratio_at_tick;
use crate::u256_math::WAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockShape {
    HealthFactor,
    CollateralFlag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    LiquidationCall {
        adapter: Address,
        user: Address,
        debt_to_cover: U256,
    },
    Absorb {
        adapter: Address,
        absorber: Address,
        accounts: Vec<Address>,
    },
    BuyCollateral {
        adapter: Address,
        asset: Address,
        base_amount: U256,
        recipient: Address,
    },
}

#[derive(Debug, Default)]
struct LendingState {
    adapters: HashMap<Address, MockShape>,
    health: HashMap<Address, U256>,
    /// (liquidatable, collateralized)
    flags: HashMap<Address, (bool, bool)>,
    probes: HashMap<Address, usize>,
    calls: Vec<MockCall>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Lending gateway answering from in-memory tables.
///
/// Calls against an adapter of the other shape fail, as they would on-chain.
#[derive(Debug, Default)]
pub struct MockLending {
    state: Mutex<LendingState>,
}

impl MockLending {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(self, adapter: Address, shape: MockShape) -> Self {
        self.set_adapter(adapter, shape);
        self
    }

    pub fn set_adapter(&self, adapter: Address, shape: MockShape) {
        self.state.lock().adapters.insert(adapter, shape);
    }

    pub fn set_health_factor(&self, borrower: Address, health_factor: U256) {
        self.state.lock().health.insert(borrower, health_factor);
    }

    pub fn set_flags(&self, borrower: Address, liquidatable: bool, collateralized: bool) {
        self.state
            .lock()
            .flags
            .insert(borrower, (liquidatable, collateralized));
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Capability probes seen for `adapter`.
    pub fn probe_count(&self, adapter: Address) -> usize {
        self.state.lock().probes.get(&adapter).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    fn check(&self, adapter: Address, shape: MockShape, write: bool) -> Result<()> {
        let state = self.state.lock();
        if (write && state.fail_writes) || (!write && state.fail_reads) {
            bail!("mock failure");
        }
        match state.adapters.get(&adapter) {
            Some(s) if *s == shape => Ok(()),
            _ => Err(anyhow!("execution reverted")),
        }
    }

    fn count_probe(&self, adapter: Address, account: Address) {
        if account.is_zero() {
            *self.state.lock().probes.entry(adapter).or_default() += 1;
        }
    }
}

#[async_trait]
impl HealthFactorLending for MockLending {
    async fn get_user_account_data(&self, adapter: Address, user: Address) -> Result<AccountData> {
        self.count_probe(adapter, user);
        self.check(adapter, MockShape::HealthFactor, false)?;
        let health_factor = self
            .state
            .lock()
            .health
            .get(&user)
            .copied()
            .unwrap_or(WAD * U256::from(2u64));
        Ok(AccountData {
            health_factor,
            ..Default::default()
        })
    }

    async fn liquidation_call(
        &self,
        adapter: Address,
        params: &LiquidationCallParams,
    ) -> Result<Settlement> {
        self.check(adapter, MockShape::HealthFactor, true)?;
        self.state.lock().calls.push(MockCall::LiquidationCall {
            adapter,
            user: params.user,
            debt_to_cover: params.debt_to_cover,
        });
        Ok(Settlement {
            tx_hash: Some(B256::repeat_byte(0x01)),
            debt_repaid: params.debt_to_cover,
            collateral_seized: params.debt_to_cover * U256::from(105u64) / U256::from(100u64),
        })
    }
}

#[async_trait]
impl CollateralFlagLending for MockLending {
    async fn is_liquidatable(&self, adapter: Address, account: Address) -> Result<bool> {
        self.count_probe(adapter, account);
        self.check(adapter, MockShape::CollateralFlag, false)?;
        Ok(self.state.lock().flags.get(&account).map(|f| f.0).unwrap_or(false))
    }

    async fn is_borrow_collateralized(&self, adapter: Address, account: Address) -> Result<bool> {
        self.check(adapter, MockShape::CollateralFlag, false)?;
        Ok(self.state.lock().flags.get(&account).map(|f| f.1).unwrap_or(true))
    }

    async fn absorb(
        &self,
        adapter: Address,
        absorber: Address,
        accounts: &[Address],
    ) -> Result<Settlement> {
        self.check(adapter, MockShape::CollateralFlag, true)?;
        self.state.lock().calls.push(MockCall::Absorb {
            adapter,
            absorber,
            accounts: accounts.to_vec(),
        });
        Ok(Settlement {
            tx_hash: Some(B256::repeat_byte(0x02)),
            debt_repaid: U256::from(500u64),
            collateral_seized: U256::ZERO,
        })
    }

    async fn buy_collateral(
        &self,
        adapter: Address,
        asset: Address,
        _min_amount: U256,
        base_amount: U256,
        recipient: Address,
    ) -> Result<Settlement> {
        self.check(adapter, MockShape::CollateralFlag, true)?;
        self.state.lock().calls.push(MockCall::BuyCollateral {
            adapter,
            asset,
            base_amount,
            recipient,
        });
        Ok(Settlement {
            tx_hash: Some(B256::repeat_byte(0x03)),
            debt_repaid: U256::ZERO,
            collateral_seized: base_amount,
        })
    }
}

#[derive(Debug, Default)]
struct PoolState {
    ticks: HashMap<PoolId, i32>,
    timestamp: u64,
    modifications: Vec<ModifyLiquidityParams>,
    fail_modify: bool,
    fail_reads: bool,
}

/// Pool manager with settable ticks that records liquidity changes.
#[derive(Debug, Default)]
pub struct MockPoolManager {
    state: Mutex<PoolState>,
}

impl MockPoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tick(&self, pool_id: PoolId, tick: i32) {
        self.state.lock().ticks.insert(pool_id, tick);
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.state.lock().timestamp = timestamp;
    }

    pub fn fail_modify(&self, fail: bool) {
        self.state.lock().fail_modify = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn modifications(&self) -> Vec<ModifyLiquidityParams> {
        self.state.lock().modifications.clone()
    }
}

#[async_trait]
impl PoolManager for MockPoolManager {
    async fn get_slot0(&self, pool_id: PoolId) -> Result<Slot0> {
        let state = self.state.lock();
        if state.fail_reads {
            bail!("mock slot0 failure");
        }
        let tick = state.ticks.get(&pool_id).copied().unwrap_or(0);
        let sqrt_price_x96 = sqrt_ratio_at_tick(tick).ok_or_else(|| anyhow!("tick out of range"))?;
        Ok(Slot0 {
            sqrt_price_x96,
            tick,
        })
    }

    async fn modify_liquidity(
        &self,
        _key: &PoolKey,
        params: ModifyLiquidityParams,
    ) -> Result<BalanceDelta> {
        let mut state = self.state.lock();
        if state.fail_modify {
            bail!("mock modifyLiquidity failure");
        }
        state.modifications.push(params);
        // Deposits are owed to the pool, withdrawals to the caller
        let amount = -(params.liquidity_delta / 2);
        Ok(BalanceDelta::new(amount, amount))
    }

    async fn block_timestamp(&self) -> Result<u64> {
        let state = self.state.lock();
        if state.fail_reads {
            bail!("mock block failure");
        }
        Ok(state.timestamp)
    }
}
