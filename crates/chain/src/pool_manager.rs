//! Trade-execution host collaborator: price source and liquidity modification.

use crate::contracts::{self, ILiquidityRouter, IStateView};
use crate::pool::{BalanceDelta, ModifyLiquidityParams, PoolId, PoolKey, Slot0};
use crate::signer::TransactionSender;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{aliases::I24, aliases::U24, Address, Bytes, I256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

/// Pool manager surface the engine consumes.
#[async_trait]
pub trait PoolManager: Send + Sync + Debug {
    /// Current sqrt price and tick of a pool.
    async fn get_slot0(&self, pool_id: PoolId) -> Result<Slot0>;

    /// Add (positive delta) or remove (negative delta) liquidity, returning
    /// the caller's realized token deltas.
    async fn modify_liquidity(
        &self,
        key: &PoolKey,
        params: ModifyLiquidityParams,
    ) -> Result<BalanceDelta>;

    /// Timestamp of the latest block, in seconds.
    async fn block_timestamp(&self) -> Result<u64>;
}

/// Pool manager backed by the V4 `StateView` lens and a liquidity router.
#[derive(Debug, Clone)]
pub struct EvmPoolManager {
    rpc_url: String,
    state_view: Address,
    router: Address,
    sender: Arc<TransactionSender>,
}

impl EvmPoolManager {
    pub fn new(
        rpc_url: impl Into<String>,
        state_view: Address,
        router: Address,
        sender: Arc<TransactionSender>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            state_view,
            router,
            sender,
        }
    }
}

fn to_sol_key(key: &PoolKey) -> Result<contracts::PoolKey> {
    Ok(contracts::PoolKey {
        currency0: key.currency0,
        currency1: key.currency1,
        fee: U24::try_from(key.fee).map_err(|e| anyhow!("fee {} does not fit uint24: {e:?}", key.fee))?,
        tickSpacing: to_i24(key.tick_spacing)?,
        hooks: key.hooks,
    })
}

fn to_i24(value: i32) -> Result<I24> {
    I24::try_from(value).map_err(|e| anyhow!("value {value} does not fit int24: {e:?}"))
}

#[async_trait]
impl PoolManager for EvmPoolManager {
    async fn get_slot0(&self, pool_id: PoolId) -> Result<Slot0> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let lens = IStateView::new(self.state_view, &provider);
        let slot0 = lens.getSlot0(pool_id).call().await?;

        let tick = i32::try_from(slot0.tick).map_err(|e| anyhow!("tick out of range: {e:?}"))?;

        Ok(Slot0 {
            sqrt_price_x96: U256::from(slot0.sqrtPriceX96),
            tick,
        })
    }

    async fn modify_liquidity(
        &self,
        key: &PoolKey,
        params: ModifyLiquidityParams,
    ) -> Result<BalanceDelta> {
        let sol_params = contracts::ModifyLiquidityParams {
            tickLower: to_i24(params.tick_lower)?,
            tickUpper: to_i24(params.tick_upper)?,
            liquidityDelta: I256::try_from(params.liquidity_delta)
                .map_err(|e| anyhow!("liquidity delta out of range: {e:?}"))?,
            salt: params.salt,
        };
        let sol_key = to_sol_key(key)?;

        // Simulate first: the packed delta is only observable as a return value.
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let router = ILiquidityRouter::new(self.router, &provider);
        let simulated = router
            .modifyLiquidity(sol_key.clone(), sol_params.clone(), Bytes::new())
            .from(self.sender.address)
            .call()
            .await
            .context("modifyLiquidity simulation failed")?;
        let delta = BalanceDelta::from_packed(simulated.delta.into_raw());

        let call = ILiquidityRouter::modifyLiquidityCall {
            key: sol_key,
            params: sol_params,
            hookData: Bytes::new(),
        };
        let receipt = self
            .sender
            .send_call(self.router, &call)
            .await?;

        info!(
            tx_hash = %receipt.transaction_hash,
            tick_lower = params.tick_lower,
            tick_upper = params.tick_upper,
            liquidity_delta = params.liquidity_delta,
            amount0 = delta.amount0,
            amount1 = delta.amount1,
            "Liquidity modified"
        );

        Ok(delta)
    }

    async fn block_timestamp(&self) -> Result<u64> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let block = provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .context("latest block unavailable")?;
        debug!(number = block.header.number, "Fetched latest block");
        Ok(block.header.timestamp)
    }
}
