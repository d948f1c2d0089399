//! AAVE V3 (shape A) implementation of [`HealthFactorLending`].
//!
//! Health is read straight from `getUserAccountData`; liquidation goes
//! through the pool's `liquidationCall` and the realized amounts are taken
//! from the `LiquidationCall` event in the receipt.

use super::{AccountData, EvmLendingGateway, HealthFactorLending, LiquidationCallParams, Settlement};
use crate::contracts::IPool;
use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use alloy::rpc::types::TransactionReceipt;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
impl HealthFactorLending for EvmLendingGateway {
    async fn get_user_account_data(&self, adapter: Address, user: Address) -> Result<AccountData> {
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        let pool = IPool::new(adapter, &provider);

        let data = pool.getUserAccountData(user).call().await?;

        debug!(
            adapter = %adapter,
            user = %user,
            health_factor = %data.healthFactor,
            "Fetched account data"
        );

        Ok(AccountData {
            total_collateral_base: data.totalCollateralBase,
            total_debt_base: data.totalDebtBase,
            available_borrows_base: data.availableBorrowsBase,
            current_liquidation_threshold: data.currentLiquidationThreshold,
            ltv: data.ltv,
            health_factor: data.healthFactor,
        })
    }

    async fn liquidation_call(
        &self,
        adapter: Address,
        params: &LiquidationCallParams,
    ) -> Result<Settlement> {
        let call = IPool::liquidationCallCall {
            collateralAsset: params.collateral_asset,
            debtAsset: params.debt_asset,
            user: params.user,
            debtToCover: params.debt_to_cover,
            receiveAToken: params.receive_a_token,
        };

        let receipt = self.send(adapter, &call).await?;
        Ok(settlement_from_receipt(&receipt, params.user))
    }
}

/// Extract the realized amounts for `user` from a liquidation receipt.
fn settlement_from_receipt(receipt: &TransactionReceipt, user: Address) -> Settlement {
    let mut settlement = Settlement {
        tx_hash: Some(receipt.transaction_hash),
        ..Default::default()
    };

    for log in receipt.inner.logs() {
        if let Ok(decoded) = log.log_decode::<IPool::LiquidationCall>() {
            let event = decoded.inner.data;
            if event.user == user {
                settlement.debt_repaid = settlement.debt_repaid.saturating_add(event.debtToCover);
                settlement.collateral_seized = settlement
                    .collateral_seized
                    .saturating_add(event.liquidatedCollateralAmount);
            }
        }
    }

    settlement
}
