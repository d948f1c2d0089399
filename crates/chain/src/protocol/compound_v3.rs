//! Compound V3 Comet (shape B) implementation of [`CollateralFlagLending`].

use super::{CollateralFlagLending, EvmLendingGateway, Settlement};
use crate::contracts::IComet;
use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::rpc::types::TransactionReceipt;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
impl CollateralFlagLending for EvmLendingGateway {
    async fn is_liquidatable(&self, adapter: Address, account: Address) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        let comet = IComet::new(adapter, &provider);
        let result = comet.isLiquidatable(account).call().await?;
        Ok(result._0)
    }

    async fn is_borrow_collateralized(&self, adapter: Address, account: Address) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(self.read_url.parse()?);
        let comet = IComet::new(adapter, &provider);
        let result = comet.isBorrowCollateralized(account).call().await?;
        Ok(result._0)
    }

    async fn absorb(
        &self,
        adapter: Address,
        absorber: Address,
        accounts: &[Address],
    ) -> Result<Settlement> {
        let call = IComet::absorbCall {
            absorber,
            accounts: accounts.to_vec(),
        };

        let receipt = self.send(adapter, &call).await?;
        let settlement = absorb_settlement(&receipt);

        debug!(
            adapter = %adapter,
            accounts = accounts.len(),
            base_paid_out = %settlement.debt_repaid,
            collateral_absorbed = %settlement.collateral_seized,
            "Absorb settled"
        );

        Ok(settlement)
    }

    async fn buy_collateral(
        &self,
        adapter: Address,
        asset: Address,
        min_amount: U256,
        base_amount: U256,
        recipient: Address,
    ) -> Result<Settlement> {
        let call = IComet::buyCollateralCall {
            asset,
            minAmount: min_amount,
            baseAmount: base_amount,
            recipient,
        };

        let receipt = self.send(adapter, &call).await?;

        let mut settlement = Settlement {
            tx_hash: Some(receipt.transaction_hash),
            ..Default::default()
        };
        for log in receipt.inner.logs() {
            if let Ok(decoded) = log.log_decode::<IComet::BuyCollateral>() {
                let event = decoded.inner.data;
                settlement.collateral_seized =
                    settlement.collateral_seized.saturating_add(event.collateralAmount);
            }
        }

        Ok(settlement)
    }
}

fn absorb_settlement(receipt: &TransactionReceipt) -> Settlement {
    let mut settlement = Settlement {
        tx_hash: Some(receipt.transaction_hash),
        ..Default::default()
    };

    for log in receipt.inner.logs() {
        if let Ok(decoded) = log.log_decode::<IComet::AbsorbDebt>() {
            settlement.debt_repaid = settlement
                .debt_repaid
                .saturating_add(decoded.inner.data.basePaidOut);
        } else if let Ok(decoded) = log.log_decode::<IComet::AbsorbCollateral>() {
            settlement.collateral_seized = settlement
                .collateral_seized
                .saturating_add(decoded.inner.data.collateralAbsorbed);
        }
    }

    settlement
}
