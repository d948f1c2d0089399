//! Liquidation intents, decisions and protocol-specific dispatch.

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolValue;
use guardian_chain::{LendingGateway, LiquidationCallParams, Settlement};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::health::HealthEvaluator;
use crate::registry::AdapterConfig;
use crate::resolver::ProtocolShape;

sol! {
    /// Liquidation request carried in a trade's hook data.
    #[derive(Debug, PartialEq, Eq)]
    struct LiquidationIntent {
        address protocol;
        address borrower;
        address collateralAsset;
        address debtAsset;
        uint256 debtToCover;
        bool receiveAToken;
    }
}

/// Decode hook data. Empty data carries no intent.
pub fn decode_intent(hook_data: &[u8]) -> EngineResult<Option<LiquidationIntent>> {
    if hook_data.is_empty() {
        return Ok(None);
    }
    <LiquidationIntent as SolValue>::abi_decode(hook_data, true)
        .map(Some)
        .map_err(|e| EngineError::InvalidIntent(e.to_string()))
}

/// Outcome of evaluating an intent, before any authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationDecision {
    pub protocol_id: Address,
    pub borrower: Address,
    pub enabled: bool,
    pub shape: ProtocolShape,
    /// Not evaluated for disabled adapters
    pub health_metric: Option<U256>,
    pub threshold: U256,
    pub liquidate: bool,
}

/// Decides on and dispatches liquidations.
#[derive(Debug)]
pub struct LiquidationTrigger {
    evaluator: HealthEvaluator,
    lending: Arc<dyn LendingGateway>,
    /// Absorber and collateral recipient for shape-B liquidations
    beneficiary: Address,
}

impl LiquidationTrigger {
    pub fn new(lending: Arc<dyn LendingGateway>, beneficiary: Address) -> Self {
        Self {
            evaluator: HealthEvaluator::new(lending.clone()),
            lending,
            beneficiary,
        }
    }

    pub fn evaluator(&self) -> &HealthEvaluator {
        &self.evaluator
    }

    /// Liquidate iff the adapter is enabled and the metric is strictly below
    /// its threshold. Disabled adapters are never evaluated.
    pub async fn decide(&self, adapter: &AdapterConfig, intent: &LiquidationIntent) -> LiquidationDecision {
        let mut decision = LiquidationDecision {
            protocol_id: intent.protocol,
            borrower: intent.borrower,
            enabled: adapter.enabled,
            shape: ProtocolShape::Unknown,
            health_metric: None,
            threshold: adapter.liquidation_threshold,
            liquidate: false,
        };
        if !adapter.enabled {
            return decision;
        }

        let reading = self
            .evaluator
            .evaluate(adapter.adapter_address, intent.borrower)
            .await;
        decision.shape = reading.shape;
        decision.health_metric = Some(reading.metric);
        decision.liquidate = reading.metric < adapter.liquidation_threshold;
        decision
    }

    /// Route the liquidation to the adapter's interface family.
    ///
    /// Failures are returned as [`EngineError::Dispatch`]; nothing is retried.
    pub async fn dispatch(
        &self,
        adapter: &AdapterConfig,
        shape: ProtocolShape,
        intent: &LiquidationIntent,
    ) -> EngineResult<Settlement> {
        let target = adapter.adapter_address;
        let dispatch_err = |source: anyhow::Error| EngineError::Dispatch {
            protocol: intent.protocol,
            source,
        };

        let settlement = match shape {
            ProtocolShape::HealthFactor => {
                let params = LiquidationCallParams {
                    collateral_asset: intent.collateralAsset,
                    debt_asset: intent.debtAsset,
                    user: intent.borrower,
                    debt_to_cover: intent.debtToCover,
                    receive_a_token: intent.receiveAToken,
                };
                self.lending
                    .liquidation_call(target, &params)
                    .await
                    .map_err(dispatch_err)?
            }
            ProtocolShape::CollateralFlag => {
                let absorbed = self
                    .lending
                    .absorb(target, self.beneficiary, &[intent.borrower])
                    .await
                    .map_err(dispatch_err)?;

                if !intent.collateralAsset.is_zero() && !intent.debtToCover.is_zero() {
                    let bought = self
                        .lending
                        .buy_collateral(
                            target,
                            intent.collateralAsset,
                            U256::ZERO,
                            intent.debtToCover,
                            self.beneficiary,
                        )
                        .await
                        .map_err(dispatch_err)?;
                    absorbed.merge(bought)
                } else {
                    absorbed
                }
            }
            ProtocolShape::Unknown => {
                warn!(protocol = %intent.protocol, adapter = %target, "Refusing liquidation on unrecognized adapter");
                return Err(EngineError::InvalidAdapter(intent.protocol));
            }
        };

        info!(
            protocol = %intent.protocol,
            borrower = %intent.borrower,
            ?shape,
            debt_repaid = %settlement.debt_repaid,
            collateral_seized = %settlement.collateral_seized,
            "Liquidation dispatched"
        );
        Ok(settlement)
    }
}
