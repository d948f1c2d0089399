//! Protocol-agnostic health evaluation.
//!
//! Shape-A adapters report a continuous health factor which is used as is.
//! Shape-B adapters only answer two yes/no questions, mapped onto three
//! fixed levels. Anything unclassifiable reads as maximally healthy so it is
//! never liquidated.

use alloy::primitives::{Address, U256};
use guardian_chain::LendingGateway;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::resolver::{CapabilityResolver, ProtocolShape};

/// Shape-B metric for an absorbable account (0.95e18).
pub const LIQUIDATABLE_SENTINEL: U256 = U256::from_limbs([950_000_000_000_000_000, 0, 0, 0]);

/// Shape-B metric for an account that is not fully collateralized (0.99e18).
pub const UNDERCOLLATERALIZED_SENTINEL: U256 =
    U256::from_limbs([990_000_000_000_000_000, 0, 0, 0]);

/// Shape-B metric for a healthy account (1.2e18).
pub const HEALTHY_SENTINEL: U256 = U256::from_limbs([1_200_000_000_000_000_000, 0, 0, 0]);

/// Normalized health of one borrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReading {
    pub shape: ProtocolShape,
    /// 1e18 scale, compared only against the same adapter's threshold
    pub metric: U256,
}

impl HealthReading {
    fn unknown() -> Self {
        Self {
            shape: ProtocolShape::Unknown,
            metric: U256::MAX,
        }
    }
}

#[derive(Debug)]
pub struct HealthEvaluator {
    resolver: CapabilityResolver,
    lending: Arc<dyn LendingGateway>,
}

impl HealthEvaluator {
    pub fn new(lending: Arc<dyn LendingGateway>) -> Self {
        Self {
            resolver: CapabilityResolver::new(lending.clone()),
            lending,
        }
    }

    pub fn resolver(&self) -> &CapabilityResolver {
        &self.resolver
    }

    /// Health of `borrower` at the adapter deployed at `adapter`.
    ///
    /// Does not look at whether the adapter is enabled; that is the trigger's
    /// concern.
    pub async fn evaluate(&self, adapter: Address, borrower: Address) -> HealthReading {
        match self.resolver.classify(adapter).await {
            ProtocolShape::HealthFactor => self.health_factor(adapter, borrower).await,
            ProtocolShape::CollateralFlag => self.collateral_flags(adapter, borrower).await,
            ProtocolShape::Unknown => HealthReading::unknown(),
        }
    }

    async fn health_factor(&self, adapter: Address, borrower: Address) -> HealthReading {
        match self.lending.get_user_account_data(adapter, borrower).await {
            Ok(data) => HealthReading {
                shape: ProtocolShape::HealthFactor,
                metric: data.health_factor,
            },
            Err(e) => {
                warn!(%adapter, %borrower, error = %e, "Account data read failed");
                HealthReading::unknown()
            }
        }
    }

    async fn collateral_flags(&self, adapter: Address, borrower: Address) -> HealthReading {
        let (liquidatable, collateralized) = futures::join!(
            self.lending.is_liquidatable(adapter, borrower),
            self.lending.is_borrow_collateralized(adapter, borrower),
        );

        let metric = match liquidatable {
            Ok(true) => LIQUIDATABLE_SENTINEL,
            Ok(false) => match collateralized {
                Ok(false) => UNDERCOLLATERALIZED_SENTINEL,
                Ok(true) => HEALTHY_SENTINEL,
                Err(e) => {
                    warn!(%adapter, %borrower, error = %e, "Collateralization read failed");
                    return HealthReading::unknown();
                }
            },
            Err(e) => {
                warn!(%adapter, %borrower, error = %e, "Liquidatable read failed");
                return HealthReading::unknown();
            }
        };

        debug!(%adapter, %borrower, %metric, "Collateral flags mapped");
        HealthReading {
            shape: ProtocolShape::CollateralFlag,
            metric,
        }
    }
}
