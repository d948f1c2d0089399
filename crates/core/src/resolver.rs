//! Capability probing for lending adapters.
//!
//! Adapters do not declare which interface family they implement, so the
//! resolver tries one read-only call per family. A failed probe only means
//! "not this shape"; it is logged and never returned as an error.

use alloy::primitives::Address;
use dashmap::DashMap;
use guardian_chain::LendingGateway;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Interface family an adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtocolShape {
    /// Neither probe succeeded
    Unknown,
    /// Continuous health factor via account data (shape A)
    HealthFactor,
    /// Binary liquidatable / collateralized predicates (shape B)
    CollateralFlag,
}

/// Classifies adapter addresses, caching positive results.
///
/// `Unknown` is never cached, so a transient RPC failure is re-probed on the
/// next evaluation instead of sticking for the engine's lifetime.
#[derive(Debug)]
pub struct CapabilityResolver {
    lending: Arc<dyn LendingGateway>,
    cache: DashMap<Address, ProtocolShape>,
}

impl CapabilityResolver {
    pub fn new(lending: Arc<dyn LendingGateway>) -> Self {
        Self {
            lending,
            cache: DashMap::new(),
        }
    }

    /// Shape of the adapter at `adapter`.
    pub async fn classify(&self, adapter: Address) -> ProtocolShape {
        if adapter.is_zero() {
            return ProtocolShape::Unknown;
        }
        if let Some(shape) = self.cache.get(&adapter) {
            return *shape;
        }

        let shape = self.probe(adapter).await;
        if shape != ProtocolShape::Unknown {
            self.cache.insert(adapter, shape);
        }
        shape
    }

    /// Cached classification, without probing.
    pub fn cached(&self, adapter: Address) -> Option<ProtocolShape> {
        self.cache.get(&adapter).map(|shape| *shape)
    }

    async fn probe(&self, adapter: Address) -> ProtocolShape {
        match self.lending.get_user_account_data(adapter, Address::ZERO).await {
            Ok(_) => {
                debug!(%adapter, "Adapter exposes account data");
                return ProtocolShape::HealthFactor;
            }
            Err(e) => debug!(%adapter, error = %e, "Account data probe failed"),
        }

        match self.lending.is_liquidatable(adapter, Address::ZERO).await {
            Ok(_) => {
                debug!(%adapter, "Adapter exposes liquidatable flag");
                ProtocolShape::CollateralFlag
            }
            Err(e) => {
                debug!(%adapter, error = %e, "Liquidatable probe failed");
                ProtocolShape::Unknown
            }
        }
    }
}
