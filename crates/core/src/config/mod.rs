//! Configuration system for the guardian engine.
//!
//! This module provides:
//! - Engine runtime configuration (profiles, range and rebalance tuning)
//! - Startup adapter and liquidator registrations
//! - Deployment configuration (RPC, signer, pool manager periphery)

mod deployment;
mod engine;

pub use deployment::{
    ChainSection, ContractsSection, Deployment, DeploymentConfig, SignerSection,
};
pub use engine::{AdapterEntry, EngineConfig, PositionConfig, RangeConfig};
