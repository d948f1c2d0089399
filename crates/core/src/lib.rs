//! Guardian core logic.
//!
//! This crate provides the hook engine invoked around each trade:
//! - Adapter registry and runtime classification of lending protocol shapes
//! - Normalized health evaluation and liquidation dispatch
//! - Per (pool, protocol) tick history and volatility scoring
//! - LP range optimization and opted-in position rebalancing
//! - Pause and reentrancy guards, transactional commit, event fan-out
//!
//! Supports health-factor lenders (AAVE v3 style) and collateral-flag
//! lenders (Compound v3 style) on any EVM chain.

pub mod config;
mod engine;
mod error;
mod events;
mod guard;
mod health;
mod history;
#[cfg(test)]
mod mock;
mod position;
mod range;
mod registry;
mod resolver;
mod store;
pub mod tick_math;
mod trigger;
pub mod u256_math;
pub mod volatility;

pub use config::{Deployment, DeploymentConfig, EngineConfig, PositionConfig, RangeConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventBus};
pub use health::{HealthEvaluator, HealthReading};
pub use history::{TickHistory, HISTORY_CAPACITY};
pub use position::{PoolPosition, PositionRecord};
pub use range::{optimal_range, rebalanced_range, should_rebalance, should_rebalance_position};
pub use registry::AdapterConfig;
pub use resolver::{CapabilityResolver, ProtocolShape};
pub use trigger::{decode_intent, LiquidationDecision, LiquidationIntent};
