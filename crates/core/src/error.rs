use alloy::primitives::Address;
use thiserror::Error;

/// Failures surfaced by the engine's mutating entry points.
///
/// Probe and health-read failures never show up here: they collapse into the
/// unknown-shape and maximum-health fallbacks.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine is paused")]
    Paused,

    #[error("reentrant call rejected")]
    Reentrancy,

    #[error("caller {0} is not the owner")]
    NotOwner(Address),

    #[error("liquidator {0} is not authorized")]
    Unauthorized(Address),

    #[error("protocol {0} has no recognized adapter")]
    InvalidAdapter(Address),

    #[error("invalid tick range [{lower}, {upper}]")]
    InvalidRange { lower: i32, upper: i32 },

    #[error("malformed liquidation intent: {0}")]
    InvalidIntent(String),

    #[error("liquidation dispatch to {protocol} failed: {source}")]
    Dispatch {
        protocol: Address,
        #[source]
        source: anyhow::Error,
    },

    #[error("liquidity modification failed: {0}")]
    LiquidityModification(#[source] anyhow::Error),

    #[error("host read failed: {0}")]
    HostRead(#[source] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
