//! Guardian host adapter
//!
//! Runs the guardian engine against a live EVM chain. Trade events are read
//! as JSON lines from a file (first argument) or stdin and fed to the
//! engine's hooks in order; every emitted engine event is printed to stdout
//! as a JSON line. Logs go to stderr.
//!
//! Input lines look like:
//!
//! ```text
//! {"kind":"before","initiator":"0x..","key":{..},"hook_data":"0x.."}
//! {"kind":"after","initiator":"0x..","key":{..},"delta":{"amount0":-5,"amount1":7},"hook_data":"0x.."}
//! {"kind":"enable_auto_rebalance","owner":"0x..","key":{..},"tick_lower":-600,"tick_upper":600,"liquidity":1000}
//! {"kind":"pause"}
//! ```

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guardian_chain::{
    BalanceDelta, EvmLendingGateway, EvmPoolManager, PoolKey, SwapParams, TransactionSender,
};
use guardian_core::{Deployment, DeploymentConfig, Engine, EngineConfig, EngineEvent};

/// Environment variable names.
mod env {
    pub const ENGINE_CONFIG: &str = "GUARDIAN_CONFIG";
    pub const DEPLOYMENT: &str = "GUARDIAN_DEPLOYMENT";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

/// One line of replay input.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum HostEvent {
    Before {
        initiator: Address,
        key: PoolKey,
        #[serde(default)]
        params: SwapParams,
        #[serde(default)]
        hook_data: String,
    },
    After {
        initiator: Address,
        key: PoolKey,
        #[serde(default)]
        params: SwapParams,
        #[serde(default)]
        delta: BalanceDelta,
        #[serde(default)]
        hook_data: String,
    },
    SetAdapter {
        protocol_id: Address,
        adapter: Address,
        enabled: bool,
        liquidation_threshold: U256,
    },
    Authorize {
        liquidator: Address,
        authorized: bool,
    },
    EnableAutoRebalance {
        owner: Address,
        key: PoolKey,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    },
    DisableAutoRebalance {
        owner: Address,
        key: PoolKey,
    },
    Pause,
    Unpause,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // GUARDIAN_CONFIG points at a TOML file; otherwise GUARDIAN_PROFILE picks a preset
    let config = match std::env::var(env::ENGINE_CONFIG) {
        Ok(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("Failed to load engine config {path}"))?,
        Err(_) => EngineConfig::from_env(),
    };
    config.log_config();

    let deployment = load_deployment()?;
    info!(?deployment, "Deployment loaded");

    let engine = build_engine(&deployment, config).await?;
    let printer = tokio::spawn(print_events(engine.subscribe()));
    apply_registrations(&engine)?;

    match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("Failed to open {path}"))?;
            replay(&engine, BufReader::new(file)).await?;
        }
        None => replay(&engine, BufReader::new(tokio::io::stdin())).await?,
    }

    // Dropping the engine closes the event channel and ends the printer
    drop(engine);
    printer.await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,guardian_core=debug,guardian_chain=debug"));
    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn load_deployment() -> Result<Deployment> {
    match std::env::var(env::DEPLOYMENT) {
        Ok(path) => DeploymentConfig::from_file(&path)?.resolve(),
        Err(_) => Deployment::from_env(),
    }
}

async fn build_engine(deployment: &Deployment, config: EngineConfig) -> Result<Engine> {
    info!("Initializing components...");

    let sender = Arc::new(
        TransactionSender::new(
            &deployment.private_key,
            &deployment.rpc_url,
            deployment.chain_id,
        )
        .await?,
    );
    info!(address = %sender.address, "Transaction sender initialized");

    let lending = Arc::new(EvmLendingGateway::with_sender(
        deployment.rpc_url.clone(),
        sender.clone(),
    ));
    let pool_manager = Arc::new(EvmPoolManager::new(
        deployment.rpc_url.clone(),
        deployment.state_view,
        deployment.liquidity_router,
        sender.clone(),
    ));

    // The signing account administers the engine and receives shape-B collateral
    let engine = Engine::new(sender.address, sender.address, config, lending, pool_manager);
    info!(owner = %engine.owner(), "Engine initialized");
    Ok(engine)
}

/// Register the adapters and liquidators listed in the engine config.
fn apply_registrations(engine: &Engine) -> Result<()> {
    let owner = engine.owner();
    let config = engine.config();

    for entry in &config.adapters {
        engine.set_adapter(
            owner,
            entry.protocol_id,
            entry.adapter,
            entry.enabled,
            entry.threshold_wad()?,
        )?;
    }
    for liquidator in &config.liquidators {
        engine.set_liquidator_authorization(owner, *liquidator, true)?;
    }

    info!(
        adapters = config.adapters.len(),
        liquidators = config.liquidators.len(),
        "Registrations applied"
    );
    Ok(())
}

/// Feed every input line to the engine. A failed invocation is logged and
/// the replay moves on to the next line.
async fn replay<R>(engine: &Engine, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: HostEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed input");
                continue;
            }
        };
        debug!(line = line_no, ?event, "Host event");

        if let Err(e) = dispatch(engine, event).await {
            error!(line = line_no, error = %format!("{e:#}"), "Invocation failed");
        }
    }

    info!(lines = line_no, "Replay finished");
    Ok(())
}

async fn dispatch(engine: &Engine, event: HostEvent) -> Result<()> {
    let owner = engine.owner();
    match event {
        HostEvent::Before {
            initiator,
            key,
            params,
            hook_data,
        } => {
            let hook_data = decode_hex(&hook_data)?;
            engine.before_trade(initiator, &key, &params, &hook_data).await?;
        }
        HostEvent::After {
            initiator,
            key,
            params,
            delta,
            hook_data,
        } => {
            let hook_data = decode_hex(&hook_data)?;
            engine
                .after_trade(initiator, &key, &params, delta, &hook_data)
                .await?;
        }
        HostEvent::SetAdapter {
            protocol_id,
            adapter,
            enabled,
            liquidation_threshold,
        } => engine.set_adapter(owner, protocol_id, adapter, enabled, liquidation_threshold)?,
        HostEvent::Authorize {
            liquidator,
            authorized,
        } => engine.set_liquidator_authorization(owner, liquidator, authorized)?,
        HostEvent::EnableAutoRebalance {
            owner,
            key,
            tick_lower,
            tick_upper,
            liquidity,
        } => engine.enable_auto_rebalance(owner, &key, tick_lower, tick_upper, liquidity)?,
        HostEvent::DisableAutoRebalance { owner, key } => {
            engine.disable_auto_rebalance(owner, &key)?
        }
        HostEvent::Pause => engine.pause(owner)?,
        HostEvent::Unpause => engine.unpause(owner)?,
    }
    Ok(())
}

fn decode_hex(raw: &str) -> Result<Vec<u8>> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(raw).context("hook_data is not valid hex")
}

/// Print engine events as timestamped JSON lines until the engine is dropped.
async fn print_events(mut rx: tokio::sync::broadcast::Receiver<EngineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let line = serde_json::json!({
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "data": event,
                });
                println!("{line}");
            }
            Err(RecvError::Lagged(missed)) => warn!(missed, "Event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
