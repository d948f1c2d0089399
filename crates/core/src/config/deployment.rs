//! Deployment wiring: RPC endpoint, signer and pool manager periphery.
//!
//! Values may reference environment variables as `${VAR_NAME}`.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deployment file as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub chain: ChainSection,
    pub contracts: ContractsSection,
    #[serde(default)]
    pub signer: SignerSection,
}

/// Chain endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSection {
    /// HTTP RPC endpoint
    pub rpc_url: String,
    /// Chain ID used for signing
    pub chain_id: u64,
}

/// Pool manager periphery contracts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsSection {
    /// StateView lens used for slot0 reads
    pub state_view: String,
    /// Router that forwards liquidity modifications to the pool manager
    pub liquidity_router: String,
}

/// Signing key reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerSection {
    #[serde(default = "default_private_key")]
    pub private_key: String,
}

fn default_private_key() -> String {
    "${PRIVATE_KEY}".to_string()
}

impl Default for SignerSection {
    fn default() -> Self {
        Self {
            private_key: default_private_key(),
        }
    }
}

/// Fully resolved deployment.
#[derive(Clone)]
pub struct Deployment {
    pub rpc_url: String,
    pub chain_id: u64,
    pub private_key: String,
    pub state_view: Address,
    pub liquidity_router: Address,
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &"<redacted>")
            .field("state_view", &self.state_view)
            .field("liquidity_router", &self.liquidity_router)
            .finish()
    }
}

impl DeploymentConfig {
    /// Load a deployment file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment file {}", path.display()))?;
        let config: DeploymentConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Expand environment references and parse addresses.
    pub fn resolve(&self) -> Result<Deployment> {
        let private_key = expand_env(&self.signer.private_key)?;
        if private_key.contains("${") {
            anyhow::bail!("private key references an unset environment variable");
        }
        Ok(Deployment {
            rpc_url: expand_env(&self.chain.rpc_url)?,
            chain_id: self.chain.chain_id,
            private_key,
            state_view: parse_address("state_view", &expand_env(&self.contracts.state_view)?)?,
            liquidity_router: parse_address(
                "liquidity_router",
                &expand_env(&self.contracts.liquidity_router)?,
            )?,
        })
    }
}

impl Deployment {
    /// Build a deployment from RPC_URL, PRIVATE_KEY, STATE_VIEW,
    /// LIQUIDITY_ROUTER and CHAIN_ID (default 1).
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).with_context(|| format!("{name} not set"));
        let chain_id = match std::env::var("CHAIN_ID") {
            Ok(raw) => raw.parse().context("CHAIN_ID is not a number")?,
            Err(_) => 1,
        };
        Ok(Self {
            rpc_url: var("RPC_URL")?,
            chain_id,
            private_key: var("PRIVATE_KEY")?,
            state_view: parse_address("STATE_VIEW", &var("STATE_VIEW")?)?,
            liquidity_router: parse_address("LIQUIDITY_ROUTER", &var("LIQUIDITY_ROUTER")?)?,
        })
    }
}

fn parse_address(name: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .with_context(|| format!("{name} is not a valid address: {raw}"))
}

/// Expand ${VAR_NAME} patterns with environment variable values.
///
/// Unset variables are left in place.
fn expand_env(s: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")?;
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    Ok(result)
}
