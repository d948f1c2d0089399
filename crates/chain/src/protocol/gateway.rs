//! Alloy-backed gateway shared by both protocol families.

use crate::signer::TransactionSender;
use alloy::primitives::Address;
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Lending gateway that reads over HTTP and writes through a [`TransactionSender`].
///
/// Without a sender the gateway is read-only and every liquidation write fails.
#[derive(Debug, Clone)]
pub struct EvmLendingGateway {
    /// RPC URL for read-only calls
    pub(crate) read_url: String,
    /// Transaction sender (optional, for liquidations)
    sender: Option<Arc<TransactionSender>>,
}

impl EvmLendingGateway {
    /// Create a read-only gateway.
    pub fn new(read_url: impl Into<String>) -> Self {
        Self {
            read_url: read_url.into(),
            sender: None,
        }
    }

    /// Create with a transaction sender for liquidations.
    pub fn with_sender(read_url: impl Into<String>, sender: Arc<TransactionSender>) -> Self {
        Self {
            read_url: read_url.into(),
            sender: Some(sender),
        }
    }

    /// Send `call` to the adapter at `to` and wait for its receipt.
    pub(crate) async fn send<C: SolCall>(&self, to: Address, call: &C) -> Result<TransactionReceipt> {
        let sender = self
            .sender
            .as_ref()
            .context("gateway has no transaction sender configured")?;
        sender.send_call(to, call).await
    }
}
