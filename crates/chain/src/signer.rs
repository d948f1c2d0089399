//! Signing account for the engine's on-chain writes.
//!
//! One invocation can issue several writes back to back (withdraw then
//! deposit, absorb then buy), so nonces are reserved locally instead of
//! being read from the node per transaction. Any failed or reverted write
//! resyncs the tracker from the pending nonce on chain.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Locally reserved nonces for one account.
#[derive(Debug)]
pub struct NonceTracker(AtomicU64);

impl NonceTracker {
    pub fn new(next: u64) -> Self {
        Self(AtomicU64::new(next))
    }

    /// Take the next nonce.
    pub fn reserve(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Next nonce that [`reserve`](Self::reserve) would hand out.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn resync(&self, next: u64) {
        self.0.store(next, Ordering::SeqCst);
    }
}

/// Signs contract calls and waits for their receipts.
pub struct TransactionSender {
    rpc_url: String,
    wallet: EthereumWallet,
    /// Account that signs every write
    pub address: Address,
    chain_id: u64,
    nonces: NonceTracker,
}

impl fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSender")
            .field("rpc_url", &self.rpc_url)
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("next_nonce", &self.nonces.peek())
            .finish_non_exhaustive()
    }
}

impl TransactionSender {
    /// Load the signing key and read the account's pending nonce.
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .context("private key is not a valid secp256k1 key")?;
        let address = signer.address();

        let provider = ProviderBuilder::new().on_http(rpc_url.parse().context("invalid rpc url")?);
        let next = provider
            .get_transaction_count(address)
            .await
            .context("failed to read account nonce")?;
        info!(%address, chain_id, next_nonce = next, "Signing account ready");

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            nonces: NonceTracker::new(next),
        })
    }

    /// Sign and send `call` to `to`, returning the receipt of a successful
    /// execution. A revert is an error.
    pub async fn send_call<C: SolCall>(&self, to: Address, call: &C) -> Result<TransactionReceipt> {
        let started = Instant::now();
        let nonce = self.nonces.reserve();
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(Bytes::from(call.abi_encode()))
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);
        debug!(%to, nonce, function = C::SIGNATURE, "Sending call");

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.parse()?);

        let pending = match provider.send_transaction(request).await {
            Ok(pending) => pending,
            Err(e) => {
                self.resync_nonce().await;
                return Err(e).with_context(|| format!("{} to {to} was not accepted", C::SIGNATURE));
            }
        };
        let receipt = pending.get_receipt().await?;

        if !receipt.status() {
            warn!(tx_hash = %receipt.transaction_hash, function = C::SIGNATURE, "Call reverted");
            self.resync_nonce().await;
            bail!("{} reverted in {}", C::SIGNATURE, receipt.transaction_hash);
        }

        info!(
            tx_hash = %receipt.transaction_hash,
            function = C::SIGNATURE,
            block = receipt.block_number.unwrap_or_default(),
            gas_used = receipt.gas_used,
            elapsed_ms = started.elapsed().as_millis(),
            "Call confirmed"
        );
        Ok(receipt)
    }

    async fn resync_nonce(&self) {
        let url = match self.rpc_url.parse() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot resync nonce");
                return;
            }
        };
        match ProviderBuilder::new()
            .on_http(url)
            .get_transaction_count(self.address)
            .await
        {
            Ok(next) => self.nonces.resync(next),
            Err(e) => warn!(error = %e, "Nonce resync failed"),
        }
    }
}
