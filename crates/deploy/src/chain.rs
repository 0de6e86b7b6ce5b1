//! Signing chain client and attached contract handles.

use std::time::Duration;

use alloy_core::{primitives::Address, sol_types::SolCall};
use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use url::Url;

/// Interval between receipt lookups of a sent transaction.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Receipt lookups before giving up on a sent transaction.
const RECEIPT_POLL_ATTEMPTS: usize = 150;

/// Wallet and RPC connection used to talk to deployed contracts.
#[derive(Clone)]
pub struct ChainClient {
    provider: DynProvider,
    signer: Address,
    chain_id: u64,
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("signer", &self.signer)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

impl ChainClient {
    /// Connect to `rpc_url` with a local signer built from `private_key`.
    pub async fn connect(rpc_url: &Url, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .context("Failed to parse private key")?;
        let signer_address = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url.clone());

        let chain_id = provider
            .get_chain_id()
            .await
            .with_context(|| format!("Failed to fetch chain id from {rpc_url}"))?;

        tracing::debug!(signer = %signer_address, chain_id, "Chain client connected");

        Ok(Self {
            provider: provider.erased(),
            signer: signer_address,
            chain_id,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_provider(provider: DynProvider, signer: Address, chain_id: u64) -> Self {
        Self {
            provider,
            signer,
            chain_id,
        }
    }

    /// Address transactions are sent from.
    pub fn signer_address(&self) -> Address {
        self.signer
    }

    /// Chain id reported by the RPC endpoint.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Whether any bytecode lives at `address`.
    pub async fn has_code(&self, address: Address) -> Result<bool> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .with_context(|| format!("Failed to fetch code at {address}"))?;
        Ok(!code.is_empty())
    }

    /// Handle on the contract at `address`.
    pub fn at(&self, address: Address) -> ContractInstance<'_> {
        ContractInstance {
            client: self,
            address,
        }
    }
}

/// A deployed contract attached to a [`ChainClient`].
#[derive(Debug, Clone, Copy)]
pub struct ContractInstance<'a> {
    client: &'a ChainClient,
    address: Address,
}

impl ContractInstance<'_> {
    pub fn address(&self) -> Address {
        self.address
    }

    fn request<C: SolCall>(&self, call: &C) -> TransactionRequest {
        TransactionRequest::default()
            .with_to(self.address)
            .with_input(call.abi_encode())
    }

    /// Execute a read-only call and decode its return value.
    pub async fn read<C: SolCall>(&self, call: &C) -> Result<C::Return> {
        let output = self
            .client
            .provider
            .call(self.request(call))
            .await
            .with_context(|| format!("Failed to call {} on {}", C::SIGNATURE, self.address))?;

        C::abi_decode_returns(&output)
            .with_context(|| format!("Failed to decode {} result", C::SIGNATURE))
    }

    /// Send a state-changing call and wait for a successful receipt.
    pub async fn send<C: SolCall>(&self, call: &C) -> Result<TransactionReceipt> {
        let pending = self
            .client
            .provider
            .send_transaction(self.request(call))
            .await
            .with_context(|| format!("Failed to send {} to {}", C::SIGNATURE, self.address))?;

        let tx_hash = *pending.tx_hash();
        tracing::debug!(tx_hash = %tx_hash, call = C::SIGNATURE, "Transaction sent");

        let provider = &self.client.provider;
        let receipt = (move || async move {
            provider
                .get_transaction_receipt(tx_hash)
                .await
                .with_context(|| format!("Failed to get receipt of {tx_hash}"))?
                .with_context(|| format!("Transaction {tx_hash} not mined yet"))
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(RECEIPT_POLL_INTERVAL)
                .with_max_times(RECEIPT_POLL_ATTEMPTS),
        )
        .sleep(tokio::time::sleep)
        .await?;

        if !receipt.status() {
            anyhow::bail!(
                "Transaction {} ({}) reverted",
                receipt.transaction_hash,
                C::SIGNATURE
            );
        }

        Ok(receipt)
    }
}
