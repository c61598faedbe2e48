use std::collections::HashMap;
use std::time::Duration;

use gambit_core::{Address, EscrowError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{ClientError, TransportError};
use crate::interface::LiveConfig;
use crate::payload::{TxPayload, TxReceipt, ViewQuery};
use crate::{ChainAdapter, Result};

/// A transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: TxPayload,
    pub signature: String,
}

/// Signing capability, typically backed by a wallet.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Sign `tx` on behalf of `tx.sender`.
    ///
    /// # Errors
    /// [`ClientError::SignerMismatch`] if no key for the sender is available.
    async fn sign(&self, tx: &TxPayload) -> Result<SignedTransaction>;
}

/// Signing keys of local development accounts.
///
/// Signatures are keyed SHA-256 digests of the transaction, which only a
/// development node accepts.
#[derive(Default)]
pub struct Keyring {
    keys: HashMap<Address, Vec<u8>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, secret: impl Into<Vec<u8>>) -> &mut Self {
        self.keys.insert(address, secret.into());
        self
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.keys.contains_key(address)
    }
}

#[async_trait::async_trait]
impl Signer for Keyring {
    async fn sign(&self, tx: &TxPayload) -> Result<SignedTransaction> {
        let key = self
            .keys
            .get(&tx.sender)
            .ok_or_else(|| ClientError::SignerMismatch(tx.sender.clone()))?;
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(tx.hash(0).as_bytes());
        Ok(SignedTransaction {
            transaction: tx.clone(),
            signature: format!("0x{}", hex::encode(hasher.finalize())),
        })
    }
}

/// Execution state of a submitted transaction, as reported by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum TxStatus {
    Pending,
    Committed(TxReceipt),
    /// Executed, but the escrow module rejected it; nothing changed on chain.
    Aborted(EscrowError),
}

/// Fullnode capability: accept transactions, report their status, answer views.
#[async_trait::async_trait]
pub trait NodeClient: Send + Sync {
    /// Hand `tx` to the node and return its hash.
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<String>;

    async fn transaction_by_hash(&self, hash: &str) -> Result<TxStatus>;

    async fn view(&self, query: &ViewQuery) -> Result<Value>;
}

/// Adapter for a real chain: sign, submit, then poll until confirmed.
pub struct LiveAdapter<S, N> {
    signer: S,
    node: N,
    node_url: Url,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl<S: Signer, N: NodeClient> LiveAdapter<S, N> {
    pub fn new(signer: S, node: N, config: &LiveConfig) -> Result<Self> {
        let node_url = config.node_url()?;
        info!(%node_url, module = %config.module_address, "Using escrow module");
        Ok(Self {
            signer,
            node,
            node_url,
            poll_interval: config.poll_interval(),
            confirmation_timeout: config.confirmation_timeout(),
        })
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Poll `hash` until it is committed or aborted, bounded by the
    /// confirmation timeout.
    async fn wait_for_confirmation(&self, hash: &str) -> Result<TxReceipt> {
        match tokio::time::timeout(self.confirmation_timeout, self.poll(hash)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConfirmationTimeout {
                hash: hash.to_string(),
                waited_ms: self.confirmation_timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    async fn poll(&self, hash: &str) -> Result<TxReceipt> {
        loop {
            match self.node.transaction_by_hash(hash).await? {
                TxStatus::Pending => tokio::time::sleep(self.poll_interval).await,
                TxStatus::Committed(receipt) => return Ok(receipt),
                TxStatus::Aborted(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Signer, N: NodeClient> ChainAdapter for LiveAdapter<S, N> {
    /// Sign, submit and wait for `tx`.
    ///
    /// A confirmation timeout, or dropping this future while it waits,
    /// only gives up on the wait. The transaction has already reached the
    /// node and cannot be recalled; it may still commit later.
    #[instrument(skip(self, tx), fields(
        node = %self.node_url,
        function = %tx.payload.function,
        sender = %tx.sender
    ))]
    async fn submit(&self, tx: &TxPayload) -> Result<TxReceipt> {
        let signed = self.signer.sign(tx).await?;
        let hash = self.node.submit_transaction(&signed).await?;
        debug!(%hash, "Transaction submitted");
        let receipt = self.wait_for_confirmation(&hash).await?;
        info!(%hash, timestamp = receipt.timestamp, "Transaction committed");
        Ok(receipt)
    }

    async fn view(&self, query: &ViewQuery) -> Result<Value> {
        self.node.view(query).await
    }
}
