use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gambit_core::EscrowError;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::live::{NodeClient, SignedTransaction, TxStatus};
use super::memory::MemoryChain;
use crate::error::{ClientError, TransportError};
use crate::payload::{TxReceipt, ViewQuery};
use crate::Result;

enum Outcome {
    Committed(TxReceipt),
    Aborted(EscrowError),
}

struct Submitted {
    outcome: Outcome,
    // `None` while the node withholds the result
    visible_at: Option<Instant>,
}

/// In-process development node for the live adapter.
///
/// Transactions execute on submission against a [`MemoryChain`] and are
/// reported as committed one block time later. Faults can be injected to
/// exercise transport failures: an offline node refuses everything, a
/// stalled node executes transactions but never reports them.
pub struct DevnetNode {
    chain: Arc<MemoryChain>,
    block_time: Duration,
    sequence: AtomicU64,
    txs: Mutex<HashMap<String, Submitted>>,
    offline: AtomicBool,
    stalled: AtomicBool,
}

impl DevnetNode {
    pub fn new(chain: Arc<MemoryChain>, block_time: Duration) -> Self {
        Self {
            chain,
            block_time,
            sequence: AtomicU64::new(0),
            txs: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
        }
    }

    pub fn chain(&self) -> &Arc<MemoryChain> {
        &self.chain
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While stalled, transactions still execute but stay pending forever.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("devnet node is offline".into()).into());
        }
        Ok(())
    }

    fn txs(&self) -> MutexGuard<'_, HashMap<String, Submitted>> {
        self.txs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl NodeClient for DevnetNode {
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<String> {
        self.ensure_online()?;
        if tx.signature.is_empty() {
            return Err(ClientError::SignerMismatch(tx.transaction.sender.clone()));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = tx.transaction.hash(sequence);
        let outcome = match self.chain.execute(&tx.transaction) {
            Ok(execution) => Outcome::Committed(TxReceipt {
                hash: hash.clone(),
                timestamp: execution.timestamp,
                events: execution.events,
            }),
            Err(ClientError::Escrow(e)) => {
                debug!(%hash, error = %e, "transaction aborted");
                Outcome::Aborted(e)
            }
            Err(e) => return Err(e),
        };
        let visible_at = if self.stalled.load(Ordering::SeqCst) {
            warn!(%hash, "stalled node withholds transaction result");
            None
        } else {
            Some(Instant::now() + self.block_time)
        };
        self.txs().insert(
            hash.clone(),
            Submitted {
                outcome,
                visible_at,
            },
        );
        Ok(hash)
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<TxStatus> {
        self.ensure_online()?;
        let txs = self.txs();
        let submitted = txs
            .get(hash)
            .ok_or_else(|| TransportError::Dropped(hash.to_string()))?;
        let status = match (&submitted.visible_at, &submitted.outcome) {
            (Some(at), Outcome::Committed(receipt)) if Instant::now() >= *at => {
                TxStatus::Committed(receipt.clone())
            }
            (Some(at), Outcome::Aborted(e)) if Instant::now() >= *at => TxStatus::Aborted(e.clone()),
            _ => TxStatus::Pending,
        };
        Ok(status)
    }

    async fn view(&self, query: &ViewQuery) -> Result<Value> {
        self.ensure_online()?;
        self.chain.query(query)
    }
}
