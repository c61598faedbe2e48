use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gambit_core::clock::Clock;
use serde_json::Value;
use tracing::{debug, instrument};

use super::memory::MemoryChain;
use crate::interface::SimulatedConfig;
use crate::payload::{TxPayload, TxReceipt, ViewQuery};
use crate::{ChainAdapter, Result};

/// In-memory adapter for demos and tests: no signer, no node.
///
/// Every submission resolves after the configured delay, standing in for
/// block confirmation latency. Views answer immediately.
pub struct SimulatedAdapter {
    chain: Arc<MemoryChain>,
    delay: Duration,
    submitted: AtomicU64,
}

impl SimulatedAdapter {
    pub fn new(chain: Arc<MemoryChain>, delay: Duration) -> Self {
        Self {
            chain,
            delay,
            submitted: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &SimulatedConfig, clock: Arc<dyn Clock>) -> Self {
        let chain = MemoryChain::new(config.module_address.clone(), clock);
        Self::new(Arc::new(chain), config.confirmation_delay())
    }

    pub fn chain(&self) -> &Arc<MemoryChain> {
        &self.chain
    }
}

#[async_trait::async_trait]
impl ChainAdapter for SimulatedAdapter {
    #[instrument(skip(self, tx), fields(function = %tx.payload.function, sender = %tx.sender))]
    async fn submit(&self, tx: &TxPayload) -> Result<TxReceipt> {
        tokio::time::sleep(self.delay).await;
        let sequence = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        let execution = self.chain.execute(tx)?;
        let hash = tx.hash(sequence);
        debug!(%hash, "simulated transaction confirmed");
        Ok(TxReceipt {
            hash,
            timestamp: execution.timestamp,
            events: execution.events,
        })
    }

    async fn view(&self, query: &ViewQuery) -> Result<Value> {
        self.chain.query(query)
    }
}
