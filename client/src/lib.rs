//! Async side of escrow settlement: chain adapters, per-escrow clients,
//! the game registry and the chess session that drives them.

use serde_json::Value;

pub use error::{ClientError, CodecError, Result, TransportError};
pub use escrow::EscrowClient;
pub use registry::GameRegistry;
pub use session::{PlayedMove, Session};

use crate::payload::{TxPayload, TxReceipt, ViewQuery};

pub mod adapters;
pub mod error;
pub mod escrow;
/// JSON-facing adapter configuration
pub mod interface;
/// Wire encoding of escrow calls, views and events
pub mod payload;
pub mod registry;
pub mod session;
pub mod timer;

/// Transport for escrow calls to a chain, real or simulated.
///
/// Implementations decide how a transaction is signed, submitted and
/// confirmed; callers only see the confirmed receipt.
#[async_trait::async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Submit `tx` and wait until it is confirmed.
    ///
    /// # Returns
    /// The receipt, with the events the call emitted and the chain time it
    /// executed at.
    ///
    /// # Errors
    /// - [`ClientError::Escrow`] if the escrow module rejected the call;
    ///   nothing changed on chain.
    /// - [`ClientError::Transport`] if the outcome is unknown. A submitted
    ///   transaction cannot be recalled, so it may still commit.
    async fn submit(&self, tx: &TxPayload) -> Result<TxReceipt>;

    /// Evaluate a read-only view function.
    async fn view(&self, query: &ViewQuery) -> Result<Value>;
}
