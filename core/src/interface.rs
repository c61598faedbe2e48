//! Types for JSON (de)serialization of escrow parameters and metadata.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::EscrowConfig;
use crate::ledger::{EscrowLedger, EscrowStatus};
use crate::{Address, GameId, Result};

/// Reads a JSON-encoded file from the given `path` and deserializes into type `T`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be opened, read, or parsed.
///
/// # Examples
///
/// ```ignore
/// # use gambit_core::interface::{load_escrow_data, EscrowParams};
/// let params: EscrowParams = load_escrow_data("./escrow_params.json")?;
/// ```
pub fn load_escrow_data<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("loading escrow data: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parsing JSON from {:?}", path))
}

/// Writes `data` (serializable) as pretty-printed JSON to the given `path`,
/// creating parent directories as needed.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be created or data cannot be serialized.
pub fn save_escrow_data<P, T>(path: P, data: &T) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("creating file {:?}", path))?;
    serde_json::to_writer_pretty(file, data)
        .with_context(|| format!("serializing to JSON to {:?}", path))
}

/// Parameters required to **create** an escrow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscrowParams {
    /// The game the escrow is wagered on.
    pub game_id: GameId,
    /// Plays white.
    pub player1: Address,
    /// Plays black.
    pub player2: Address,
    #[serde(flatten)]
    pub config: EscrowConfig,
}

impl EscrowParams {
    /// Build the initial ledger for an escrow held at `escrow`.
    pub fn into_ledger(self, escrow: Address, now: u64) -> Result<EscrowLedger> {
        EscrowLedger::new(escrow, self.player1, self.player2, self.config, now)
    }
}

/// Metadata **returned** from escrow creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscrowMetadata {
    /// Address of the escrow custodian.
    pub escrow: Address,
    /// Creation parameters, kept for later operations.
    #[serde(flatten)]
    pub params: EscrowParams,
    /// Where in the lifecycle the escrow was when this was written.
    pub status: EscrowStatus,
    pub created_at: u64,
}

impl EscrowMetadata {
    pub fn new(params: EscrowParams, ledger: &EscrowLedger) -> Self {
        Self {
            escrow: ledger.escrow().clone(),
            params,
            status: ledger.status(),
            created_at: ledger.created_at(),
        }
    }
}
