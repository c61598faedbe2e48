//! Escrow settlement for wagered peer-to-peer chess games.
//!
//! Two players deposit a stake with an escrow custodian, play, and the
//! custodian pays out according to the result. This crate holds the
//! deterministic part: the ledger, its state machine, and the payout
//! arithmetic. Chain transport lives in `gambit-client`.

/// Token amounts and the human/wire unit conversion
pub mod amount;
/// Side-pool bookkeeping for the market-maker betting flow
pub mod betting;
pub mod clock;
/// Per-escrow configuration
pub mod config;
pub mod error;
/// Boundary to the external chess rules engine
pub mod game;
/// Account addresses and game identifiers
pub mod identity;
/// JSON-facing escrow parameters and metadata
pub mod interface;
/// The escrow ledger and its invariants
pub mod ledger;
/// Guarded state transitions over a ledger
pub mod machine;
/// Pure payout arithmetic
pub mod settlement;
pub mod utils;

pub use amount::Amount;
pub use config::{EscrowConfig, ExcessPolicy};
pub use error::{EscrowError, FailureKind, GuardViolation};
pub use identity::{Address, GameId};
pub use interface::{EscrowMetadata, EscrowParams};
pub use ledger::{EscrowLedger, EscrowStatus, PlayerSlot, Resolution, Seat};
pub use machine::{Command, EscrowStateMachine, Notification, Observers};
pub use settlement::Settlement;

pub type Result<T> = std::result::Result<T, EscrowError>;
