use thiserror::Error;

use crate::betting::BetStatus;
use crate::identity::{Address, GameId};
use crate::ledger::EscrowStatus;
use crate::Amount;

/// Escrow-related errors.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum EscrowError {
    /// A transition was attempted whose precondition does not hold.
    #[error("guard violation: {0}")]
    Guard(GuardViolation),

    /// `resolve_dispute` was called by someone other than the arbiter.
    #[error("arbiter misuse: {caller} is not the arbiter of this escrow")]
    ArbiterMisuse { caller: Address },

    #[error("invalid configuration: {0}")]
    Config(ConfigError),

    #[error("identity error: {0}")]
    Identity(IdentityError),

    #[error("amount error: {0}")]
    Amount(AmountError),

    #[error("bet error: {0}")]
    Bet(BetError),
}

/// Failed preconditions of the escrow state machine.
///
/// A guard violation never mutates the ledger, so the same call
/// can be retried once the precondition holds.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GuardViolation {
    #[error("`{op}` is not allowed while the escrow is {status}")]
    WrongStatus {
        op: &'static str,
        status: EscrowStatus,
    },

    #[error("{0} is not a participant of this escrow")]
    NotParticipant(Address),

    #[error("{0} has already deposited")]
    AlreadyDeposited(Address),

    #[error("deposit of {amount} is below the minimum bet of {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },

    #[error("both players must deposit before the game can start")]
    DepositsIncomplete,

    #[error("{0} has already signed the game start")]
    AlreadySigned(Address),

    #[error("a draw carries no winner and a decisive result requires one")]
    DrawMismatch,

    #[error("funds have already been released")]
    FundsAlreadyReleased,
}

/// Errors raised while validating an escrow configuration.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("minimum bet must be non-zero")]
    ZeroMinimumBet,

    #[error("timeout duration must be non-zero")]
    ZeroTimeout,

    #[error("both player slots hold the same address {0}")]
    DuplicatePlayers(Address),

    #[error("arbiter {0} must not be one of the players")]
    ArbiterIsPlayer(Address),
}

/// Errors that might occur while parsing an `Address` or a `GameId`.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("address must start with `0x`")]
    MissingPrefix,

    #[error("cannot parse identity from empty string")]
    EmptyIdentity,

    #[error("address is {0} bytes long, at most 32 are allowed")]
    TooLong(usize),
}

/// Errors when parsing or computing with an `Amount`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AmountError {
    #[error("amount overflow")]
    Overflow,

    #[error("at most 8 fractional digits are supported, got {0}")]
    TooManyDecimals(usize),

    #[error("malformed amount: {0:?}")]
    Malformed(String),
}

/// Errors of the side-pool bookkeeping kept by the betting agent.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BetError {
    #[error("no bet recorded for game {0}")]
    UnknownGame(GameId),

    #[error("a bet for game {0} already exists")]
    AlreadyExists(GameId),

    #[error("bet for game {game} is {status:?}")]
    WrongStatus { game: GameId, status: BetStatus },

    #[error("bet amounts must be non-zero")]
    ZeroAmount,
}

/// Coarse classification of a failure, telling callers how to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Precondition failed; state untouched, safe to retry later.
    GuardViolation,
    /// A non-arbiter tried to resolve a dispute.
    ArbiterMisuse,
    /// Submission or confirmation failed; on-chain state is ambiguous
    /// and must be reconciled before retrying.
    TransportFailure,
    /// Malformed input or configuration.
    Invalid,
}

impl FailureKind {
    /// Whether the failed call may be repeated without a prior reconciliation read.
    pub fn is_retry_safe(&self) -> bool {
        !matches!(self, Self::TransportFailure)
    }
}

impl EscrowError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Guard(_) | Self::Bet(_) => FailureKind::GuardViolation,
            Self::ArbiterMisuse { .. } => FailureKind::ArbiterMisuse,
            Self::Config(_) | Self::Identity(_) | Self::Amount(_) => FailureKind::Invalid,
        }
    }
}

impl From<GuardViolation> for EscrowError {
    fn from(value: GuardViolation) -> Self {
        Self::Guard(value)
    }
}

impl From<ConfigError> for EscrowError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<IdentityError> for EscrowError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

impl From<AmountError> for EscrowError {
    fn from(value: AmountError) -> Self {
        Self::Amount(value)
    }
}

impl From<BetError> for EscrowError {
    fn from(value: BetError) -> Self {
        Self::Bet(value)
    }
}
