use gambit_core::game::IllegalMove;
use gambit_core::{Address, EscrowError, FailureKind, GameId};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Escrow(#[from] EscrowError),
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("Escrow {0} must be reconciled with the chain before it accepts operations")]
    ReconcileRequired(Address),
    #[error("Missing {0} event in transaction receipt")]
    MissingEvent(String),
    #[error("No signing key for {0}")]
    SignerMismatch(Address),
    #[error("No escrow at {0}")]
    UnknownEscrow(Address),
    #[error("Game {0} is already registered")]
    GameExists(GameId),
    #[error("Game {0} is not registered")]
    UnknownGame(GameId),
    #[error("Game {0} is still in progress")]
    GameActive(GameId),
    #[error("Game {0} is already decided on the board")]
    GameDecided(GameId),
    #[error("It is not {0}'s turn")]
    OutOfTurn(Address),
    #[error(transparent)]
    IllegalMove(#[from] IllegalMove),
    #[error("Payload codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("URL parse error")]
    UrlParse(#[from] url::ParseError),
}

impl ClientError {
    /// Failure class, deciding whether a retry is safe.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Escrow(e) => e.kind(),
            Self::Transport(_) | Self::ReconcileRequired(_) | Self::MissingEvent(_) => {
                FailureKind::TransportFailure
            }
            _ => FailureKind::Invalid,
        }
    }
}

/// Submission or confirmation went wrong; the transaction may still land.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Node unreachable: {0}")]
    Unreachable(String),
    #[error("Transaction {hash} not confirmed after {waited_ms} ms")]
    ConfirmationTimeout { hash: String, waited_ms: u64 },
    #[error("Transaction {0} dropped by the node")]
    Dropped(String),
}

/// Entry-function payload could not be encoded or decoded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed function name {0:?}")]
    MalformedFunction(String),
    #[error("Unknown function {0:?}")]
    UnknownFunction(String),
    #[error("Payload targets module {found}, expected {expected}")]
    WrongModule { expected: Address, found: Address },
    #[error("{op}: missing argument {index}")]
    MissingArgument { op: String, index: usize },
    #[error("{op}: argument {index}: {reason}")]
    BadArgument {
        op: String,
        index: usize,
        reason: String,
    },
    #[error("Unexpected view value: {0}")]
    BadView(String),
}
