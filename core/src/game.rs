//! Boundary to the external chess rules engine.
//!
//! Move legality is not computed here. A [`ChessRules`] implementation is
//! injected and reports the resulting position and whether the game ended.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{EscrowLedger, Seat};
use crate::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// White always sits in the player1 slot, black in player2.
    pub fn seat(&self) -> Seat {
        match self {
            Self::White => Seat::Player1,
            Self::Black => Seat::Player2,
        }
    }
}

/// How a game ended, as reported by the rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Checkmate { winner: Side },
    Stalemate,
    /// Any other drawn ending (repetition, fifty moves, insufficient material, agreement).
    Draw,
}

/// Result of applying one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveVerdict {
    /// Position after the move, in whatever notation the engine uses (usually FEN).
    pub position: String,
    pub terminal: Option<Terminal>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal move {mv}: {reason}")]
pub struct IllegalMove {
    pub mv: String,
    pub reason: String,
}

/// An off-the-shelf move validator.
pub trait ChessRules: Send + Sync {
    /// Starting position of a new game.
    fn initial_position(&self) -> String;

    /// Apply `mv` to `position`, rejecting illegal moves.
    fn play(&self, position: &str, mv: &str) -> Result<MoveVerdict, IllegalMove>;
}

/// Final result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameOutcome {
    pub fn winning_side(&self) -> Option<Side> {
        match self {
            Self::WhiteWins => Some(Side::White),
            Self::BlackWins => Some(Side::Black),
            Self::Draw => None,
        }
    }

    /// Address of the winner in `ledger`, `None` for a draw.
    pub fn winner_in(&self, ledger: &EscrowLedger) -> Option<Address> {
        self.winning_side()
            .map(|side| ledger.seat(side.seat()).address.clone())
    }
}

impl From<Terminal> for GameOutcome {
    fn from(value: Terminal) -> Self {
        match value {
            Terminal::Checkmate { winner: Side::White } => Self::WhiteWins,
            Terminal::Checkmate { winner: Side::Black } => Self::BlackWins,
            Terminal::Stalemate | Terminal::Draw => Self::Draw,
        }
    }
}
