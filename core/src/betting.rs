//! Side-pool bookkeeping for the market-maker betting flow.
//!
//! The agent keeps a simplified bet record per game plus an audit trail of
//! finished games. It never moves funds: payouts are computed with the same
//! settlement arithmetic as the escrow, and [`BettingAgent::reconcile`]
//! reports when a pool drifted away from the escrow that is authoritative.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ExcessPolicy;
use crate::error::BetError;
use crate::game::GameOutcome;
use crate::ledger::{EscrowLedger, EscrowStatus};
use crate::settlement::{self, Settlement, Stake};
use crate::{Address, Amount, GameId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSide {
    pub address: Address,
    pub amount: Amount,
}

/// Winner of a finished bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetWinner {
    Draw,
    Player(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub game_id: GameId,
    pub player1: BetSide,
    pub player2: BetSide,
    pub status: BetStatus,
    /// `2 × min(amount1, amount2)`, fixed when the bet is created.
    pub pool_amount: Amount,
    pub winner: Option<BetWinner>,
}

/// Write-once record of how a game ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVerification {
    pub game_id: GameId,
    pub moves: Vec<String>,
    pub result: GameOutcome,
    pub timestamp: u64,
}

/// Difference between a bet pool and the escrow it shadows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolDrift {
    pub pool_amount: Amount,
    pub escrowed: Amount,
}

impl PoolDrift {
    pub fn is_consistent(&self) -> bool {
        self.pool_amount == self.escrowed
    }
}

#[derive(Debug, Default)]
pub struct BettingAgent {
    bets: HashMap<GameId, BetRecord>,
    verifications: HashMap<GameId, GameVerification>,
}

impl BettingAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize_bet(
        &mut self,
        game_id: GameId,
        player1: Address,
        amount1: Amount,
        player2: Address,
        amount2: Amount,
    ) -> Result<&BetRecord> {
        if self.bets.contains_key(&game_id) {
            return Err(BetError::AlreadyExists(game_id).into());
        }
        if amount1.is_zero() || amount2.is_zero() {
            return Err(BetError::ZeroAmount.into());
        }
        let pool_amount = settlement::pot_size(amount1.min(amount2))?;
        info!(%game_id, %pool_amount, "bet initialized");

        let record = BetRecord {
            game_id: game_id.clone(),
            player1: BetSide {
                address: player1,
                amount: amount1,
            },
            player2: BetSide {
                address: player2,
                amount: amount2,
            },
            status: BetStatus::Pending,
            pool_amount,
            winner: None,
        };
        Ok(self.bets.entry(game_id).or_insert(record))
    }

    pub fn activate_bet(&mut self, game_id: &GameId) -> Result<()> {
        let bet = self.bet_in(game_id, BetStatus::Pending)?;
        bet.status = BetStatus::Active;
        debug!(%game_id, "bet activated");
        Ok(())
    }

    /// Record the result of an active bet's game, together with its move list.
    pub fn complete_game(
        &mut self,
        game_id: &GameId,
        result: GameOutcome,
        moves: Vec<String>,
        now: u64,
    ) -> Result<()> {
        let bet = self.bet_in(game_id, BetStatus::Active)?;
        bet.winner = Some(match result {
            GameOutcome::WhiteWins => BetWinner::Player(bet.player1.address.clone()),
            GameOutcome::BlackWins => BetWinner::Player(bet.player2.address.clone()),
            GameOutcome::Draw => BetWinner::Draw,
        });
        bet.status = BetStatus::Completed;

        self.verifications.insert(
            game_id.clone(),
            GameVerification {
                game_id: game_id.clone(),
                moves,
                result,
                timestamp: now,
            },
        );
        info!(%game_id, ?result, "bet completed");
        Ok(())
    }

    pub fn cancel_bet(&mut self, game_id: &GameId) -> Result<()> {
        let bet = self.bet_mut(game_id)?;
        match bet.status {
            BetStatus::Pending | BetStatus::Active => {
                bet.status = BetStatus::Cancelled;
                Ok(())
            }
            status => Err(BetError::WrongStatus {
                game: game_id.clone(),
                status,
            }
            .into()),
        }
    }

    pub fn bet(&self, game_id: &GameId) -> Option<&BetRecord> {
        self.bets.get(game_id)
    }

    pub fn verification(&self, game_id: &GameId) -> Option<&GameVerification> {
        self.verifications.get(game_id)
    }

    /// Who the pool owes what, using the escrow's settlement arithmetic.
    pub fn settlement(&self, game_id: &GameId, policy: ExcessPolicy) -> Result<Settlement> {
        let bet = self
            .bets
            .get(game_id)
            .ok_or_else(|| BetError::UnknownGame(game_id.clone()))?;
        let stakes = [
            Stake::new(bet.player1.address.clone(), bet.player1.amount),
            Stake::new(bet.player2.address.clone(), bet.player2.amount),
        ];
        let (status, winner) = match (&bet.status, &bet.winner) {
            (BetStatus::Completed, Some(BetWinner::Player(w))) => (EscrowStatus::Completed, Some(w)),
            (BetStatus::Completed, _) => (EscrowStatus::Completed, None),
            (BetStatus::Cancelled, _) => (EscrowStatus::Cancelled, None),
            (status, _) => {
                return Err(BetError::WrongStatus {
                    game: game_id.clone(),
                    status: *status,
                }
                .into())
            }
        };
        settlement::payout(status, winner, &stakes, policy)
    }

    /// Compare the pool fixed at bet creation with what the escrow actually locked.
    pub fn reconcile(&self, game_id: &GameId, ledger: &EscrowLedger) -> Result<PoolDrift> {
        let bet = self
            .bets
            .get(game_id)
            .ok_or_else(|| BetError::UnknownGame(game_id.clone()))?;
        let drift = PoolDrift {
            pool_amount: bet.pool_amount,
            escrowed: ledger.total_escrowed(),
        };
        if !drift.is_consistent() {
            info!(
                %game_id,
                pool = %drift.pool_amount,
                escrowed = %drift.escrowed,
                "bet pool differs from escrow"
            );
        }
        Ok(drift)
    }

    fn bet_mut(&mut self, game_id: &GameId) -> Result<&mut BetRecord> {
        self.bets
            .get_mut(game_id)
            .ok_or_else(|| BetError::UnknownGame(game_id.clone()).into())
    }

    fn bet_in(&mut self, game_id: &GameId, expected: BetStatus) -> Result<&mut BetRecord> {
        let bet = self.bet_mut(game_id)?;
        if bet.status != expected {
            return Err(BetError::WrongStatus {
                game: game_id.clone(),
                status: bet.status,
            }
            .into());
        }
        Ok(bet)
    }
}
