//! The per-game escrow ledger and its invariants.
//!
//! The ledger is a plain value: it is only ever mutated by
//! [`crate::machine::EscrowStateMachine`], which applies each transition to a
//! copy and commits the copy on success.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EscrowConfig;
use crate::settlement::{Award, Settlement};
use crate::{Address, Amount, Result};

/// Lifecycle of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Waiting for one or both deposits.
    Pending,
    /// Both players deposited; the game has not started.
    Funded,
    /// The game is in progress and the timeout clock is running.
    Playing,
    /// A result was recorded, by the game or by the arbiter.
    Completed,
    /// A player contested the game; waiting for the arbiter.
    Disputed,
    /// Funds go back to the depositors.
    Cancelled,
    /// The game outlived its timeout; waiting for the arbiter.
    TimedOut,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Funded => "funded",
            Self::Playing => "playing",
            Self::Completed => "completed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }

    /// No transition leaves a final status.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "funded" => Ok(Self::Funded),
            "playing" => Ok(Self::Playing),
            "completed" => Ok(Self::Completed),
            "disputed" => Ok(Self::Disputed),
            "cancelled" => Ok(Self::Cancelled),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(format!("unknown escrow status {other:?}")),
        }
    }
}

/// Which of the two player slots an address occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Player1,
    Player2,
}

impl Seat {
    fn index(self) -> usize {
        match self {
            Self::Player1 => 0,
            Self::Player2 => 1,
        }
    }
}

/// Deposit bookkeeping of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub address: Address,
    pub deposit_amount: Amount,
    pub has_deposited: bool,
    pub deposit_timestamp: Option<u64>,
    pub signed_game_start: bool,
}

impl PlayerSlot {
    fn new(address: Address) -> Self {
        Self {
            address,
            deposit_amount: Amount::ZERO,
            has_deposited: false,
            deposit_timestamp: None,
            signed_game_start: false,
        }
    }

    /// Amount currently counted as deposited (zero before the deposit lands).
    pub fn stake(&self) -> Amount {
        if self.has_deposited {
            self.deposit_amount
        } else {
            Amount::ZERO
        }
    }
}

/// A contested game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub raised_by: Address,
    pub reason: String,
    pub raised_at: u64,
}

/// How the arbiter settled a dispute or a timed-out game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Player1,
    Player2,
    Draw,
    Cancel,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player1 => "player1",
            Self::Player2 => "player2",
            Self::Draw => "draw",
            Self::Cancel => "cancel",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "player1" => Ok(Self::Player1),
            "player2" => Ok(Self::Player2),
            "draw" => Ok(Self::Draw),
            "cancel" => Ok(Self::Cancel),
            other => Err(format!("unknown resolution {other:?}")),
        }
    }
}

/// Arbiter decision, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterDecision {
    pub resolution: Resolution,
    pub notes: String,
    pub resolved_at: u64,
}

/// Complete escrow state of one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowLedger {
    escrow: Address,
    players: [PlayerSlot; 2],
    status: EscrowStatus,
    config: EscrowConfig,
    winner: Option<Address>,
    created_at: u64,
    game_start_timestamp: Option<u64>,
    dispute: Option<Dispute>,
    decision: Option<ArbiterDecision>,
    excess_refund: Option<Award>,
    settlement: Option<Settlement>,
}

impl EscrowLedger {
    /// Create a Pending ledger held by `escrow` for a game between two players.
    pub fn new(
        escrow: Address,
        player1: Address,
        player2: Address,
        config: EscrowConfig,
        now: u64,
    ) -> Result<Self> {
        config.validate(&player1, &player2)?;
        Ok(Self {
            escrow,
            players: [PlayerSlot::new(player1), PlayerSlot::new(player2)],
            status: EscrowStatus::Pending,
            config,
            winner: None,
            created_at: now,
            game_start_timestamp: None,
            dispute: None,
            decision: None,
            excess_refund: None,
            settlement: None,
        })
    }

    /// A fresh Pending ledger for a new game between the same parties.
    ///
    /// `self` is left as-is so finished games remain available for audit.
    pub fn rematch(&self, escrow: Address, now: u64) -> Result<Self> {
        Self::new(
            escrow,
            self.players[0].address.clone(),
            self.players[1].address.clone(),
            self.config.clone(),
            now,
        )
    }

    /// Address of the escrow custodian.
    pub fn escrow(&self) -> &Address {
        &self.escrow
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn minimum_bet(&self) -> Amount {
        self.config.minimum_bet
    }

    pub fn arbiter(&self) -> &Address {
        &self.config.arbiter
    }

    pub fn player1(&self) -> &PlayerSlot {
        &self.players[0]
    }

    pub fn player2(&self) -> &PlayerSlot {
        &self.players[1]
    }

    pub fn players(&self) -> &[PlayerSlot; 2] {
        &self.players
    }

    pub fn seat(&self, seat: Seat) -> &PlayerSlot {
        &self.players[seat.index()]
    }

    /// Seat of `address`, if it is one of the two players.
    pub fn seat_of(&self, address: &Address) -> Option<Seat> {
        if &self.players[0].address == address {
            Some(Seat::Player1)
        } else if &self.players[1].address == address {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    pub fn player_info(&self, address: &Address) -> Option<&PlayerSlot> {
        self.seat_of(address).map(|seat| self.seat(seat))
    }

    pub fn is_participant(&self, address: &Address) -> bool {
        self.seat_of(address).is_some()
    }

    /// `None` means "no winner yet" or "draw"; `status` tells which.
    pub fn winner(&self) -> Option<&Address> {
        self.winner.as_ref()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn game_start_timestamp(&self) -> Option<u64> {
        self.game_start_timestamp
    }

    pub fn dispute(&self) -> Option<&Dispute> {
        self.dispute.as_ref()
    }

    pub fn decision(&self) -> Option<&ArbiterDecision> {
        self.decision.as_ref()
    }

    /// Excess handed back when both deposits locked under `RefundAtLock`.
    pub fn excess_refund(&self) -> Option<&Award> {
        self.excess_refund.as_ref()
    }

    pub fn settlement(&self) -> Option<&Settlement> {
        self.settlement.as_ref()
    }

    pub fn funds_released(&self) -> bool {
        self.settlement.is_some()
    }

    pub fn are_both_deposits_complete(&self) -> bool {
        self.players.iter().all(|p| p.has_deposited)
    }

    /// The pot: `2 × min(deposit1, deposit2)` once both deposited, zero before.
    pub fn total_escrowed(&self) -> Amount {
        if !self.are_both_deposits_complete() {
            return Amount::ZERO;
        }
        let min = self.players[0]
            .deposit_amount
            .min(self.players[1].deposit_amount);
        min.checked_mul(2).unwrap_or(Amount::ZERO)
    }

    /// Custody still held by the escrow: deposits minus the lock-time excess
    /// refund minus the settlement.
    pub fn balance(&self) -> Amount {
        let deposited = self.players[0].stake().units() + self.players[1].stake().units();
        Amount::from_units(deposited.saturating_sub(self.paid_out()))
    }

    /// Everything `recipient` has been paid, at lock and at release.
    pub fn paid_to(&self, recipient: &Address) -> Amount {
        let at_lock = self
            .excess_refund
            .as_ref()
            .filter(|a| &a.recipient == recipient)
            .map_or(0, |a| a.amount.units());
        let at_release = self
            .settlement
            .as_ref()
            .map_or(0, |s| s.amount_for(recipient).units());
        Amount::from_units(at_lock + at_release)
    }

    fn paid_out(&self) -> u64 {
        let at_lock = self.excess_refund.as_ref().map_or(0, |a| a.amount.units());
        let at_release = self.settlement.as_ref().map_or(0, |s| s.total().units());
        at_lock + at_release
    }

    /// Unix time after which a game in play may be timed out.
    pub fn deadline(&self) -> Option<u64> {
        self.game_start_timestamp
            .map(|start| start.saturating_add(self.config.timeout_secs))
    }

    /// Seconds left on the game clock; `None` unless the game is in play.
    pub fn time_remaining(&self, now: u64) -> Option<u64> {
        if self.status != EscrowStatus::Playing {
            return None;
        }
        self.deadline().map(|deadline| deadline.saturating_sub(now))
    }

    /// Verify the structural invariants of the ledger.
    ///
    /// Returns the first violated invariant. Ledgers built by the state
    /// machine always pass; this is meant for ledgers read back from a chain.
    pub fn check_invariants(&self) -> std::result::Result<(), &'static str> {
        let [p1, p2] = &self.players;
        if p1.address == p2.address {
            return Err("players must be distinct");
        }
        if self.is_participant(&self.config.arbiter) {
            return Err("arbiter must not be a player");
        }
        for p in &self.players {
            if p.has_deposited {
                if p.deposit_amount < self.config.minimum_bet {
                    return Err("deposit below minimum bet");
                }
                if p.deposit_timestamp.is_none() {
                    return Err("deposit without timestamp");
                }
            } else if !p.deposit_amount.is_zero() || p.deposit_timestamp.is_some() {
                return Err("deposit fields set without a deposit");
            }
        }

        let both = self.are_both_deposits_complete();
        match self.status {
            EscrowStatus::Pending if both => return Err("pending with both deposits"),
            EscrowStatus::Funded
            | EscrowStatus::Playing
            | EscrowStatus::Completed
            | EscrowStatus::Disputed
            | EscrowStatus::TimedOut
                if !both =>
            {
                return Err("past pending without both deposits")
            }
            _ => {}
        }

        match self.status {
            EscrowStatus::Pending | EscrowStatus::Funded if self.game_start_timestamp.is_some() => {
                return Err("game start recorded before play");
            }
            EscrowStatus::Playing | EscrowStatus::Disputed | EscrowStatus::TimedOut
                if self.game_start_timestamp.is_none() =>
            {
                return Err("game in play without a start time");
            }
            _ => {}
        }

        if let Some(winner) = &self.winner {
            if !self.is_participant(winner) {
                return Err("winner is not a participant");
            }
            if self.status != EscrowStatus::Completed {
                return Err("winner recorded before completion");
            }
        }
        if self.settlement.is_some() && !self.status.is_final() {
            return Err("funds released before a final status");
        }
        let deposited = self.players[0].stake().units() + self.players[1].stake().units();
        let stranded = self.settlement.as_ref().map_or(0, |s| s.stranded.units());
        if self.paid_out() + stranded > deposited {
            return Err("payouts exceed deposits");
        }
        Ok(())
    }

    pub(crate) fn record_deposit(&mut self, seat: Seat, amount: Amount, now: u64) {
        let slot = &mut self.players[seat.index()];
        slot.deposit_amount = amount;
        slot.has_deposited = true;
        slot.deposit_timestamp = Some(now);
    }

    pub(crate) fn record_signature(&mut self, seat: Seat) {
        self.players[seat.index()].signed_game_start = true;
    }

    pub(crate) fn set_status(&mut self, status: EscrowStatus) {
        self.status = status;
    }

    pub(crate) fn set_winner(&mut self, winner: Address) {
        self.winner = Some(winner);
    }

    pub(crate) fn set_game_start(&mut self, now: u64) {
        self.game_start_timestamp = Some(now);
    }

    pub(crate) fn set_dispute(&mut self, dispute: Dispute) {
        self.dispute = Some(dispute);
    }

    pub(crate) fn set_decision(&mut self, decision: ArbiterDecision) {
        self.decision = Some(decision);
    }

    pub(crate) fn set_excess_refund(&mut self, award: Award) {
        self.excess_refund = Some(award);
    }

    pub(crate) fn set_settlement(&mut self, settlement: Settlement) {
        self.settlement = Some(settlement);
    }
}
