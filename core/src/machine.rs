//! Escrow state machine: guarded transitions over an [`EscrowLedger`].
//!
//! | From               | Command          | To                              |
//! |--------------------|------------------|---------------------------------|
//! | Pending            | `Deposit`        | Pending, or Funded once both in |
//! | Funded             | `SignGameStart`  | Funded                          |
//! | Funded             | `StartGame`      | Playing                         |
//! | Playing            | `CompleteGame`   | Completed                       |
//! | Playing            | `RaiseDispute`   | Disputed                        |
//! | Playing            | `CheckTimeout`   | TimedOut once the deadline passed |
//! | Disputed, TimedOut | `ResolveDispute` | Completed, or Cancelled         |
//! | Completed, Cancelled | `ReleaseFunds` | unchanged, settlement recorded  |
//! | not final          | `Cancel`         | Cancelled                       |
//!
//! A command is applied to a copy of the ledger and the copy replaces the
//! original only if every guard passed, so a failed command never leaves a
//! partial mutation behind.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AmountError, GuardViolation};
use crate::ledger::{ArbiterDecision, Dispute, EscrowLedger, EscrowStatus, Resolution, Seat};
use crate::settlement::{self, Stake};
use crate::{Address, Amount, EscrowError, Result};

/// An operation on an escrow, issued by some caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Lock the caller's stake.
    Deposit { amount: Amount },
    /// Record the caller's consent to start playing.
    SignGameStart,
    StartGame,
    /// `winner == None` together with `is_draw` records a draw.
    CompleteGame {
        winner: Option<Address>,
        is_draw: bool,
    },
    /// Compute and record the settlement of a finished escrow.
    ReleaseFunds,
    RaiseDispute { reason: String },
    ResolveDispute {
        resolution: Resolution,
        notes: String,
    },
    /// Time the game out if its deadline has passed.
    CheckTimeout,
    Cancel,
}

impl Command {
    /// Operation name, as used on the wire and in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::SignGameStart => "sign_to_start_game",
            Self::StartGame => "start_game",
            Self::CompleteGame { is_draw: true, .. } => "complete_game_as_draw",
            Self::CompleteGame { .. } => "complete_game",
            Self::ReleaseFunds => "release_funds",
            Self::RaiseDispute { .. } => "raise_dispute",
            Self::ResolveDispute { .. } => "resolve_dispute",
            Self::CheckTimeout => "check_timeout",
            Self::Cancel => "cancel_escrow",
        }
    }
}

/// Something observers are told about, in transition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StatusChanged {
        from: EscrowStatus,
        to: EscrowStatus,
    },
    WinnerDeclared(Address),
    TimedOut,
}

type StatusHook = Box<dyn Fn(EscrowStatus, EscrowStatus) + Send + Sync>;
type WinnerHook = Box<dyn Fn(&Address) + Send + Sync>;
type TimeoutHook = Box<dyn Fn() + Send + Sync>;

/// Synchronous notification hooks, one of each kind per ledger.
///
/// Hooks run inline on the thread that applied the transition.
#[derive(Default)]
pub struct Observers {
    on_status_change: Option<StatusHook>,
    on_winner_declared: Option<WinnerHook>,
    on_timeout: Option<TimeoutHook>,
}

impl Observers {
    pub fn on_status_change(
        &mut self,
        hook: impl Fn(EscrowStatus, EscrowStatus) + Send + Sync + 'static,
    ) -> &mut Self {
        self.on_status_change = Some(Box::new(hook));
        self
    }

    pub fn on_winner_declared(&mut self, hook: impl Fn(&Address) + Send + Sync + 'static) -> &mut Self {
        self.on_winner_declared = Some(Box::new(hook));
        self
    }

    pub fn on_timeout(&mut self, hook: impl Fn() + Send + Sync + 'static) -> &mut Self {
        self.on_timeout = Some(Box::new(hook));
        self
    }

    /// Deliver `notes` in order.
    pub fn dispatch(&self, notes: &[Notification]) {
        for note in notes {
            match note {
                Notification::StatusChanged { from, to } => {
                    if let Some(hook) = &self.on_status_change {
                        hook(*from, *to);
                    }
                }
                Notification::WinnerDeclared(winner) => {
                    if let Some(hook) = &self.on_winner_declared {
                        hook(winner);
                    }
                }
                Notification::TimedOut => {
                    if let Some(hook) = &self.on_timeout {
                        hook();
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("on_status_change", &self.on_status_change.is_some())
            .field("on_winner_declared", &self.on_winner_declared.is_some())
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

/// Owns one ledger and its observers; the only writer of the ledger.
#[derive(Debug)]
pub struct EscrowStateMachine {
    ledger: EscrowLedger,
    observers: Observers,
}

impl EscrowStateMachine {
    pub fn new(ledger: EscrowLedger) -> Self {
        Self {
            ledger,
            observers: Observers::default(),
        }
    }

    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    pub fn status(&self) -> EscrowStatus {
        self.ledger.status()
    }

    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    /// Apply `command` on behalf of `caller` at unix time `now`.
    ///
    /// On success the ledger is replaced, observers are notified and the
    /// notifications are returned. On failure nothing changes.
    pub fn apply(
        &mut self,
        caller: &Address,
        command: &Command,
        now: u64,
    ) -> Result<Vec<Notification>> {
        let mut next = self.ledger.clone();
        let notes = transition(&mut next, caller, command, now)?;
        debug!(
            escrow = %self.ledger.escrow(),
            op = command.name(),
            from = %self.ledger.status(),
            to = %next.status(),
            "escrow transition committed"
        );
        self.ledger = next;
        self.observers.dispatch(&notes);
        Ok(notes)
    }

    /// Dry-run `command`: same guards and result as [`Self::apply`], no commit
    /// and no notifications.
    pub fn preview(&self, caller: &Address, command: &Command, now: u64) -> Result<EscrowLedger> {
        let mut next = self.ledger.clone();
        transition(&mut next, caller, command, now)?;
        Ok(next)
    }

    /// Replace the ledger with one read back from the chain.
    ///
    /// Observers see a single status change if the status moved.
    pub fn adopt(&mut self, ledger: EscrowLedger) -> Vec<Notification> {
        let mut notes = Vec::new();
        if ledger.status() != self.ledger.status() {
            notes.push(Notification::StatusChanged {
                from: self.ledger.status(),
                to: ledger.status(),
            });
        }
        if let (None, Some(winner)) = (self.ledger.winner(), ledger.winner()) {
            notes.push(Notification::WinnerDeclared(winner.clone()));
        }
        if ledger.status() == EscrowStatus::TimedOut
            && self.ledger.status() != EscrowStatus::TimedOut
        {
            notes.push(Notification::TimedOut);
        }
        self.ledger = ledger;
        self.observers.dispatch(&notes);
        notes
    }
}

fn require_status(
    ledger: &EscrowLedger,
    op: &'static str,
    allowed: &[EscrowStatus],
) -> std::result::Result<(), GuardViolation> {
    if allowed.contains(&ledger.status()) {
        Ok(())
    } else {
        Err(GuardViolation::WrongStatus {
            op,
            status: ledger.status(),
        })
    }
}

fn require_participant(
    ledger: &EscrowLedger,
    caller: &Address,
) -> std::result::Result<Seat, GuardViolation> {
    ledger
        .seat_of(caller)
        .ok_or_else(|| GuardViolation::NotParticipant(caller.clone()))
}

fn move_to(ledger: &mut EscrowLedger, to: EscrowStatus, notes: &mut Vec<Notification>) {
    let from = ledger.status();
    ledger.set_status(to);
    notes.push(Notification::StatusChanged { from, to });
}

fn declare_winner(ledger: &mut EscrowLedger, winner: Address, notes: &mut Vec<Notification>) {
    ledger.set_winner(winner.clone());
    notes.push(Notification::WinnerDeclared(winner));
}

fn stakes(ledger: &EscrowLedger) -> [Stake; 2] {
    let [p1, p2] = ledger.players();
    [
        Stake::new(p1.address.clone(), p1.stake()),
        Stake::new(p2.address.clone(), p2.stake()),
    ]
}

fn transition(
    ledger: &mut EscrowLedger,
    caller: &Address,
    command: &Command,
    now: u64,
) -> Result<Vec<Notification>> {
    let op = command.name();
    let mut notes = Vec::new();

    match command {
        Command::Deposit { amount } => {
            require_status(ledger, op, &[EscrowStatus::Pending])?;
            let seat = require_participant(ledger, caller)?;
            if ledger.seat(seat).has_deposited {
                return Err(GuardViolation::AlreadyDeposited(caller.clone()).into());
            }
            if *amount < ledger.minimum_bet() {
                return Err(GuardViolation::BelowMinimum {
                    amount: *amount,
                    minimum: ledger.minimum_bet(),
                }
                .into());
            }
            // keeps the pot representable
            if amount.checked_mul(2).is_none() {
                return Err(AmountError::Overflow.into());
            }

            ledger.record_deposit(seat, *amount, now);
            if ledger.are_both_deposits_complete() {
                let stakes = stakes(ledger);
                if let Some(award) =
                    settlement::excess_at_lock(&stakes, ledger.config().excess_policy)
                {
                    ledger.set_excess_refund(award);
                }
                move_to(ledger, EscrowStatus::Funded, &mut notes);
            }
        }

        Command::SignGameStart => {
            require_status(ledger, op, &[EscrowStatus::Funded])?;
            let seat = require_participant(ledger, caller)?;
            if ledger.seat(seat).signed_game_start {
                return Err(GuardViolation::AlreadySigned(caller.clone()).into());
            }
            ledger.record_signature(seat);
        }

        Command::StartGame => {
            if ledger.status() == EscrowStatus::Pending {
                return Err(GuardViolation::DepositsIncomplete.into());
            }
            require_status(ledger, op, &[EscrowStatus::Funded])?;
            ledger.set_game_start(now);
            move_to(ledger, EscrowStatus::Playing, &mut notes);
        }

        Command::CompleteGame { winner, is_draw } => {
            require_status(ledger, op, &[EscrowStatus::Playing])?;
            if *is_draw != winner.is_none() {
                return Err(GuardViolation::DrawMismatch.into());
            }
            if let Some(winner) = winner {
                require_participant(ledger, winner)?;
            }
            move_to(ledger, EscrowStatus::Completed, &mut notes);
            if let Some(winner) = winner {
                declare_winner(ledger, winner.clone(), &mut notes);
            }
        }

        Command::RaiseDispute { reason } => {
            require_status(ledger, op, &[EscrowStatus::Playing])?;
            require_participant(ledger, caller)?;
            ledger.set_dispute(Dispute {
                raised_by: caller.clone(),
                reason: reason.clone(),
                raised_at: now,
            });
            move_to(ledger, EscrowStatus::Disputed, &mut notes);
        }

        Command::ResolveDispute { resolution, notes: decision_notes } => {
            if caller != ledger.arbiter() {
                warn!(
                    target: "security",
                    escrow = %ledger.escrow(),
                    %caller,
                    "dispute resolution attempted by a non-arbiter"
                );
                return Err(EscrowError::ArbiterMisuse {
                    caller: caller.clone(),
                });
            }
            require_status(ledger, op, &[EscrowStatus::Disputed, EscrowStatus::TimedOut])?;
            ledger.set_decision(ArbiterDecision {
                resolution: *resolution,
                notes: decision_notes.clone(),
                resolved_at: now,
            });
            match resolution {
                Resolution::Player1 | Resolution::Player2 => {
                    let seat = if *resolution == Resolution::Player1 {
                        Seat::Player1
                    } else {
                        Seat::Player2
                    };
                    let winner = ledger.seat(seat).address.clone();
                    move_to(ledger, EscrowStatus::Completed, &mut notes);
                    declare_winner(ledger, winner, &mut notes);
                }
                Resolution::Draw => move_to(ledger, EscrowStatus::Completed, &mut notes),
                Resolution::Cancel => move_to(ledger, EscrowStatus::Cancelled, &mut notes),
            }
        }

        Command::CheckTimeout => {
            require_status(ledger, op, &[EscrowStatus::Playing])?;
            let expired = ledger.deadline().is_some_and(|deadline| now >= deadline);
            if expired {
                move_to(ledger, EscrowStatus::TimedOut, &mut notes);
                notes.push(Notification::TimedOut);
            }
        }

        Command::ReleaseFunds => {
            require_status(ledger, op, &[EscrowStatus::Completed, EscrowStatus::Cancelled])?;
            if ledger.funds_released() {
                return Err(GuardViolation::FundsAlreadyReleased.into());
            }
            let settlement = settlement::payout(
                ledger.status(),
                ledger.winner(),
                &stakes(ledger),
                ledger.config().excess_policy,
            )?;
            ledger.set_settlement(settlement);
        }

        Command::Cancel => {
            if ledger.status().is_final() {
                return Err(GuardViolation::WrongStatus {
                    op,
                    status: ledger.status(),
                }
                .into());
            }
            move_to(ledger, EscrowStatus::Cancelled, &mut notes);
        }
    }

    Ok(notes)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::{EscrowConfig, ExcessPolicy};
    use crate::utils::assert_err;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn p1() -> Address {
        addr("0x01")
    }

    fn p2() -> Address {
        addr("0x02")
    }

    fn arbiter() -> Address {
        addr("0xa0")
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn machine(policy: ExcessPolicy) -> EscrowStateMachine {
        let cfg = EscrowConfig::new(units(2), arbiter(), policy).with_timeout_secs(100);
        let ledger = EscrowLedger::new(addr("0xe5"), p1(), p2(), cfg, 0).unwrap();
        EscrowStateMachine::new(ledger)
    }

    fn playing() -> EscrowStateMachine {
        let mut m = machine(ExcessPolicy::Strand);
        m.apply(&p1(), &Command::Deposit { amount: units(5) }, 1).unwrap();
        m.apply(&p2(), &Command::Deposit { amount: units(3) }, 2).unwrap();
        m.apply(&p1(), &Command::StartGame, 10).unwrap();
        m
    }

    #[test]
    fn deposit_guards() {
        let mut m = machine(ExcessPolicy::Strand);
        assert_err(
            m.apply(&p1(), &Command::Deposit { amount: units(1) }, 1),
            GuardViolation::BelowMinimum {
                amount: units(1),
                minimum: units(2),
            },
        );
        assert_err(
            m.apply(&arbiter(), &Command::Deposit { amount: units(5) }, 1),
            GuardViolation::NotParticipant(arbiter()),
        );
        m.apply(&p1(), &Command::Deposit { amount: units(5) }, 1).unwrap();
        assert_err(
            m.apply(&p1(), &Command::Deposit { amount: units(5) }, 2),
            GuardViolation::AlreadyDeposited(p1()),
        );
        assert_err(
            m.apply(&p2(), &Command::Deposit { amount: units(u64::MAX) }, 2),
            AmountError::Overflow,
        );
        assert_eq!(m.status(), EscrowStatus::Pending);
        assert_eq!(m.ledger().player1().deposit_timestamp, Some(1));
    }

    #[test]
    fn second_deposit_funds_the_escrow() {
        let mut m = machine(ExcessPolicy::Strand);
        let notes = m.apply(&p2(), &Command::Deposit { amount: units(3) }, 1).unwrap();
        assert!(notes.is_empty());
        let notes = m.apply(&p1(), &Command::Deposit { amount: units(5) }, 2).unwrap();
        assert_eq!(
            notes,
            vec![Notification::StatusChanged {
                from: EscrowStatus::Pending,
                to: EscrowStatus::Funded
            }]
        );
        assert_eq!(m.ledger().total_escrowed(), units(6));
        assert!(m.ledger().excess_refund().is_none());
        assert_err(
            m.apply(&p1(), &Command::Deposit { amount: units(5) }, 3),
            GuardViolation::WrongStatus {
                op: "deposit",
                status: EscrowStatus::Funded,
            },
        );
    }

    #[test]
    fn refund_at_lock_records_excess() {
        let mut m = machine(ExcessPolicy::RefundAtLock);
        m.apply(&p1(), &Command::Deposit { amount: units(5) }, 1).unwrap();
        m.apply(&p2(), &Command::Deposit { amount: units(3) }, 2).unwrap();
        let excess = m.ledger().excess_refund().unwrap();
        assert_eq!(excess.recipient, p1());
        assert_eq!(excess.amount, units(2));
        assert_eq!(m.ledger().balance(), units(6));

        m.apply(&p2(), &Command::Cancel, 3).unwrap();
        m.apply(&p2(), &Command::ReleaseFunds, 4).unwrap();
        let refunds = m.ledger().settlement().unwrap();
        assert_eq!(refunds.amount_for(&p1()), units(3));
        assert_eq!(refunds.amount_for(&p2()), units(3));
        assert_eq!(m.ledger().paid_to(&p1()), units(5));
        assert_eq!(m.ledger().balance(), Amount::ZERO);
    }

    #[test]
    fn signatures_are_recorded_once() {
        let mut m = machine(ExcessPolicy::Strand);
        assert_err(
            m.apply(&p1(), &Command::SignGameStart, 0),
            GuardViolation::WrongStatus {
                op: "sign_to_start_game",
                status: EscrowStatus::Pending,
            },
        );
        m.apply(&p1(), &Command::Deposit { amount: units(2) }, 1).unwrap();
        m.apply(&p2(), &Command::Deposit { amount: units(2) }, 1).unwrap();
        m.apply(&p1(), &Command::SignGameStart, 2).unwrap();
        assert!(m.ledger().player1().signed_game_start);
        assert!(!m.ledger().player2().signed_game_start);
        assert_err(
            m.apply(&p1(), &Command::SignGameStart, 3),
            GuardViolation::AlreadySigned(p1()),
        );
    }

    #[test]
    fn start_requires_both_deposits() {
        let mut m = machine(ExcessPolicy::Strand);
        m.apply(&p1(), &Command::Deposit { amount: units(5) }, 1).unwrap();
        let before = m.ledger().clone();
        assert_err(
            m.apply(&p1(), &Command::StartGame, 2),
            GuardViolation::DepositsIncomplete,
        );
        assert_eq!(m.ledger(), &before);
    }

    #[test]
    fn start_sets_deadline() {
        let m = playing();
        assert_eq!(m.status(), EscrowStatus::Playing);
        assert_eq!(m.ledger().game_start_timestamp(), Some(10));
        assert_eq!(m.ledger().deadline(), Some(110));
        assert_eq!(m.ledger().time_remaining(60), Some(50));
        assert_eq!(m.ledger().time_remaining(500), Some(0));
    }

    #[test]
    fn completion_validates_winner_and_draw_flag() {
        let mut m = playing();
        assert_err(
            m.apply(&p1(), &Command::CompleteGame { winner: Some(arbiter()), is_draw: false }, 20),
            GuardViolation::NotParticipant(arbiter()),
        );
        assert_err(
            m.apply(&p1(), &Command::CompleteGame { winner: Some(p1()), is_draw: true }, 20),
            GuardViolation::DrawMismatch,
        );
        assert_err(
            m.apply(&p1(), &Command::CompleteGame { winner: None, is_draw: false }, 20),
            GuardViolation::DrawMismatch,
        );
        let notes = m
            .apply(&p1(), &Command::CompleteGame { winner: Some(p2()), is_draw: false }, 20)
            .unwrap();
        assert_eq!(
            notes,
            vec![
                Notification::StatusChanged {
                    from: EscrowStatus::Playing,
                    to: EscrowStatus::Completed
                },
                Notification::WinnerDeclared(p2()),
            ]
        );
        assert_eq!(m.ledger().winner(), Some(&p2()));
    }

    #[test]
    fn release_is_single_shot() {
        let mut m = playing();
        assert_err(
            m.apply(&p1(), &Command::ReleaseFunds, 11),
            GuardViolation::WrongStatus {
                op: "release_funds",
                status: EscrowStatus::Playing,
            },
        );
        m.apply(&p1(), &Command::CompleteGame { winner: Some(p1()), is_draw: false }, 20)
            .unwrap();
        m.apply(&p1(), &Command::ReleaseFunds, 21).unwrap();
        let settlement = m.ledger().settlement().unwrap();
        assert_eq!(settlement.amount_for(&p1()), units(6));
        assert_eq!(settlement.stranded, units(2));
        assert_eq!(m.ledger().balance(), units(2));
        assert_err(
            m.apply(&p1(), &Command::ReleaseFunds, 22),
            GuardViolation::FundsAlreadyReleased,
        );
    }

    #[test]
    fn timeout_only_after_deadline() {
        let mut m = playing();
        let notes = m.apply(&p1(), &Command::CheckTimeout, 109).unwrap();
        assert!(notes.is_empty());
        assert_eq!(m.status(), EscrowStatus::Playing);

        let notes = m.apply(&p1(), &Command::CheckTimeout, 110).unwrap();
        assert_eq!(notes.last(), Some(&Notification::TimedOut));
        assert_eq!(m.status(), EscrowStatus::TimedOut);

        assert_err(
            m.apply(&p1(), &Command::CheckTimeout, 200),
            GuardViolation::WrongStatus {
                op: "check_timeout",
                status: EscrowStatus::TimedOut,
            },
        );
    }

    #[test]
    fn arbiter_resolves_timed_out_game() {
        let mut m = playing();
        m.apply(&p1(), &Command::CheckTimeout, 500).unwrap();
        let resolve = Command::ResolveDispute {
            resolution: Resolution::Player2,
            notes: "player1 abandoned".into(),
        };
        assert_err(
            m.apply(&p2(), &resolve, 501),
            EscrowError::ArbiterMisuse { caller: p2() },
        );
        m.apply(&arbiter(), &resolve, 502).unwrap();
        assert_eq!(m.status(), EscrowStatus::Completed);
        assert_eq!(m.ledger().winner(), Some(&p2()));
        assert_eq!(m.ledger().decision().unwrap().notes, "player1 abandoned");
    }

    #[test]
    fn arbiter_draw_and_cancel() {
        let mut m = playing();
        m.apply(&p1(), &Command::RaiseDispute { reason: "illegal move".into() }, 30)
            .unwrap();
        assert_eq!(m.ledger().dispute().unwrap().raised_by, p1());
        m.apply(
            &arbiter(),
            &Command::ResolveDispute {
                resolution: Resolution::Draw,
                notes: String::new(),
            },
            31,
        )
        .unwrap();
        assert_eq!(m.status(), EscrowStatus::Completed);
        assert_eq!(m.ledger().winner(), None);

        let mut m = playing();
        m.apply(&p2(), &Command::RaiseDispute { reason: "disconnect".into() }, 30)
            .unwrap();
        m.apply(
            &arbiter(),
            &Command::ResolveDispute {
                resolution: Resolution::Cancel,
                notes: String::new(),
            },
            31,
        )
        .unwrap();
        assert_eq!(m.status(), EscrowStatus::Cancelled);
    }

    #[test]
    fn only_participants_dispute() {
        let mut m = playing();
        assert_err(
            m.apply(&arbiter(), &Command::RaiseDispute { reason: "x".into() }, 30),
            GuardViolation::NotParticipant(arbiter()),
        );
    }

    #[test]
    fn cancel_is_rejected_once_final() {
        let mut m = machine(ExcessPolicy::Strand);
        m.apply(&p1(), &Command::Cancel, 1).unwrap();
        assert_eq!(m.status(), EscrowStatus::Cancelled);
        assert_err(
            m.apply(&p1(), &Command::Cancel, 2),
            GuardViolation::WrongStatus {
                op: "cancel_escrow",
                status: EscrowStatus::Cancelled,
            },
        );

        let mut m = playing();
        m.apply(&p1(), &Command::CompleteGame { winner: None, is_draw: true }, 20)
            .unwrap();
        assert!(m.apply(&p1(), &Command::Cancel, 21).is_err());
    }

    #[test]
    fn observers_see_transitions_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut m = machine(ExcessPolicy::Strand);
        {
            let status_log = Arc::clone(&seen);
            let winner_log = Arc::clone(&seen);
            m.observers_mut()
                .on_status_change(move |from, to| {
                    status_log.lock().unwrap().push(format!("{from}->{to}"))
                })
                .on_winner_declared(move |w| winner_log.lock().unwrap().push(format!("winner {w}")));
        }
        m.apply(&p1(), &Command::Deposit { amount: units(2) }, 1).unwrap();
        m.apply(&p2(), &Command::Deposit { amount: units(2) }, 1).unwrap();
        m.apply(&p1(), &Command::StartGame, 2).unwrap();
        m.apply(&p1(), &Command::CompleteGame { winner: Some(p1()), is_draw: false }, 3)
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "pending->funded",
                "funded->playing",
                "playing->completed",
                "winner 0x01",
            ]
        );
    }

    #[test]
    fn preview_does_not_commit() {
        let m = playing();
        let next = m
            .preview(&p1(), &Command::CompleteGame { winner: None, is_draw: true }, 20)
            .unwrap();
        assert_eq!(next.status(), EscrowStatus::Completed);
        assert_eq!(m.status(), EscrowStatus::Playing);
    }

    #[test]
    fn adopt_reports_chain_progress() {
        let mut local = playing();
        let mut remote = playing();
        remote.apply(&p1(), &Command::CheckTimeout, 1_000).unwrap();
        let notes = local.adopt(remote.ledger().clone());
        assert_eq!(
            notes,
            vec![
                Notification::StatusChanged {
                    from: EscrowStatus::Playing,
                    to: EscrowStatus::TimedOut
                },
                Notification::TimedOut,
            ]
        );
        assert_eq!(local.ledger(), remote.ledger());
    }
}
