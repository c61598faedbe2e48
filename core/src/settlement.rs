//! Pure payout arithmetic.
//!
//! Nothing here touches a ledger: callers pass in the status, the winner and
//! the two stakes, and get back who is owed what.

use serde::{Deserialize, Serialize};

use crate::config::ExcessPolicy;
use crate::error::{AmountError, GuardViolation};
use crate::ledger::EscrowStatus;
use crate::{Address, Amount, Result};

/// Why an amount is paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardKind {
    /// The locked pot, paid to the winner.
    Pot,
    /// A player's stake handed back.
    Refund,
    /// The part of the larger deposit above the smaller one.
    Excess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    pub recipient: Address,
    pub amount: Amount,
    pub kind: AwardKind,
}

/// Final disposition of an escrow's custody.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub awards: Vec<Award>,
    /// Custody that no award covers (only under [`ExcessPolicy::Strand`]).
    pub stranded: Amount,
}

impl Settlement {
    /// Everything paid to `recipient`, across all award kinds.
    pub fn amount_for(&self, recipient: &Address) -> Amount {
        let units = self
            .awards
            .iter()
            .filter(|a| &a.recipient == recipient)
            .map(|a| a.amount.units())
            .sum();
        Amount::from_units(units)
    }

    /// Total paid out.
    pub fn total(&self) -> Amount {
        Amount::from_units(self.awards.iter().map(|a| a.amount.units()).sum())
    }

    fn push(&mut self, recipient: &Address, amount: Amount, kind: AwardKind) {
        if !amount.is_zero() {
            self.awards.push(Award {
                recipient: recipient.clone(),
                amount,
                kind,
            });
        }
    }
}

/// One player's deposit; `amount` is zero if they never deposited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stake {
    pub player: Address,
    pub amount: Amount,
}

impl Stake {
    pub fn new(player: Address, amount: Amount) -> Self {
        Self { player, amount }
    }
}

/// `min(bet1, bet2)`, or zero while either side has not announced a bet.
pub fn minimum_bet(bet1: Amount, bet2: Amount) -> Amount {
    if bet1.is_zero() || bet2.is_zero() {
        Amount::ZERO
    } else {
        bet1.min(bet2)
    }
}

/// `2 × min_bet`.
pub fn pot_size(min_bet: Amount) -> Result<Amount> {
    Ok(min_bet.checked_mul(2).ok_or(AmountError::Overflow)?)
}

/// Excess returned the moment both deposits lock, under [`ExcessPolicy::RefundAtLock`].
pub fn excess_at_lock(stakes: &[Stake; 2], policy: ExcessPolicy) -> Option<Award> {
    if policy != ExcessPolicy::RefundAtLock {
        return None;
    }
    let (larger, excess) = larger_and_excess(stakes)?;
    Some(Award {
        recipient: larger.player.clone(),
        amount: excess,
        kind: AwardKind::Excess,
    })
}

fn larger_and_excess(stakes: &[Stake; 2]) -> Option<(&Stake, Amount)> {
    let [a, b] = stakes;
    if a.amount.is_zero() || b.amount.is_zero() || a.amount == b.amount {
        return None;
    }
    let larger = if a.amount > b.amount { a } else { b };
    Some((larger, a.amount.abs_diff(b.amount)))
}

/// Compute who gets what once the escrow reached a final status.
///
/// - `Completed` with a winner: the winner takes the pot (`2 × min`); the
///   excess follows `policy`.
/// - `Completed` without a winner (draw): every player gets back their own
///   deposit, not half the pot.
/// - `Cancelled`: every depositor gets back their own deposit.
///
/// Under `RefundAtLock` the excess left custody when the deposits locked, so
/// the settlement never lists it again: the larger depositor's draw or cancel
/// refund is `min`, and a decisive game pays only the pot.
pub fn payout(
    status: EscrowStatus,
    winner: Option<&Address>,
    stakes: &[Stake; 2],
    policy: ExcessPolicy,
) -> Result<Settlement> {
    let mut settlement = Settlement::default();
    let both = stakes.iter().all(|s| !s.amount.is_zero());
    let min = minimum_bet(stakes[0].amount, stakes[1].amount);
    let excess = larger_and_excess(stakes);

    match (status, winner) {
        (EscrowStatus::Completed, Some(winner)) => {
            settlement.push(winner, pot_size(min)?, AwardKind::Pot);
            if let Some((_, amount)) = excess {
                match policy {
                    ExcessPolicy::RefundAtLock => {}
                    ExcessPolicy::SweepToWinner => {
                        settlement.push(winner, amount, AwardKind::Excess)
                    }
                    ExcessPolicy::Strand => settlement.stranded = amount,
                }
            }
        }
        (EscrowStatus::Completed, None) | (EscrowStatus::Cancelled, _) => {
            if both && policy == ExcessPolicy::RefundAtLock {
                for stake in stakes {
                    settlement.push(&stake.player, min, AwardKind::Refund);
                }
            } else {
                for stake in stakes {
                    settlement.push(&stake.player, stake.amount, AwardKind::Refund);
                }
            }
        }
        (status, _) => {
            return Err(GuardViolation::WrongStatus {
                op: "release_funds",
                status,
            }
            .into())
        }
    }
    Ok(settlement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn stakes(a: u64, b: u64) -> [Stake; 2] {
        [
            Stake::new(addr("0x01"), Amount::from_units(a)),
            Stake::new(addr("0x02"), Amount::from_units(b)),
        ]
    }

    #[test]
    fn minimum_bet_treats_zero_as_unset() {
        let five = Amount::from_units(5);
        assert_eq!(minimum_bet(five, Amount::from_units(3)), Amount::from_units(3));
        assert_eq!(minimum_bet(five, Amount::ZERO), Amount::ZERO);
        assert_eq!(minimum_bet(Amount::ZERO, five), Amount::ZERO);
        assert_eq!(pot_size(Amount::from_units(3)).unwrap(), Amount::from_units(6));
        assert!(pot_size(Amount::from_units(u64::MAX)).is_err());
    }

    #[test]
    fn winner_takes_pot_and_excess_follows_policy() {
        let p1 = addr("0x01");
        let p2 = addr("0x02");

        let s = payout(EscrowStatus::Completed, Some(&p2), &stakes(5, 3), ExcessPolicy::Strand)
            .unwrap();
        assert_eq!(s.amount_for(&p2), Amount::from_units(6));
        assert_eq!(s.amount_for(&p1), Amount::ZERO);
        assert_eq!(s.stranded, Amount::from_units(2));

        let s = payout(
            EscrowStatus::Completed,
            Some(&p2),
            &stakes(5, 3),
            ExcessPolicy::SweepToWinner,
        )
        .unwrap();
        assert_eq!(s.amount_for(&p2), Amount::from_units(8));
        assert_eq!(s.stranded, Amount::ZERO);

        let s = payout(
            EscrowStatus::Completed,
            Some(&p2),
            &stakes(5, 3),
            ExcessPolicy::RefundAtLock,
        )
        .unwrap();
        // the excess went back to p1 at lock
        assert_eq!(s.amount_for(&p2), Amount::from_units(6));
        assert_eq!(s.amount_for(&p1), Amount::ZERO);
        assert_eq!(s.total(), Amount::from_units(6));
        assert_eq!(s.stranded, Amount::ZERO);
    }

    #[test]
    fn draw_refunds_own_deposits_not_half_the_pot() {
        let p1 = addr("0x01");
        let p2 = addr("0x02");
        for policy in [ExcessPolicy::Strand, ExcessPolicy::SweepToWinner] {
            let s = payout(EscrowStatus::Completed, None, &stakes(5, 3), policy).unwrap();
            assert_eq!(s.amount_for(&p1), Amount::from_units(5), "{policy:?}");
            assert_eq!(s.amount_for(&p2), Amount::from_units(3), "{policy:?}");
            assert_eq!(s.stranded, Amount::ZERO);
        }
    }

    #[test]
    fn refund_at_lock_never_pays_the_excess_twice() {
        let p1 = addr("0x01");
        let p2 = addr("0x02");
        let locked = excess_at_lock(&stakes(5, 3), ExcessPolicy::RefundAtLock).unwrap();
        for status in [EscrowStatus::Completed, EscrowStatus::Cancelled] {
            let s = payout(status, None, &stakes(5, 3), ExcessPolicy::RefundAtLock).unwrap();
            assert!(s.awards.iter().all(|a| a.kind == AwardKind::Refund));
            assert_eq!(s.amount_for(&p1), Amount::from_units(3));
            assert_eq!(s.amount_for(&p2), Amount::from_units(3));
            // custody left after the lock refund covers the release exactly
            assert_eq!(s.total().units() + locked.amount.units(), 8);
        }
    }

    #[test]
    fn cancel_refunds_only_depositors() {
        let s = payout(EscrowStatus::Cancelled, None, &stakes(7, 0), ExcessPolicy::RefundAtLock)
            .unwrap();
        assert_eq!(s.awards.len(), 1);
        assert_eq!(s.amount_for(&addr("0x01")), Amount::from_units(7));
        assert_eq!(s.awards[0].kind, AwardKind::Refund);

        let s = payout(EscrowStatus::Cancelled, None, &stakes(0, 0), ExcessPolicy::Strand).unwrap();
        assert!(s.awards.is_empty());
    }

    #[test]
    fn equal_stakes_have_no_excess() {
        let p1 = addr("0x01");
        let s = payout(EscrowStatus::Completed, Some(&p1), &stakes(4, 4), ExcessPolicy::Strand)
            .unwrap();
        assert_eq!(s.awards.len(), 1);
        assert_eq!(s.stranded, Amount::ZERO);
        assert!(excess_at_lock(&stakes(4, 4), ExcessPolicy::RefundAtLock).is_none());
        assert!(excess_at_lock(&stakes(5, 4), ExcessPolicy::Strand).is_none());

        let award = excess_at_lock(&stakes(4, 9), ExcessPolicy::RefundAtLock).unwrap();
        assert_eq!(award.recipient, addr("0x02"));
        assert_eq!(award.amount, Amount::from_units(5));
    }

    #[test]
    fn unsettled_statuses_are_rejected() {
        for status in [
            EscrowStatus::Pending,
            EscrowStatus::Funded,
            EscrowStatus::Playing,
            EscrowStatus::Disputed,
            EscrowStatus::TimedOut,
        ] {
            assert!(payout(status, None, &stakes(1, 1), ExcessPolicy::Strand).is_err());
        }
    }
}
