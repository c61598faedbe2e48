use gambit_core::error::GuardViolation;
use gambit_core::settlement::AwardKind;
use gambit_core::utils::assert_err;
use gambit_core::{
    Address, Amount, Command, EscrowConfig, EscrowLedger, EscrowStateMachine, EscrowStatus,
    ExcessPolicy, FailureKind, Resolution,
};
use proptest::prelude::*;

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn p1() -> Address {
    addr("0x1111")
}

fn p2() -> Address {
    addr("0x2222")
}

fn arbiter() -> Address {
    addr("0xa4b1")
}

fn tokens(n: u64) -> Amount {
    Amount::from_whole(n).unwrap()
}

fn machine_with(policy: ExcessPolicy) -> EscrowStateMachine {
    let config = EscrowConfig::new(tokens(1), arbiter(), policy);
    let ledger = EscrowLedger::new(addr("0xe5c0"), p1(), p2(), config, 1_700_000_000).unwrap();
    EscrowStateMachine::new(ledger)
}

fn machine() -> EscrowStateMachine {
    machine_with(ExcessPolicy::Strand)
}

fn funded_5_3(m: &mut EscrowStateMachine) {
    m.apply(&p1(), &Command::Deposit { amount: tokens(5) }, 10).unwrap();
    m.apply(&p2(), &Command::Deposit { amount: tokens(3) }, 11).unwrap();
}

#[test]
fn decisive_game_pays_pot_to_winner() {
    let mut m = machine();
    funded_5_3(&mut m);
    assert_eq!(m.status(), EscrowStatus::Funded);
    assert_eq!(m.ledger().total_escrowed(), tokens(6));

    m.apply(&p1(), &Command::StartGame, 20).unwrap();
    assert_eq!(m.status(), EscrowStatus::Playing);

    m.apply(
        &p1(),
        &Command::CompleteGame {
            winner: Some(p1()),
            is_draw: false,
        },
        30,
    )
    .unwrap();
    assert_eq!(m.status(), EscrowStatus::Completed);
    assert_eq!(m.ledger().winner(), Some(&p1()));

    m.apply(&p1(), &Command::ReleaseFunds, 31).unwrap();
    let settlement = m.ledger().settlement().unwrap();
    let pot: Vec<_> = settlement
        .awards
        .iter()
        .filter(|a| a.kind == AwardKind::Pot)
        .collect();
    assert_eq!(pot.len(), 1);
    assert_eq!(pot[0].recipient, p1());
    assert_eq!(pot[0].amount, tokens(6));
}

#[test]
fn draw_refunds_each_players_own_deposit() {
    let mut m = machine();
    funded_5_3(&mut m);
    m.apply(&p1(), &Command::StartGame, 20).unwrap();
    m.apply(
        &p2(),
        &Command::CompleteGame {
            winner: None,
            is_draw: true,
        },
        30,
    )
    .unwrap();
    assert_eq!(m.status(), EscrowStatus::Completed);
    assert_eq!(m.ledger().winner(), None);

    m.apply(&p2(), &Command::ReleaseFunds, 31).unwrap();
    let settlement = m.ledger().settlement().unwrap();
    // not an even {3, 3} split of the pot
    assert_eq!(settlement.amount_for(&p1()), tokens(5));
    assert_eq!(settlement.amount_for(&p2()), tokens(3));
    assert_eq!(m.ledger().balance(), Amount::ZERO);
}

#[test]
fn start_with_one_deposit_is_rejected() {
    let mut m = machine();
    m.apply(&p1(), &Command::Deposit { amount: tokens(5) }, 10).unwrap();

    let err = m.apply(&p1(), &Command::StartGame, 11).unwrap_err();
    assert_eq!(err.kind(), FailureKind::GuardViolation);
    assert!(err.kind().is_retry_safe());
    assert_eq!(err, GuardViolation::DepositsIncomplete.into());
    assert_eq!(m.status(), EscrowStatus::Pending);
}

#[test]
fn dispute_needs_the_arbiter() {
    let mut m = machine();
    funded_5_3(&mut m);
    m.apply(&p1(), &Command::StartGame, 20).unwrap();
    m.apply(
        &p2(),
        &Command::RaiseDispute {
            reason: "opponent used an engine".into(),
        },
        25,
    )
    .unwrap();
    assert_eq!(m.status(), EscrowStatus::Disputed);

    let cancel = Command::ResolveDispute {
        resolution: Resolution::Cancel,
        notes: "inconclusive".into(),
    };
    let err = m.apply(&p2(), &cancel, 26).unwrap_err();
    assert_eq!(err.kind(), FailureKind::ArbiterMisuse);
    assert_eq!(m.status(), EscrowStatus::Disputed);

    m.apply(&arbiter(), &cancel, 27).unwrap();
    assert_eq!(m.status(), EscrowStatus::Cancelled);

    m.apply(&arbiter(), &Command::ReleaseFunds, 28).unwrap();
    let settlement = m.ledger().settlement().unwrap();
    assert_eq!(settlement.amount_for(&p1()), tokens(5));
    assert_eq!(settlement.amount_for(&p2()), tokens(3));
}

#[test]
fn second_cancel_is_rejected() {
    let mut m = machine();
    m.apply(&p1(), &Command::Cancel, 1).unwrap();
    assert_err(
        m.apply(&p1(), &Command::Cancel, 2),
        GuardViolation::WrongStatus {
            op: "cancel_escrow",
            status: EscrowStatus::Cancelled,
        },
    );
}

#[test]
fn excess_policies_differ_only_in_who_holds_the_excess() {
    let mut refund = machine_with(ExcessPolicy::RefundAtLock);
    let mut sweep = machine_with(ExcessPolicy::SweepToWinner);
    let mut strand = machine_with(ExcessPolicy::Strand);

    for m in [&mut refund, &mut sweep, &mut strand] {
        funded_5_3(m);
        m.apply(&p1(), &Command::StartGame, 20).unwrap();
        m.apply(
            &p2(),
            &Command::CompleteGame {
                winner: Some(p2()),
                is_draw: false,
            },
            30,
        )
        .unwrap();
        m.apply(&p2(), &Command::ReleaseFunds, 31).unwrap();
        assert_eq!(m.ledger().total_escrowed(), tokens(6));
    }

    let refunded = refund.ledger().settlement().unwrap().clone();
    assert_eq!(refunded.amount_for(&p2()), tokens(6));
    assert_eq!(refunded.amount_for(&p1()), Amount::ZERO);
    // p1's excess left custody at lock, not at release
    assert_eq!(refund.ledger().paid_to(&p1()), tokens(2));
    assert_eq!(refund.ledger().balance(), Amount::ZERO);

    let sweep = sweep.ledger().settlement().unwrap().clone();
    assert_eq!(sweep.amount_for(&p2()), tokens(8));
    assert_eq!(sweep.amount_for(&p1()), Amount::ZERO);

    assert_eq!(strand.ledger().settlement().unwrap().stranded, tokens(2));
    assert_eq!(strand.ledger().balance(), tokens(2));
}

#[derive(Debug, Clone, Copy)]
enum Ending {
    Win,
    Draw,
    CancelPlaying,
    CancelFunded,
}

#[test]
fn release_never_pays_out_more_than_custody() {
    for policy in [
        ExcessPolicy::RefundAtLock,
        ExcessPolicy::SweepToWinner,
        ExcessPolicy::Strand,
    ] {
        let mut draw_totals = Vec::new();
        for ending in [
            Ending::Win,
            Ending::Draw,
            Ending::CancelPlaying,
            Ending::CancelFunded,
        ] {
            let mut m = machine_with(policy);
            funded_5_3(&mut m);
            match ending {
                Ending::CancelFunded => {
                    m.apply(&p1(), &Command::Cancel, 20).unwrap();
                }
                Ending::CancelPlaying => {
                    m.apply(&p1(), &Command::StartGame, 20).unwrap();
                    m.apply(&p2(), &Command::Cancel, 25).unwrap();
                }
                Ending::Win | Ending::Draw => {
                    let winner = matches!(ending, Ending::Win).then(p1);
                    let is_draw = winner.is_none();
                    m.apply(&p1(), &Command::StartGame, 20).unwrap();
                    m.apply(&p2(), &Command::CompleteGame { winner, is_draw }, 30)
                        .unwrap();
                }
            }

            let custody = m.ledger().balance();
            m.apply(&p2(), &Command::ReleaseFunds, 40).unwrap();
            let ledger = m.ledger();
            let settlement = ledger.settlement().unwrap();
            assert!(settlement.total() <= custody, "{policy:?} {ending:?}");
            assert_eq!(ledger.balance(), settlement.stranded, "{policy:?} {ending:?}");
            assert!(ledger.check_invariants().is_ok());
            if !matches!(ending, Ending::Win) {
                draw_totals.push((ledger.paid_to(&p1()), ledger.paid_to(&p2())));
            }
        }
        // whoever held it, each player walks away with their own deposit
        for totals in draw_totals {
            assert_eq!(totals, (tokens(5), tokens(3)), "{policy:?}");
        }
    }
}

#[test]
fn rematch_starts_from_scratch() {
    let mut m = machine();
    funded_5_3(&mut m);
    m.apply(&p1(), &Command::Cancel, 12).unwrap();

    let next = m.ledger().rematch(addr("0xe5c1"), 100).unwrap();
    assert_eq!(next.status(), EscrowStatus::Pending);
    assert!(!next.player1().has_deposited);
    assert_eq!(next.winner(), None);
    assert_eq!(m.status(), EscrowStatus::Cancelled);
}

#[derive(Debug, Clone)]
enum Step {
    Deposit(bool, u64),
    Start,
    Complete(Option<bool>),
    Dispute(bool),
    Resolve(bool, u8),
    Timeout(u64),
    Release,
    Cancel,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (any::<bool>(), 0u64..10).prop_map(|(who, n)| Step::Deposit(who, n)),
        Just(Step::Start),
        proptest::option::of(any::<bool>()).prop_map(Step::Complete),
        any::<bool>().prop_map(Step::Dispute),
        (any::<bool>(), 0u8..4).prop_map(|(by_arbiter, r)| Step::Resolve(by_arbiter, r)),
        (0u64..200_000).prop_map(Step::Timeout),
        Just(Step::Release),
        Just(Step::Cancel),
    ]
}

fn command(step: &Step) -> (Address, Command) {
    let who = |first: bool| if first { p1() } else { p2() };
    match step {
        Step::Deposit(first, n) => (who(*first), Command::Deposit { amount: tokens(*n) }),
        Step::Start => (p1(), Command::StartGame),
        Step::Complete(winner) => (
            p1(),
            Command::CompleteGame {
                winner: winner.map(who),
                is_draw: winner.is_none(),
            },
        ),
        Step::Dispute(first) => (
            who(*first),
            Command::RaiseDispute {
                reason: "contested".into(),
            },
        ),
        Step::Resolve(by_arbiter, r) => {
            let resolution = match r {
                0 => Resolution::Player1,
                1 => Resolution::Player2,
                2 => Resolution::Draw,
                _ => Resolution::Cancel,
            };
            let caller = if *by_arbiter { arbiter() } else { p1() };
            (
                caller,
                Command::ResolveDispute {
                    resolution,
                    notes: String::new(),
                },
            )
        }
        Step::Timeout(_) => (p2(), Command::CheckTimeout),
        Step::Release => (p1(), Command::ReleaseFunds),
        Step::Cancel => (p2(), Command::Cancel),
    }
}

proptest! {
    #[test]
    fn failed_commands_leave_the_ledger_untouched(steps in proptest::collection::vec(step(), 1..30)) {
        let mut m = machine();
        let mut now = 1_700_000_000u64;
        for s in &steps {
            now += match s {
                Step::Timeout(dt) => *dt,
                _ => 1,
            };
            let (caller, cmd) = command(s);
            let before = m.ledger().clone();
            match m.apply(&caller, &cmd, now) {
                Ok(_) => {
                    prop_assert!(m.ledger().check_invariants().is_ok());
                    if let Some(settlement) = m.ledger().settlement() {
                        prop_assert_eq!(m.ledger().balance(), settlement.stranded);
                    }
                }
                Err(e) => {
                    prop_assert_eq!(m.ledger(), &before);
                    prop_assert_ne!(e.kind(), FailureKind::TransportFailure);
                }
            }
        }
    }

    #[test]
    fn funded_iff_both_deposited(deposits in proptest::collection::vec((any::<bool>(), 0u64..8), 0..10)) {
        let mut m = machine();
        for (i, (first, n)) in deposits.iter().enumerate() {
            let (caller, cmd) = command(&Step::Deposit(*first, *n));
            let _ = m.apply(&caller, &cmd, i as u64);
            let both = m.ledger().are_both_deposits_complete();
            prop_assert_eq!(m.status() == EscrowStatus::Funded, both);
        }
    }

    #[test]
    fn pot_is_twice_the_smaller_deposit(a in 1u64..1_000_000, b in 1u64..1_000_000) {
        prop_assume!(a != b);
        let mut m = machine();
        m.apply(&p1(), &Command::Deposit { amount: tokens(a) }, 1).unwrap();
        m.apply(&p2(), &Command::Deposit { amount: tokens(b) }, 2).unwrap();
        let expected = tokens(2 * a.min(b));
        prop_assert_eq!(m.ledger().total_escrowed(), expected);
        prop_assert_ne!(m.ledger().total_escrowed(), tokens(a + b));
    }
}
