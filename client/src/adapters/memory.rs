use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gambit_core::clock::Clock;
use gambit_core::{
    Address, Command, EscrowLedger, EscrowStateMachine, EscrowStatus, Notification,
};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{ClientError, CodecError};
use crate::payload::{Call, ChainEvent, TxPayload, View, ViewQuery};
use crate::Result;

/// Effects of one executed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub timestamp: u64,
    pub events: Vec<ChainEvent>,
}

#[derive(Default)]
struct Book {
    escrows: HashMap<Address, EscrowStateMachine>,
    // escrows created so far, seeds new escrow addresses
    created: u64,
}

/// The escrow module published at `module`, holding every escrow in memory.
///
/// Calls are decoded with [`Call`] and applied with [`EscrowStateMachine`],
/// so transitions and payouts are the ones the client computes locally.
pub struct MemoryChain {
    module: Address,
    clock: Arc<dyn Clock>,
    book: Mutex<Book>,
}

impl MemoryChain {
    pub fn new(module: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            module,
            clock,
            book: Mutex::new(Book::default()),
        }
    }

    pub fn module(&self) -> &Address {
        &self.module
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Execute `tx` atomically: either every effect lands or none does.
    #[instrument(level = "debug", skip(self, tx), fields(function = %tx.payload.function, sender = %tx.sender))]
    pub fn execute(&self, tx: &TxPayload) -> Result<Execution> {
        let (module, call) = Call::decode(&tx.payload)?;
        self.check_module(module)?;
        let now = self.clock.now();
        let mut book = self.book();

        let events = match call {
            Call::Initialize(params) => {
                book.created += 1;
                let seed = format!("{}:{}:{}", self.module, tx.sender, book.created);
                let escrow = Address::derive(seed.as_bytes());
                let ledger = params.into_ledger(escrow.clone(), now)?;
                book.escrows
                    .insert(escrow.clone(), EscrowStateMachine::new(ledger));
                info!(%escrow, "escrow created");
                vec![ChainEvent::EscrowCreated { escrow }]
            }
            Call::Apply { escrow, command } => {
                let machine = book
                    .escrows
                    .get_mut(&escrow)
                    .ok_or_else(|| ClientError::UnknownEscrow(escrow.clone()))?;
                let notes = machine.apply(&tx.sender, &command, now)?;
                let locked = notes.iter().any(|note| {
                    matches!(note, Notification::StatusChanged { to: EscrowStatus::Funded, .. })
                });
                let mut events = events_for(&escrow, notes);
                if locked {
                    if let Some(award) = machine.ledger().excess_refund() {
                        info!(%escrow, recipient = %award.recipient, amount = %award.amount, "excess refunded at lock");
                        events.push(ChainEvent::ExcessRefunded {
                            escrow: escrow.clone(),
                            award: award.clone(),
                        });
                    }
                }
                if command == Command::ReleaseFunds {
                    if let Some(settlement) = machine.ledger().settlement() {
                        events.push(ChainEvent::FundsReleased {
                            escrow: escrow.clone(),
                            settlement: settlement.clone(),
                        });
                    }
                }
                debug!(%escrow, op = command.name(), status = %machine.status(), "call applied");
                events
            }
        };
        Ok(Execution {
            timestamp: now,
            events,
        })
    }

    /// Evaluate a view query against current state.
    pub fn query(&self, query: &ViewQuery) -> Result<Value> {
        let (module, escrow, view) = View::decode(query)?;
        self.check_module(module)?;
        let book = self.book();
        let machine = book
            .escrows
            .get(&escrow)
            .ok_or(ClientError::UnknownEscrow(escrow))?;
        Ok(view.evaluate(machine.ledger(), self.clock.now())?)
    }

    /// Current ledger of `escrow`.
    pub fn ledger(&self, escrow: &Address) -> Option<EscrowLedger> {
        self.book()
            .escrows
            .get(escrow)
            .map(|machine| machine.ledger().clone())
    }

    fn check_module(&self, module: Address) -> Result<()> {
        if module != self.module {
            return Err(CodecError::WrongModule {
                expected: self.module.clone(),
                found: module,
            }
            .into());
        }
        Ok(())
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        // calls commit whole ledgers, so a poisoned book is still consistent
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn events_for(escrow: &Address, notes: Vec<Notification>) -> Vec<ChainEvent> {
    notes
        .into_iter()
        .map(|note| match note {
            Notification::StatusChanged { from, to } => ChainEvent::StatusChanged {
                escrow: escrow.clone(),
                from,
                to,
            },
            Notification::WinnerDeclared(winner) => ChainEvent::WinnerDeclared {
                escrow: escrow.clone(),
                winner,
            },
            Notification::TimedOut => ChainEvent::TimedOut {
                escrow: escrow.clone(),
            },
        })
        .collect()
}
