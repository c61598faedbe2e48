//! Client of one escrow: a local mirror kept in step with the chain.
//!
//! Every mutating operation runs the same way, one at a time per escrow:
//!
//! 1. dry-run the command on the local state machine (guards fail here,
//!    before anything is sent);
//! 2. submit the encoded call through the [`ChainAdapter`] and wait for it;
//! 3. apply the command locally at the confirmed timestamp and notify
//!    observers.
//!
//! If step 2 fails in transport, or its future is dropped, the outcome on
//! chain is unknown. The client then refuses further operations with
//! [`ClientError::ReconcileRequired`] until [`EscrowClient::reconcile`] has
//! read the escrow back from the chain.

use std::sync::{Arc, Weak};
use std::time::Duration;

use gambit_core::clock::Clock;
use gambit_core::ledger::PlayerSlot;
use gambit_core::{
    Address, Amount, Command, EscrowLedger, EscrowParams, EscrowStateMachine, EscrowStatus,
    FailureKind, Notification, Observers, Resolution,
};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClientError, CodecError};
use crate::payload::{amount_from_view, from_view, Call, TxPayload, View};
use crate::timer::TimeoutWatcher;
use crate::{ChainAdapter, Result};

struct State {
    machine: EscrowStateMachine,
    needs_reconcile: bool,
    watcher: Option<TimeoutWatcher>,
}

struct Inner<A> {
    adapter: Arc<A>,
    module: Address,
    escrow: Address,
    // signs automatic calls such as timeout checks
    keeper: Address,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    snapshot: watch::Sender<EscrowLedger>,
}

impl<A> Inner<A> {
    fn time_remaining(&self) -> Option<u64> {
        self.snapshot.borrow().time_remaining(self.clock.now())
    }
}

/// Handle to one escrow. Clones share the same escrow and its operation queue.
pub struct EscrowClient<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for EscrowClient<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for EscrowClient<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowClient")
            .field("escrow", &self.inner.escrow)
            .field("status", &self.status())
            .finish()
    }
}

impl<A: ChainAdapter + 'static> EscrowClient<A> {
    /// Create a new escrow on chain, signed by `creator`.
    ///
    /// The escrow address is read from the `EscrowCreated` event of the
    /// receipt. `creator` also signs the automatic timeout checks.
    #[instrument(skip(adapter, params, clock), fields(game = %params.game_id))]
    pub async fn initialize_escrow(
        adapter: Arc<A>,
        module: Address,
        creator: Address,
        params: EscrowParams,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        params.config.validate(&params.player1, &params.player2)?;

        let tx = TxPayload::new(creator.clone(), Call::Initialize(params.clone()).encode(&module));
        let receipt = adapter.submit(&tx).await?;
        let escrow = receipt
            .created_escrow()
            .cloned()
            .ok_or_else(|| ClientError::MissingEvent("EscrowCreated".into()))?;
        info!(%escrow, tx_hash = %receipt.hash, "Escrow initialized");

        let ledger = params.into_ledger(escrow, receipt.timestamp)?;
        Ok(Self::from_ledger(adapter, module, creator, ledger, clock))
    }

    /// Attach to an escrow that already exists on chain.
    pub async fn attach(
        adapter: Arc<A>,
        module: Address,
        keeper: Address,
        escrow: Address,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let value = adapter.view(&View::Escrow.encode(&module, &escrow)).await?;
        let ledger = checked_ledger(value, &escrow)?;
        let client = Self::from_ledger(adapter, module, keeper, ledger, clock);
        {
            let mut state = client.inner.state.lock().await;
            client.sync_watcher(&mut state);
        }
        Ok(client)
    }

    fn from_ledger(
        adapter: Arc<A>,
        module: Address,
        keeper: Address,
        ledger: EscrowLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (snapshot, _) = watch::channel(ledger.clone());
        let inner = Inner {
            adapter,
            module,
            escrow: ledger.escrow().clone(),
            keeper,
            clock,
            state: Mutex::new(State {
                machine: EscrowStateMachine::new(ledger),
                needs_reconcile: false,
                watcher: None,
            }),
            snapshot,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Register observer hooks on the local state machine.
    pub async fn observe(&self, register: impl FnOnce(&mut Observers)) {
        let mut state = self.inner.state.lock().await;
        register(state.machine.observers_mut());
    }

    pub async fn deposit(&self, player: &Address, amount: Amount) -> Result<Vec<Notification>> {
        self.execute(player, Command::Deposit { amount }).await
    }

    pub async fn sign_to_start_game(&self, player: &Address) -> Result<Vec<Notification>> {
        self.execute(player, Command::SignGameStart).await
    }

    /// Move a funded escrow into play and arm the timeout watcher.
    pub async fn start_game(&self, caller: &Address) -> Result<Vec<Notification>> {
        self.execute(caller, Command::StartGame).await
    }

    /// Record `winner` and release the pot.
    pub async fn complete_game(
        &self,
        caller: &Address,
        winner: &Address,
    ) -> Result<Vec<Notification>> {
        let command = Command::CompleteGame {
            winner: Some(winner.clone()),
            is_draw: false,
        };
        self.execute_then_release(caller, command).await
    }

    /// Record a draw and refund both deposits.
    pub async fn complete_game_as_draw(&self, caller: &Address) -> Result<Vec<Notification>> {
        let command = Command::CompleteGame {
            winner: None,
            is_draw: true,
        };
        self.execute_then_release(caller, command).await
    }

    /// Record the result of a game in play without releasing the funds.
    ///
    /// `None` records a draw. Callers follow up with [`Self::release_funds`].
    pub async fn record_result(
        &self,
        caller: &Address,
        winner: Option<&Address>,
    ) -> Result<Vec<Notification>> {
        let command = Command::CompleteGame {
            winner: winner.cloned(),
            is_draw: winner.is_none(),
        };
        self.execute(caller, command).await
    }

    /// Pay out a completed or cancelled escrow.
    ///
    /// Only needed on its own after [`Self::record_result`], or when the
    /// release that follows a completion failed.
    pub async fn release_funds(&self, caller: &Address) -> Result<Vec<Notification>> {
        self.execute(caller, Command::ReleaseFunds).await
    }

    pub async fn raise_dispute(
        &self,
        player: &Address,
        reason: impl Into<String>,
    ) -> Result<Vec<Notification>> {
        let command = Command::RaiseDispute {
            reason: reason.into(),
        };
        self.execute(player, command).await
    }

    /// Settle a disputed or timed-out game and release the funds accordingly.
    pub async fn resolve_dispute(
        &self,
        arbiter: &Address,
        resolution: Resolution,
        notes: impl Into<String>,
    ) -> Result<Vec<Notification>> {
        let command = Command::ResolveDispute {
            resolution,
            notes: notes.into(),
        };
        self.execute_then_release(arbiter, command).await
    }

    /// Time the game out if its deadline passed. Returns whether it did.
    pub async fn check_timeout(&self, caller: &Address) -> Result<bool> {
        let notes = self.execute(caller, Command::CheckTimeout).await?;
        Ok(notes.contains(&Notification::TimedOut))
    }

    /// Cancel the escrow and refund every deposit made so far.
    pub async fn cancel_escrow(&self, caller: &Address) -> Result<Vec<Notification>> {
        self.execute_then_release(caller, Command::Cancel).await
    }

    /// Replace the local mirror with the escrow as stored on chain.
    ///
    /// Observers are told about whatever changed. Clears the
    /// reconciliation requirement left by a transport failure.
    #[instrument(skip(self), fields(escrow = %self.inner.escrow))]
    pub async fn reconcile(&self) -> Result<Vec<Notification>> {
        let mut state = self.inner.state.lock().await;
        let ledger = checked_ledger(self.view(View::Escrow).await?, &self.inner.escrow)?;
        let notes = state.machine.adopt(ledger);
        state.needs_reconcile = false;
        self.sync_watcher(&mut state);
        info!(changes = notes.len(), status = %state.machine.status(), "Escrow reconciled");
        Ok(notes)
    }

    /// Stop the timeout watcher, if one is armed.
    pub async fn disarm(&self) {
        if let Some(watcher) = self.inner.state.lock().await.watcher.take() {
            watcher.abort();
        }
    }

    pub async fn needs_reconcile(&self) -> bool {
        self.inner.state.lock().await.needs_reconcile
    }

    pub async fn get_status(&self) -> Result<EscrowStatus> {
        Ok(from_view(self.view(View::Status).await?)?)
    }

    pub async fn get_winner(&self) -> Result<Option<Address>> {
        Ok(from_view(self.view(View::Winner).await?)?)
    }

    pub async fn get_balance(&self) -> Result<Amount> {
        Ok(amount_from_view(&self.view(View::Balance).await?)?)
    }

    pub async fn get_minimum_bet(&self) -> Result<Amount> {
        Ok(amount_from_view(&self.view(View::MinimumBet).await?)?)
    }

    pub async fn get_player_info(&self, player: &Address) -> Result<Option<PlayerSlot>> {
        Ok(from_view(self.view(View::PlayerInfo(player.clone())).await?)?)
    }

    pub async fn get_total_escrowed(&self) -> Result<Amount> {
        Ok(amount_from_view(&self.view(View::TotalEscrowed).await?)?)
    }

    pub async fn get_time_remaining(&self) -> Result<Option<u64>> {
        Ok(from_view(self.view(View::TimeRemaining).await?)?)
    }

    pub async fn get_escrow(&self) -> Result<EscrowLedger> {
        checked_ledger(self.view(View::Escrow).await?, &self.inner.escrow)
    }

    async fn view(&self, view: View) -> Result<Value> {
        let query = view.encode(&self.inner.module, &self.inner.escrow);
        self.inner.adapter.view(&query).await
    }

    async fn execute(&self, caller: &Address, command: Command) -> Result<Vec<Notification>> {
        let mut state = self.inner.state.lock().await;
        self.execute_locked(&mut state, caller, &command).await
    }

    async fn execute_then_release(
        &self,
        caller: &Address,
        command: Command,
    ) -> Result<Vec<Notification>> {
        let mut state = self.inner.state.lock().await;
        let mut notes = self.execute_locked(&mut state, caller, &command).await?;
        notes.extend(
            self.execute_locked(&mut state, caller, &Command::ReleaseFunds)
                .await?,
        );
        Ok(notes)
    }

    async fn execute_locked(
        &self,
        state: &mut State,
        caller: &Address,
        command: &Command,
    ) -> Result<Vec<Notification>> {
        let escrow = &self.inner.escrow;
        let op = command.name();
        if state.needs_reconcile {
            return Err(ClientError::ReconcileRequired(escrow.clone()));
        }
        state.machine.preview(caller, command, self.inner.clock.now())?;

        let call = Call::Apply {
            escrow: escrow.clone(),
            command: command.clone(),
        };
        let tx = TxPayload::new(caller.clone(), call.encode(&self.inner.module));

        // stays set if this future is dropped while waiting
        state.needs_reconcile = true;
        let receipt = match self.inner.adapter.submit(&tx).await {
            Ok(receipt) => receipt,
            Err(e) => {
                // a chain-side rejection means the mirror was stale
                let ambiguous = e.kind() == FailureKind::TransportFailure
                    || matches!(e, ClientError::Escrow(_));
                state.needs_reconcile = ambiguous;
                warn!(%escrow, op, error = %e, reconcile = ambiguous, "Escrow call failed");
                return Err(e);
            }
        };

        let notes = match state.machine.apply(caller, command, receipt.timestamp) {
            Ok(notes) => notes,
            Err(e) => {
                warn!(
                    %escrow,
                    op,
                    tx_hash = %receipt.hash,
                    error = %e,
                    "Confirmed call does not apply to the local ledger"
                );
                return Err(ClientError::ReconcileRequired(escrow.clone()));
            }
        };
        state.needs_reconcile = false;
        debug!(%escrow, op, tx_hash = %receipt.hash, status = %state.machine.status(), "Escrow call confirmed");
        self.sync_watcher(state);
        Ok(notes)
    }

    /// Publish the ledger and keep the watcher armed exactly while in play.
    fn sync_watcher(&self, state: &mut State) {
        let ledger = state.machine.ledger().clone();
        let playing = ledger.status() == EscrowStatus::Playing;
        self.inner.snapshot.send_replace(ledger);

        if playing {
            if state.watcher.as_ref().map_or(true, TimeoutWatcher::is_finished) {
                state.watcher = Some(self.arm_watcher());
            }
        } else if let Some(watcher) = state.watcher.take() {
            watcher.abort();
        }
    }

    fn arm_watcher(&self) -> TimeoutWatcher {
        let weak: Weak<Inner<A>> = Arc::downgrade(&self.inner);
        let keeper = self.inner.keeper.clone();
        TimeoutWatcher::spawn(async move {
            loop {
                let Some(remaining) = weak.upgrade().and_then(|inner| inner.time_remaining())
                else {
                    return;
                };
                debug!(remaining, "Timeout watcher sleeping");
                // at least a second between checks, the chain clock may lag ours
                tokio::time::sleep(Duration::from_secs(remaining.max(1))).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let client = EscrowClient { inner };
                if client.status() != EscrowStatus::Playing {
                    return;
                }
                match client.check_timeout(&keeper).await {
                    Ok(true) => return,
                    Ok(false) => continue,
                    Err(e) if e.kind() == FailureKind::GuardViolation => {
                        debug!(escrow = %client.escrow(), error = %e, "Game left play before the timeout check");
                        return;
                    }
                    Err(e) => {
                        warn!(escrow = %client.escrow(), error = %e, "Timeout check failed");
                        return;
                    }
                }
            }
        })
    }
}

impl<A> EscrowClient<A> {
    pub fn escrow(&self) -> &Address {
        &self.inner.escrow
    }

    /// Local copy of the ledger as of the last confirmed operation.
    pub fn ledger(&self) -> EscrowLedger {
        self.inner.snapshot.borrow().clone()
    }

    /// Receiver that sees every ledger the client commits.
    pub fn subscribe(&self) -> watch::Receiver<EscrowLedger> {
        self.inner.snapshot.subscribe()
    }

    pub fn status(&self) -> EscrowStatus {
        self.inner.snapshot.borrow().status()
    }

    /// Amount at stake: `2 × min` of the two deposits once both are in.
    pub fn pot(&self) -> Amount {
        self.inner.snapshot.borrow().total_escrowed()
    }

    /// Seconds left on the game clock while in play.
    pub fn time_remaining(&self) -> Option<u64> {
        self.inner.time_remaining()
    }
}

fn checked_ledger(value: Value, escrow: &Address) -> Result<EscrowLedger> {
    let ledger: EscrowLedger = from_view(value)?;
    if ledger.escrow() != escrow {
        return Err(CodecError::BadView(format!(
            "asked for escrow {escrow}, got {}",
            ledger.escrow()
        ))
        .into());
    }
    ledger
        .check_invariants()
        .map_err(|violation| CodecError::BadView(violation.to_string()))?;
    Ok(ledger)
}
