//! A playing session: games, their escrows, boards and the side pool.
//!
//! A [`Session`] is built once, passed to whoever needs it, and consumed by
//! [`Session::shutdown`], which stops every pending timeout watcher.

use std::collections::HashMap;
use std::sync::Arc;

use gambit_core::betting::{BetRecord, BettingAgent, GameVerification, PoolDrift};
use gambit_core::clock::Clock;
use gambit_core::game::{ChessRules, GameOutcome};
use gambit_core::ledger::Seat;
use gambit_core::{
    Address, EscrowError, EscrowParams, EscrowStatus, FailureKind, GameId, GuardViolation,
    Settlement,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::escrow::EscrowClient;
use crate::registry::GameRegistry;
use crate::{ChainAdapter, Result};

/// Board of one game: current position and the moves that led to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Board {
    pub position: String,
    pub moves: Vec<String>,
    pub outcome: Option<GameOutcome>,
}

/// What a move did to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub position: String,
    /// Set when the move ended the game; the escrow is then settled.
    pub outcome: Option<GameOutcome>,
}

pub struct Session<A> {
    adapter: Arc<A>,
    module: Address,
    clock: Arc<dyn Clock>,
    rules: Box<dyn ChessRules>,
    registry: GameRegistry<A>,
    betting: Mutex<BettingAgent>,
    boards: Mutex<HashMap<GameId, Board>>,
}

impl<A: ChainAdapter + 'static> Session<A> {
    pub fn new(
        adapter: Arc<A>,
        module: Address,
        clock: Arc<dyn Clock>,
        rules: Box<dyn ChessRules>,
    ) -> Self {
        Self {
            adapter,
            module,
            clock,
            rules,
            registry: GameRegistry::new(),
            betting: Mutex::new(BettingAgent::new()),
            boards: Mutex::new(HashMap::new()),
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn registry(&self) -> &GameRegistry<A> {
        &self.registry
    }

    /// Create the escrow of a new game and set up its board.
    ///
    /// The game id is reserved before the escrow is created, so two
    /// concurrent openings of one game never leave an unregistered escrow.
    pub async fn open_game(
        &self,
        creator: &Address,
        params: EscrowParams,
    ) -> Result<EscrowClient<A>> {
        let game_id = params.game_id.clone();
        self.registry.reserve(&game_id).await?;

        let created = EscrowClient::initialize_escrow(
            Arc::clone(&self.adapter),
            self.module.clone(),
            creator.clone(),
            params,
            Arc::clone(&self.clock),
        )
        .await;
        let client = match created {
            Ok(client) => client,
            Err(e) => {
                self.registry.unreserve(&game_id).await;
                return Err(e);
            }
        };
        self.registry.insert(game_id.clone(), client.clone()).await?;
        self.boards.lock().await.insert(
            game_id,
            Board {
                position: self.rules.initial_position(),
                moves: Vec::new(),
                outcome: None,
            },
        );
        Ok(client)
    }

    /// Start play on a funded escrow and open the matching side bet.
    pub async fn start_game(&self, game_id: &GameId, caller: &Address) -> Result<()> {
        let client = self.registry.get(game_id).await?;
        client.start_game(caller).await?;

        let ledger = client.ledger();
        let (p1, p2) = (ledger.player1(), ledger.player2());
        let mut betting = self.betting.lock().await;
        betting.initialize_bet(
            game_id.clone(),
            p1.address.clone(),
            p1.deposit_amount,
            p2.address.clone(),
            p2.deposit_amount,
        )?;
        betting.activate_bet(game_id)?;
        Ok(())
    }

    /// Play `mv` for `player`. A move that ends the game settles the escrow
    /// and records the result with the betting agent.
    ///
    /// The finishing move stays on the board even if settlement fails
    /// partway; [`Self::settle_game`] picks up from there. Only a chain
    /// rejection of the result itself takes the move back.
    pub async fn play_move(
        &self,
        game_id: &GameId,
        player: &Address,
        mv: &str,
    ) -> Result<PlayedMove> {
        let client = self.registry.get(game_id).await?;
        let ledger = client.ledger();
        if ledger.status() != EscrowStatus::Playing {
            return Err(EscrowError::from(GuardViolation::WrongStatus {
                op: "play_move",
                status: ledger.status(),
            })
            .into());
        }
        let seat = ledger
            .seat_of(player)
            .ok_or_else(|| EscrowError::from(GuardViolation::NotParticipant(player.clone())))?;

        let (position, outcome, before) = {
            let mut boards = self.boards.lock().await;
            let board = boards
                .get_mut(game_id)
                .ok_or_else(|| ClientError::UnknownGame(game_id.clone()))?;
            if board.outcome.is_some() {
                return Err(ClientError::GameDecided(game_id.clone()));
            }
            let to_move = if board.moves.len() % 2 == 0 {
                Seat::Player1
            } else {
                Seat::Player2
            };
            if seat != to_move {
                return Err(ClientError::OutOfTurn(player.clone()));
            }

            let verdict = self.rules.play(&board.position, mv)?;
            let outcome = verdict.terminal.map(GameOutcome::from);
            let before = board.clone();
            board.position = verdict.position.clone();
            board.moves.push(mv.to_string());
            board.outcome = outcome;
            (verdict.position, outcome, before)
        };
        debug!(game = %game_id, %player, mv, "Move played");

        if outcome.is_some() {
            if let Err(e) = self.settle(game_id, player, &client).await {
                // the chain refused the result: the game is still in play
                if client.status() == EscrowStatus::Playing
                    && e.kind() != FailureKind::TransportFailure
                {
                    self.boards.lock().await.insert(game_id.clone(), before);
                }
                return Err(e);
            }
        }
        Ok(PlayedMove { position, outcome })
    }

    /// Finish settling a game decided on the board: record the result on
    /// chain and with the betting agent, then release the escrow.
    ///
    /// Every step already done is skipped, so this is safe to call again
    /// after a failure (reconciling the escrow first if it asks for it).
    pub async fn settle_game(&self, game_id: &GameId, caller: &Address) -> Result<()> {
        let client = self.registry.get(game_id).await?;
        self.settle(game_id, caller, &client).await
    }

    async fn settle(
        &self,
        game_id: &GameId,
        caller: &Address,
        client: &EscrowClient<A>,
    ) -> Result<()> {
        let board = self
            .board(game_id)
            .await
            .ok_or_else(|| ClientError::UnknownGame(game_id.clone()))?;
        let Some(outcome) = board.outcome else {
            return Err(EscrowError::from(GuardViolation::WrongStatus {
                op: "settle_game",
                status: client.status(),
            })
            .into());
        };

        if client.status() == EscrowStatus::Playing {
            let ledger = client.ledger();
            client
                .record_result(caller, outcome.winner_in(&ledger).as_ref())
                .await?;
        }
        {
            let mut betting = self.betting.lock().await;
            if betting.verification(game_id).is_none() {
                betting.complete_game(game_id, outcome, board.moves, self.clock.now())?;
                info!(game = %game_id, ?outcome, "Game finished");
            }
        }
        let ledger = client.ledger();
        if ledger.status() == EscrowStatus::Completed && !ledger.funds_released() {
            client.release_funds(caller).await?;
        }
        Ok(())
    }

    /// Cancel the game's escrow and its side bet, if one was opened.
    pub async fn cancel_game(&self, game_id: &GameId, caller: &Address) -> Result<()> {
        let client = self.registry.get(game_id).await?;
        client.cancel_escrow(caller).await?;
        let mut betting = self.betting.lock().await;
        if betting.bet(game_id).is_some() {
            betting.cancel_bet(game_id)?;
        }
        Ok(())
    }

    pub async fn board(&self, game_id: &GameId) -> Option<Board> {
        self.boards.lock().await.get(game_id).cloned()
    }

    pub async fn bet(&self, game_id: &GameId) -> Option<BetRecord> {
        self.betting.lock().await.bet(game_id).cloned()
    }

    pub async fn verification(&self, game_id: &GameId) -> Option<GameVerification> {
        self.betting.lock().await.verification(game_id).cloned()
    }

    /// Payouts the side pool would make, under the escrow's excess policy.
    pub async fn bet_settlement(&self, game_id: &GameId) -> Result<Settlement> {
        let policy = self.registry.get(game_id).await?.ledger().config().excess_policy;
        Ok(self.betting.lock().await.settlement(game_id, policy)?)
    }

    /// Compare the side pool with what the escrow locked.
    pub async fn bet_drift(&self, game_id: &GameId) -> Result<PoolDrift> {
        let ledger = self.registry.get(game_id).await?.ledger();
        Ok(self.betting.lock().await.reconcile(game_id, &ledger)?)
    }

    /// Archive a finished game, dropping its board.
    pub async fn archive(&self, game_id: &GameId) -> Result<()> {
        self.registry.archive(game_id).await?;
        self.boards.lock().await.remove(game_id);
        Ok(())
    }

    /// End the session, stopping every timeout watcher.
    ///
    /// Games still in progress stay on chain as they are.
    pub async fn shutdown(self) {
        let games = self.registry.drain().await;
        for (game_id, client) in &games {
            client.disarm().await;
            debug!(game = %game_id, status = %client.status(), "Game left behind");
        }
        info!(games = games.len(), "Session closed");
    }
}
