//! Process-wide map of games to their escrow clients.

use std::collections::{HashMap, HashSet};

use gambit_core::{EscrowLedger, GameId};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::escrow::EscrowClient;
use crate::{ChainAdapter, Result};

/// Games in progress and the final ledgers of archived ones.
///
/// A game id is used once: it cannot be registered again, not even after
/// its game was archived. Active games are only removed by [`Self::archive`]
/// once their escrow reached a final status.
///
/// Locks are always taken in the order active, archived, reserved.
pub struct GameRegistry<A> {
    active: RwLock<HashMap<GameId, EscrowClient<A>>>,
    archived: RwLock<HashMap<GameId, EscrowLedger>>,
    // ids claimed by games whose escrow is still being created
    reserved: Mutex<HashSet<GameId>>,
}

impl<A> Default for GameRegistry<A> {
    fn default() -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            archived: RwLock::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
        }
    }
}

impl<A: ChainAdapter + 'static> GameRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `game_id` before creating its escrow.
    ///
    /// Fails if the id is registered, archived or already claimed. The claim
    /// ends with [`Self::insert`] or [`Self::unreserve`].
    pub async fn reserve(&self, game_id: &GameId) -> Result<()> {
        let active = self.active.read().await;
        let archived = self.archived.read().await;
        let mut reserved = self.reserved.lock().await;
        if active.contains_key(game_id)
            || archived.contains_key(game_id)
            || !reserved.insert(game_id.clone())
        {
            return Err(ClientError::GameExists(game_id.clone()));
        }
        debug!(game = %game_id, "Game id reserved");
        Ok(())
    }

    /// Drop the claim on a game whose escrow was never created.
    pub async fn unreserve(&self, game_id: &GameId) {
        if self.reserved.lock().await.remove(game_id) {
            debug!(game = %game_id, "Game id released");
        }
    }

    /// Register `client` under `game_id`, ending any claim on the id.
    pub async fn insert(&self, game_id: GameId, client: EscrowClient<A>) -> Result<()> {
        let mut active = self.active.write().await;
        if active.contains_key(&game_id) || self.archived.read().await.contains_key(&game_id) {
            return Err(ClientError::GameExists(game_id));
        }
        self.reserved.lock().await.remove(&game_id);
        info!(game = %game_id, escrow = %client.escrow(), "Game registered");
        active.insert(game_id, client);
        Ok(())
    }

    pub async fn contains(&self, game_id: &GameId) -> bool {
        self.active.read().await.contains_key(game_id)
    }

    pub async fn get(&self, game_id: &GameId) -> Result<EscrowClient<A>> {
        self.active
            .read()
            .await
            .get(game_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownGame(game_id.clone()))
    }

    /// Ids of the games in progress, in no particular order.
    pub async fn games(&self) -> Vec<GameId> {
        self.active.read().await.keys().cloned().collect()
    }

    /// Move a finished game out of the active set, keeping its ledger.
    pub async fn archive(&self, game_id: &GameId) -> Result<EscrowLedger> {
        let mut active = self.active.write().await;
        let client = active
            .get(game_id)
            .ok_or_else(|| ClientError::UnknownGame(game_id.clone()))?;
        let ledger = client.ledger();
        if !ledger.status().is_final() {
            return Err(ClientError::GameActive(game_id.clone()));
        }
        client.disarm().await;
        active.remove(game_id);
        self.archived
            .write()
            .await
            .insert(game_id.clone(), ledger.clone());
        info!(game = %game_id, status = %ledger.status(), "Game archived");
        Ok(ledger)
    }

    pub async fn archived(&self, game_id: &GameId) -> Option<EscrowLedger> {
        self.archived.read().await.get(game_id).cloned()
    }

    /// Remove every active game, returning their clients.
    pub(crate) async fn drain(&self) -> Vec<(GameId, EscrowClient<A>)> {
        self.active.write().await.drain().collect()
    }
}
