//! Per-escrow configuration fixed at creation time.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{Address, Amount, Result};

/// Default time a game may stay in play before it can be timed out (24 hours).
pub const DEFAULT_TIMEOUT_SECS: u64 = 24 * 60 * 60;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// What happens to the part of the larger deposit that exceeds the smaller one.
///
/// Only `2 × min(deposit1, deposit2)` is ever at stake, so with unequal
/// deposits some custody is left over. There is no default:
/// every escrow names its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcessPolicy {
    /// Return the excess to the larger depositor as soon as both deposits are in.
    RefundAtLock,
    /// Keep the excess and hand it to the winner of a decisive game.
    SweepToWinner,
    /// Keep the excess in custody; settlement reports it as stranded.
    Strand,
}

/// Parameters of a single escrow, immutable once the ledger exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Deposits strictly below this are rejected.
    pub minimum_bet: Amount,
    /// Seconds a game may be in play before `check_timeout` succeeds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// The only address allowed to resolve disputes and timeouts.
    pub arbiter: Address,
    pub excess_policy: ExcessPolicy,
}

impl EscrowConfig {
    pub fn new(minimum_bet: Amount, arbiter: Address, excess_policy: ExcessPolicy) -> Self {
        Self {
            minimum_bet,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            arbiter,
            excess_policy,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate the configuration against the two players it will govern.
    pub fn validate(&self, player1: &Address, player2: &Address) -> Result<()> {
        if self.minimum_bet.is_zero() {
            return Err(ConfigError::ZeroMinimumBet.into());
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout.into());
        }
        if player1 == player2 {
            return Err(ConfigError::DuplicatePlayers(player1.clone()).into());
        }
        if &self.arbiter == player1 || &self.arbiter == player2 {
            return Err(ConfigError::ArbiterIsPlayer(self.arbiter.clone()).into());
        }
        Ok(())
    }
}
