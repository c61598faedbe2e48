//! JSON-facing adapter configuration.

use std::time::Duration;

use gambit_core::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;

pub const DEFAULT_CONFIRMATION_DELAY_MS: u64 = 1_500;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 30_000;

fn default_confirmation_delay_ms() -> u64 {
    DEFAULT_CONFIRMATION_DELAY_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_confirmation_timeout_ms() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_MS
}

/// Which transport carries escrow calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "snake_case")]
pub enum AdapterConfig {
    Simulated(SimulatedConfig),
    Live(LiveConfig),
}

impl AdapterConfig {
    /// Package address the escrow module is published under.
    pub fn module_address(&self) -> &Address {
        match self {
            Self::Simulated(c) => &c.module_address,
            Self::Live(c) => &c.module_address,
        }
    }
}

/// In-memory escrow book with an artificial confirmation delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedConfig {
    pub module_address: Address,
    #[serde(default = "default_confirmation_delay_ms")]
    pub confirmation_delay_ms: u64,
}

impl SimulatedConfig {
    pub fn new(module_address: Address) -> Self {
        Self {
            module_address,
            confirmation_delay_ms: DEFAULT_CONFIRMATION_DELAY_MS,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.confirmation_delay_ms = delay_ms;
        self
    }

    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }
}

/// A node reached through a signer and a node client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Fullnode REST endpoint.
    pub node_url: String,
    pub module_address: Address,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for a submitted transaction before giving up on it.
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
}

impl LiveConfig {
    pub fn new(node_url: impl Into<String>, module_address: Address) -> Self {
        Self {
            node_url: node_url.into(),
            module_address,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
        }
    }

    pub fn with_timing(mut self, poll_interval_ms: u64, confirmation_timeout_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self.confirmation_timeout_ms = confirmation_timeout_ms;
        self
    }

    /// Parsed and validated node endpoint.
    pub fn node_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.node_url)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}
