//! Chain backends behind [`crate::ChainAdapter`].
//!
//! - [`memory::MemoryChain`]: the escrow module itself, executing decoded
//!   calls with the core state machine.
//! - [`simulated::SimulatedAdapter`]: the memory chain behind a fixed
//!   confirmation delay.
//! - [`live::LiveAdapter`]: signs through a [`live::Signer`], submits to a
//!   [`live::NodeClient`] and polls for confirmation.
//! - [`devnet::DevnetNode`]: an in-process node serving the live adapter.

pub mod devnet;
pub mod live;
pub mod memory;
pub mod simulated;
