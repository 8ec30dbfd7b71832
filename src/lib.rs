// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lightweight probabilistic broadcast (lpbcast): gossip-based event dissemination in which
//! every process keeps only a bounded partial view of the membership, yet events still reach
//! the whole network with high probability and bounded per-node state.
//!
//! Each participant repeatedly sends a fixed-size summary of recent events, subscriptions and
//! unsubscriptions to a few randomly chosen peers. Received summaries are merged into a set of
//! bounded buffers with randomized purging policies; identifiers of already-delivered events
//! double as gap detectors, and missed events are recovered through a staged retransmission
//! protocol (announcer first, then a random peer, finally the originator). Membership changes
//! ride on the same gossip, so no global membership authority is needed.
//!
//! ## Driving the protocol
//!
//! The core is a deterministic, tick-driven state machine. Scheduling, message routing and the
//! application delivery upcall are injected through the [`Host`] trait, so the same code runs
//! under a discrete-event simulation or a wall-clock scheduler:
//!
//! 1. The host calls [`Process::step`] once per tick on every process.
//! 2. Processes hand each other messages through [`Host::send`], which routes to the target's
//!    [`Inbox`] - the only cross-process entry point, safe under concurrent senders.
//! 3. On the first reception of an event the host's [`Host::deliver`] upcall fires, exactly
//!    once per event per process.
//!
//! Applications broadcast through [`Process::broadcast`] and manage membership with
//! [`Process::subscribe`] and [`Process::unsubscribe`].
//!
//! A deterministic in-memory simulation harness is available in [`test_utils`] behind the
//! `test_utils` feature.
mod config;
mod event;
mod event_store;
mod inbox;
mod message;
mod peer_map;
mod process;
mod recovery;
mod rng;
mod traits;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use config::{Config, ConfigError};
pub use event::{Age, EVENT_UID_LEN, Event, EventId};
pub use inbox::Inbox;
pub use message::{Gossip, Message};
pub use process::Process;
pub use recovery::RetrieveStage;
pub use rng::Rng;
pub use traits::Host;

/// Unique identifier of a process in the network.
pub type ProcessId = u64;

/// Discrete time unit delivered by the host; the unit of scheduling.
pub type Tick = u64;
