// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::ProcessId;
use crate::event::{Event, EventId};

/// Summary of a process' recent state, sent to a few randomly chosen peers every round.
///
/// All collections are duplicate-free snapshots; recipients may mutate their copies (for example
/// raising event ages) without affecting the sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gossip {
    pub sender: ProcessId,
    /// Events the sender received since its previous round.
    pub events: Vec<Event>,
    /// Subscriptions to re-propagate, including the sender itself while it is subscribed.
    pub subs: Vec<ProcessId>,
    /// Unsubscriptions to propagate and block from re-entering views.
    pub unsubs: Vec<ProcessId>,
    /// Identifiers of events the sender has delivered, for gap detection at the receiver.
    pub event_ids: Vec<EventId>,
}

/// Messages exchanged between processes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Periodic digest of events, membership changes and delivered event ids.
    Gossip(Gossip),
    /// Ask a peer to retransmit an event which was announced but never received.
    RetrieveRequest {
        sender: ProcessId,
        event_id: EventId,
    },
    /// Answer to a retrieve request, carrying a copy of the event.
    RetrieveReply { sender: ProcessId, event: Event },
}

impl Message {
    /// Process which sent this message.
    pub fn sender(&self) -> ProcessId {
        match self {
            Message::Gossip(gossip) => gossip.sender,
            Message::RetrieveRequest { sender, .. } => *sender,
            Message::RetrieveReply { sender, .. } => *sender,
        }
    }
}
