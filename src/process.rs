// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{Config, ConfigError};
use crate::event::{Event, EventId};
use crate::event_store::EventStore;
use crate::inbox::Inbox;
use crate::message::{Gossip, Message};
use crate::peer_map::PeerMap;
use crate::recovery::RecoveryTracker;
use crate::rng::Rng;
use crate::traits::Host;
use crate::{ProcessId, Tick};

/// A single participant of the probabilistic broadcast protocol.
///
/// Each process owns an isolated instance of the protocol state and is driven by [`step`] once
/// per tick: due inbound messages are dispatched, the recovery sweep promotes and retries
/// requests for missed events, and one gossip round summarises local state towards a few random
/// peers. The only entry point touched by other processes is the shared [`Inbox`].
///
/// [`step`]: Process::step
pub struct Process<H> {
    id: ProcessId,
    config: Config,
    host: H,
    rng: Arc<Rng>,
    inbox: Inbox,
    view: PeerMap,
    subs: PeerMap,
    unsubs: HashMap<ProcessId, Tick>,
    store: EventStore,
    recovery: RecoveryTracker,
    unsubscription_requested: bool,
    is_unsubscribed: bool,
}

impl<H: Host> Process<H> {
    /// Create a subscribed process with an empty view.
    ///
    /// Fails fast when the configuration is invalid. Initial contacts are seeded with
    /// [`add_peer`](Process::add_peer); everything else is learned through gossip.
    pub fn new(id: ProcessId, config: Config, host: H, rng: Rng) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = Arc::new(rng);
        let inbox = Inbox::new(&config, rng.clone());

        Ok(Self {
            id,
            config,
            host,
            rng,
            inbox,
            view: PeerMap::new(),
            subs: PeerMap::new(),
            unsubs: HashMap::new(),
            store: EventStore::new(),
            recovery: RecoveryTracker::new(),
            unsubscription_requested: false,
            is_unsubscribed: false,
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Handle under which other processes (or the host's router) reach this process.
    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Accept an inbound message; safe to call from any thread.
    pub fn receive(&self, message: Message) {
        self.inbox.receive(message, self.host.now());
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.is_unsubscribed
    }

    /// Peers currently used for gossip targeting.
    pub fn view(&self) -> Vec<ProcessId> {
        self.view.ids().collect()
    }

    /// Peers buffered for subscription re-propagation.
    pub fn subscriptions(&self) -> Vec<ProcessId> {
        self.subs.ids().collect()
    }

    /// Peers buffered as unsubscribed.
    pub fn unsubscriptions(&self) -> Vec<ProcessId> {
        self.unsubs.keys().copied().collect()
    }

    /// Number of queued inbound messages, due or not.
    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    /// Seed an initial contact into the view.
    ///
    /// Bootstrap helper for deployments and simulations which start from a known topology; the
    /// peer enters at frequency zero as if it had never been observed in gossip.
    pub fn add_peer(&mut self, peer: ProcessId) {
        if peer == self.id || self.unsubs.contains_key(&peer) {
            return;
        }
        self.view.seed(peer);
        self.trim_view();
        self.trim_subs();
    }

    /// Broadcast a fresh event, to be disseminated in the next gossip round.
    ///
    /// The event id is recorded as delivered locally but no delivery upcall is made for the
    /// originator's own events. Returns `None` while unsubscribed.
    pub fn broadcast(&mut self) -> Option<EventId> {
        if self.is_unsubscribed {
            return None;
        }

        let event_id = EventId::new(self.rng.random_array(), self.id);
        debug!(event = %event_id, "broadcasting event");

        self.store.insert(Event::new(event_id));
        self.store.record_delivered(event_id);

        let now = self.host.now();
        self.store.trim_events(&self.config, now, &self.rng);
        self.store.trim_delivered(self.config.event_ids_max);

        Some(event_id)
    }

    /// Re-join the network through a known contact after having unsubscribed.
    ///
    /// Returns false while still subscribed.
    pub fn subscribe(&mut self, target: ProcessId) -> bool {
        if !self.is_unsubscribed {
            return false;
        }

        debug!(contact = target, "subscribing");
        self.inbox.clear();
        if target != self.id {
            self.view.seed(target);
        }
        self.is_unsubscribed = false;
        true
    }

    /// Leave the network: the departure is announced with the next gossip round, after which
    /// the process goes quiescent.
    ///
    /// Returns false when already departing or departed.
    pub fn unsubscribe(&mut self) -> bool {
        if self.is_unsubscribed || self.unsubscription_requested {
            return false;
        }
        self.unsubscription_requested = true;
        true
    }

    /// Run one protocol tick: dispatch due messages, sweep recovery, emit one gossip round.
    ///
    /// A no-op while unsubscribed.
    pub fn step(&mut self) {
        if self.is_unsubscribed {
            return;
        }

        let now = self.host.now();
        for message in self.inbox.drain_due(now) {
            match message {
                Message::Gossip(gossip) => self.on_gossip(gossip, now),
                Message::RetrieveRequest { sender, event_id } => {
                    self.on_retrieve_request(sender, &event_id);
                }
                Message::RetrieveReply { event, .. } => self.on_retrieve_reply(event, now),
            }
        }

        self.run_recovery(now);
        self.gossip_round(now);

        debug_assert!(
            self.invariants_hold(),
            "process {} violated a buffer invariant",
            self.id
        );
    }

    /// Merge one inbound gossip into local state.
    ///
    /// Unsubscriptions are applied before subscriptions so a departing peer cannot be re-added
    /// through a subscription entry in the same message.
    fn on_gossip(&mut self, gossip: Gossip, now: Tick) {
        trace!(sender = gossip.sender, events = gossip.events.len(), "gossip received");

        for unsub in &gossip.unsubs {
            self.view.remove(unsub);
            self.subs.remove(unsub);
            self.unsubs.entry(*unsub).or_insert(now);
        }
        self.trim_unsubs(now);

        for sub in &gossip.subs {
            // A buffered unsubscription wins over any later subscription entry for the same
            // peer, also across messages.
            if *sub == self.id || self.unsubs.contains_key(sub) {
                continue;
            }
            self.view.observe(*sub);
            self.subs.observe(*sub);
        }
        self.trim_view();
        self.trim_subs();

        for event in gossip.events {
            self.process_event(event);
        }
        self.store.trim_events(&self.config, now, &self.rng);

        for event_id in gossip.event_ids {
            if !self.store.contains_delivered(&event_id)
                && self.recovery.note_missing(event_id, now, gossip.sender)
            {
                debug!(event = %event_id, sender = gossip.sender, "detected missing event");
            }
        }
        self.store.trim_delivered(self.config.event_ids_max);
    }

    /// Deliver an event on first reception and merge the age of duplicate copies.
    fn process_event(&mut self, event: Event) {
        if !self.store.contains_delivered(&event.id()) {
            trace!(event = %event.id(), age = event.age(), "delivering event");
            // The delivered-id FIFO may have forgotten an event which is still buffered;
            // the buffer itself stays id-unique.
            if !self.store.contains_event(&event.id()) {
                self.store.insert(event.clone());
            }
            self.host.deliver(self.id, &event);
            self.store.record_delivered(event.id());
        }
        self.store.raise_age(&event.id(), event.age());
    }

    /// Answer a retransmission request from the current events or the archive.
    fn on_retrieve_request(&self, sender: ProcessId, event_id: &EventId) {
        if let Some(event) = self.store.lookup(event_id) {
            trace!(event = %event_id, requester = sender, "serving retransmission");
            self.host.send(
                sender,
                Message::RetrieveReply {
                    sender: self.id,
                    event,
                },
            );
        }
    }

    fn on_retrieve_reply(&mut self, event: Event, now: Tick) {
        self.recovery.resolve(&event.id());
        self.process_event(event);
        self.store.trim_events(&self.config, now, &self.rng);
        self.store.trim_delivered(self.config.event_ids_max);
    }

    /// Promote aged gaps into retrieve requests and retry unanswered ones.
    fn run_recovery(&mut self, now: Tick) {
        let promoted = self.recovery.promote(now, self.config.recovery_delay, |event_id| {
            self.store.contains_delivered(event_id)
        });
        for (target, event_id) in promoted {
            self.host.send(
                target,
                Message::RetrieveRequest {
                    sender: self.id,
                    event_id,
                },
            );
        }

        let advanced = self.recovery.advance(now, self.config.recovery_timeout, || {
            self.view.random_targets(1, &self.rng).into_iter().next()
        });
        for (target, event_id) in advanced {
            self.host.send(
                target,
                Message::RetrieveRequest {
                    sender: self.id,
                    event_id,
                },
            );
        }
    }

    /// Emit one gossip round and rotate the event buffer into the archive.
    fn gossip_round(&mut self, now: Tick) {
        self.store.increment_ages();

        let mut subs: Vec<ProcessId> = self.subs.ids().collect();
        if self.unsubscription_requested {
            // Latch our own departure so it propagates with this and future rounds.
            self.unsubs.insert(self.id, now);
        } else {
            subs.push(self.id);
        }
        let unsubs: Vec<ProcessId> = self.unsubs.keys().copied().collect();
        let events = self.store.snapshot_events();
        let event_ids = self.store.snapshot_delivered();

        for target in self.view.random_targets(self.config.fanout, &self.rng) {
            self.host.send(
                target,
                Message::Gossip(Gossip {
                    sender: self.id,
                    events: events.clone(),
                    subs: subs.clone(),
                    unsubs: unsubs.clone(),
                    event_ids: event_ids.clone(),
                }),
            );
        }

        self.store.rotate_to_archive(now, self.config.archived_max);

        if self.unsubscription_requested {
            debug!("departing after final gossip round");
            self.depart();
        }
    }

    fn depart(&mut self) {
        self.view.clear();
        self.subs.clear();
        self.unsubs.clear();
        self.store.clear();
        self.recovery.clear();
        self.inbox.clear();
        self.unsubscription_requested = false;
        self.is_unsubscribed = true;
    }

    fn trim_view(&mut self) {
        while self.view.len() > self.config.view_max {
            let Some(target) = self.view.select_for_eviction(
                self.config.frequency_based_membership_purging,
                self.config.frequency_bias,
                &self.rng,
            ) else {
                break;
            };
            if let Some(frequency) = self.view.remove(&target) {
                // Demote the evicted peer into the subscription pool so it keeps circulating.
                self.subs.set(target, frequency);
            }
        }
    }

    fn trim_subs(&mut self) {
        while self.subs.len() > self.config.subs_max {
            let Some(target) = self.subs.select_for_eviction(
                self.config.frequency_based_membership_purging,
                self.config.frequency_bias,
                &self.rng,
            ) else {
                break;
            };
            self.subs.remove(&target);
        }
    }

    fn trim_unsubs(&mut self, now: Tick) {
        if self.unsubs.len() <= self.config.unsubs_max {
            return;
        }

        let validity = self.config.unsubs_validity;
        self.unsubs.retain(|_, admitted| *admitted + validity > now);

        while self.unsubs.len() > self.config.unsubs_max {
            let Some(victim) = self.rng.choose(self.unsubs.keys().copied()) else {
                break;
            };
            self.unsubs.remove(&victim);
        }
    }

    fn invariants_hold(&self) -> bool {
        self.view.len() <= self.config.view_max
            && self.subs.len() <= self.config.subs_max
            && self.unsubs.len() <= self.config.unsubs_max
            && self.store.events_len() <= self.config.events_max
            && self.store.delivered_len() <= self.config.event_ids_max
            && self.store.archived_len() <= self.config.archived_max
            && !self.view.contains(&self.id)
            && !self.subs.contains(&self.id)
            && !self.store.overlaps_archive()
            && self.unsubs.keys().all(|peer| !self.view.contains(peer))
            && (!self.is_unsubscribed
                || (self.view.is_empty()
                    && self.subs.is_empty()
                    && self.unsubs.is_empty()
                    && self.store.events_len() == 0
                    && self.store.delivered_len() == 0
                    && self.store.archived_len() == 0))
    }

    #[cfg(test)]
    pub(crate) fn recovery(&self) -> &RecoveryTracker {
        &self.recovery
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &EventStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn inject_gossip(&mut self, gossip: Gossip, now: Tick) {
        self.on_gossip(gossip, now);
    }
}
