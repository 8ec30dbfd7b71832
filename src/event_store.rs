// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::Tick;
use crate::config::Config;
use crate::event::{Event, EventId};
use crate::rng::Rng;

/// Event buffers of a single process: the events received since the last gossip round, the FIFO
/// of delivered event ids used for duplicate suppression, and the archive of retired events
/// which serves retransmission requests.
///
/// An event is either current or archived, never both. The current buffer is id-unique because
/// insertion is guarded by the delivered-id check.
#[derive(Debug, Default)]
pub(crate) struct EventStore {
    events: Vec<Event>,
    delivered: VecDeque<EventId>,
    archived: HashMap<Event, Tick>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_len(&self) -> usize {
        self.events.len()
    }

    pub fn delivered_len(&self) -> usize {
        self.delivered.len()
    }

    pub fn archived_len(&self) -> usize {
        self.archived.len()
    }

    pub fn contains_delivered(&self, event_id: &EventId) -> bool {
        self.delivered.contains(event_id)
    }

    pub fn contains_event(&self, event_id: &EventId) -> bool {
        self.events.iter().any(|event| event.id() == *event_id)
    }

    /// Snapshot of the current events for gossip assembly.
    pub fn snapshot_events(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// Snapshot of the delivered event ids for gossip assembly.
    pub fn snapshot_delivered(&self) -> Vec<EventId> {
        self.delivered.iter().copied().collect()
    }

    pub fn insert(&mut self, event: Event) {
        debug_assert!(
            !self.events.iter().any(|existing| existing.id() == event.id()),
            "event buffer must stay id-unique"
        );
        self.events.push(event);
    }

    pub fn record_delivered(&mut self, event_id: EventId) {
        self.delivered.push_back(event_id);
    }

    /// Raise the age of the stored copy of an event to at least `age`.
    pub fn raise_age(&mut self, event_id: &EventId, age: u64) {
        for event in &mut self.events {
            if event.id() == *event_id {
                event.raise_age(age);
            }
        }
    }

    /// Age every current event by one hop.
    pub fn increment_ages(&mut self) {
        for event in &mut self.events {
            event.increment_age();
        }
    }

    /// Find a copy of an event for retransmission, in the current buffer first, then in the
    /// archive.
    pub fn lookup(&self, event_id: &EventId) -> Option<Event> {
        self.events
            .iter()
            .find(|event| event.id() == *event_id)
            .or_else(|| self.archived.keys().find(|event| event.id() == *event_id))
            .cloned()
    }

    /// Retire every current event into the archive, stamped with the current tick.
    pub fn rotate_to_archive(&mut self, now: Tick, archived_max: usize) {
        for event in self.events.drain(..) {
            self.archived.insert(event, now);
        }
        self.trim_archived(archived_max);
    }

    /// Two-stage purge of the current events down to the configured bound.
    ///
    /// With age-based purging, events beaten by more than `long_ago` hops by a sibling from the
    /// same origin are dropped outright first; if that is not enough the oldest events are
    /// retired into the archive. Without it, uniformly random events are retired.
    pub fn trim_events(&mut self, config: &Config, now: Tick, rng: &Rng) {
        if config.age_based_event_purging {
            while self.events.len() > config.events_max {
                let beaten: Vec<EventId> = self
                    .events
                    .iter()
                    .filter(|event| {
                        self.events.iter().any(|other| {
                            other.id().origin() == event.id().origin()
                                && other.age() > event.age() + config.long_ago
                        })
                    })
                    .map(|event| event.id())
                    .collect();

                if beaten.is_empty() {
                    break;
                }

                trace!(dropped = beaten.len(), "purging beaten events");
                self.events.retain(|event| !beaten.contains(&event.id()));
            }

            while self.events.len() > config.events_max {
                let oldest = self
                    .events
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, event)| event.age())
                    .map(|(index, _)| index);
                let Some(index) = oldest else {
                    break;
                };
                let event = self.events.swap_remove(index);
                self.archived.insert(event, now);
            }
        } else {
            while self.events.len() > config.events_max {
                let Some(index) = rng.random_index(self.events.len()) else {
                    break;
                };
                let event = self.events.swap_remove(index);
                self.archived.insert(event, now);
            }
        }

        self.trim_archived(config.archived_max);
    }

    /// Drop delivered ids from the head of the FIFO until within bounds.
    pub fn trim_delivered(&mut self, event_ids_max: usize) {
        while self.delivered.len() > event_ids_max {
            self.delivered.pop_front();
        }
    }

    /// Drop the archived events with the oldest admission ticks until within bounds.
    pub fn trim_archived(&mut self, archived_max: usize) {
        while self.archived.len() > archived_max {
            let oldest = self
                .archived
                .iter()
                .min_by_key(|(event, admitted)| (**admitted, event.id(), event.age()))
                .map(|(event, _)| event.clone());
            let Some(event) = oldest else {
                break;
            };
            self.archived.remove(&event);
        }
    }

    /// True when some current event is also archived.
    pub fn overlaps_archive(&self) -> bool {
        self.events.iter().any(|event| self.archived.contains_key(event))
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.delivered.clear();
        self.archived.clear();
    }
}
