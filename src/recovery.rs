// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing::debug;

use crate::ProcessId;
use crate::Tick;
use crate::event::EventId;

/// Stage of an outstanding retrieve request.
///
/// Requests walk through the stages in order, balancing locality against correctness under
/// sender failure: first the peer which announced the event, then a random peer (the event has
/// likely spread beyond the announcer by now), finally the originator as the last resort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrieveStage {
    Sender,
    Random,
    Originator,
}

/// An event id announced by a peer but not yet delivered locally.
#[derive(Clone, Debug)]
struct MissingEvent {
    event_id: EventId,
    discovered_at: Tick,
    observed_from: ProcessId,
}

/// An outstanding retrieve request waiting for a reply.
#[derive(Clone, Debug)]
struct ActiveRequest {
    event_id: EventId,
    sent_at: Tick,
    stage: RetrieveStage,
}

/// Tracks known event gaps and drives the staged retransmission state machine.
///
/// Both collections are unbounded by design: missing entries drain on promotion and active
/// requests drain on reply or terminal give-up.
#[derive(Debug, Default)]
pub(crate) struct RecoveryTracker {
    missing: Vec<MissingEvent>,
    active: Vec<ActiveRequest>,
}

impl RecoveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a gap unless the same event id is already tracked.
    ///
    /// Returns true when a new entry was added.
    pub fn note_missing(&mut self, event_id: EventId, now: Tick, observed_from: ProcessId) -> bool {
        if self.missing.iter().any(|missing| missing.event_id == event_id) {
            return false;
        }
        self.missing.push(MissingEvent {
            event_id,
            discovered_at: now,
            observed_from,
        });
        true
    }

    /// Promote gaps which stayed unresolved for more than `recovery_delay` ticks into active
    /// requests, returning the `(target, event_id)` requests to send.
    ///
    /// Entries delivered in the meantime are discarded, and gaps whose event id already has an
    /// active request are dropped without a second request. Due entries always leave the
    /// missing set.
    pub fn promote(
        &mut self,
        now: Tick,
        recovery_delay: u64,
        delivered: impl Fn(&EventId) -> bool,
    ) -> Vec<(ProcessId, EventId)> {
        let mut requests = Vec::new();

        let mut index = 0;
        while index < self.missing.len() {
            if now - self.missing[index].discovered_at <= recovery_delay {
                index += 1;
                continue;
            }

            let missing = self.missing.remove(index);
            if delivered(&missing.event_id) {
                continue;
            }
            if self
                .active
                .iter()
                .any(|request| request.event_id == missing.event_id)
            {
                continue;
            }

            debug!(event = %missing.event_id, peer = missing.observed_from, "requesting missing event");
            self.active.push(ActiveRequest {
                event_id: missing.event_id,
                sent_at: now,
                stage: RetrieveStage::Sender,
            });
            requests.push((missing.observed_from, missing.event_id));
        }

        requests
    }

    /// Advance every request unanswered for at least `recovery_timeout` ticks to its next
    /// stage, returning the follow-up `(target, event_id)` requests to send.
    ///
    /// The random stage is skipped when the caller cannot offer a random peer (empty view);
    /// requests which already asked the originator are given up on.
    pub fn advance(
        &mut self,
        now: Tick,
        recovery_timeout: u64,
        mut random_peer: impl FnMut() -> Option<ProcessId>,
    ) -> Vec<(ProcessId, EventId)> {
        let mut requests = Vec::new();

        let mut index = 0;
        while index < self.active.len() {
            let request = &mut self.active[index];
            if now - request.sent_at < recovery_timeout {
                index += 1;
                continue;
            }

            match request.stage {
                RetrieveStage::Sender => {
                    if let Some(peer) = random_peer() {
                        request.stage = RetrieveStage::Random;
                        request.sent_at = now;
                        requests.push((peer, request.event_id));
                    } else {
                        request.stage = RetrieveStage::Originator;
                        request.sent_at = now;
                        requests.push((request.event_id.origin(), request.event_id));
                    }
                    index += 1;
                }
                RetrieveStage::Random => {
                    request.stage = RetrieveStage::Originator;
                    request.sent_at = now;
                    requests.push((request.event_id.origin(), request.event_id));
                    index += 1;
                }
                RetrieveStage::Originator => {
                    debug!(event = %request.event_id, "giving up on missing event");
                    self.active.remove(index);
                }
            }
        }

        requests
    }

    /// Drop every active request for an event which has arrived.
    pub fn resolve(&mut self, event_id: &EventId) {
        self.active.retain(|request| request.event_id != *event_id);
    }

    pub fn clear(&mut self) {
        self.missing.clear();
        self.active.clear();
    }

    #[cfg(test)]
    pub fn missing_len(&self) -> usize {
        self.missing.len()
    }

    #[cfg(test)]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Stage of the active request for an event id, if one exists.
    #[cfg(test)]
    pub fn stage_of(&self, event_id: &EventId) -> Option<RetrieveStage> {
        self.active
            .iter()
            .find(|request| request.event_id == *event_id)
            .map(|request| request.stage)
    }
}
