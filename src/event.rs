// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProcessId;

/// Number of random bytes in an event identifier.
pub const EVENT_UID_LEN: usize = 16;

/// Hops an event has travelled since its origin broadcast.
pub type Age = u64;

/// Globally unique identifier of a broadcast event.
///
/// Identity is the pair of a random 128-bit tag, drawn by the originating process at broadcast
/// time, and the id of that process. Both parts take part in equality and hashing, so colliding
/// tags from different origins never alias.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    uid: [u8; EVENT_UID_LEN],
    origin: ProcessId,
}

impl EventId {
    pub fn new(uid: [u8; EVENT_UID_LEN], origin: ProcessId) -> Self {
        Self { uid, origin }
    }

    /// Process which broadcast the event.
    pub fn origin(&self) -> ProcessId {
        self.origin
    }

    /// Random part of the identifier.
    pub fn uid(&self) -> &[u8; EVENT_UID_LEN] {
        &self.uid
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.uid {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "@{}", self.origin)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({self})")
    }
}

/// A broadcast event as stored in process buffers and carried inside gossip.
///
/// The age counts gossip hops since the origin broadcast and ranks events for purging: the older
/// an event the more likely it is that everybody has seen it already. Copies of the same event
/// observed on different paths are merged by keeping the maximum age.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    age: Age,
}

impl Event {
    /// Create a fresh event at age zero.
    pub fn new(id: EventId) -> Self {
        Self { id, age: 0 }
    }

    #[cfg(test)]
    pub(crate) fn with_age(id: EventId, age: Age) -> Self {
        Self { id, age }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn age(&self) -> Age {
        self.age
    }

    pub(crate) fn increment_age(&mut self) {
        self.age += 1;
    }

    pub(crate) fn raise_age(&mut self, age: Age) {
        if age > self.age {
            self.age = age;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, EventId};

    #[test]
    fn identity_is_uid_and_origin() {
        let left = EventId::new([7; 16], 1);
        let same = EventId::new([7; 16], 1);
        let other_origin = EventId::new([7; 16], 2);

        assert_eq!(left, same);
        assert_ne!(left, other_origin);
    }

    #[test]
    fn age_merge_keeps_maximum() {
        let mut event = Event::with_age(EventId::new([0; 16], 1), 4);

        event.raise_age(2);
        assert_eq!(event.age(), 4);

        event.raise_age(9);
        assert_eq!(event.age(), 9);
    }

    #[test]
    fn display_names_origin() {
        let id = EventId::new([0xab; 16], 3);
        assert_eq!(id.to_string(), format!("{}@3", "ab".repeat(16)));
    }
}
