// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::Tick;
use crate::config::Config;
use crate::message::Message;
use crate::rng::Rng;

/// In-flight message together with its delivery deadline.
#[derive(Clone, Debug)]
struct Envelope {
    message: Message,
    deliver_at: Tick,
}

/// Inbound message queue of a process.
///
/// This is the only state touched from outside the owning process: many senders append
/// concurrently through cloned handles while the owner drains due messages once per tick.
/// Messages become eligible for dispatch one tick after they were sent, or after a uniformly
/// random delay when synchronous delivery is disabled.
#[derive(Clone, Debug)]
pub struct Inbox {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    queue: Mutex<VecDeque<Envelope>>,
    sync_delivery: bool,
    max_delay: u64,
    rng: Arc<Rng>,
}

impl Inbox {
    pub(crate) fn new(config: &Config, rng: Arc<Rng>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                sync_delivery: config.sync_delivery,
                max_delay: config.message_max_delay,
                rng,
            }),
        }
    }

    /// Append a message, stamping it with the tick at which it becomes eligible for dispatch.
    pub fn receive(&self, message: Message, now: Tick) {
        let delay = if self.inner.sync_delivery {
            1
        } else {
            self.inner.rng.random_range(1..=self.inner.max_delay)
        };

        self.lock().push_back(Envelope {
            message,
            deliver_at: now + delay,
        });
    }

    /// Remove and return every message whose delivery tick has arrived, in queue order.
    ///
    /// Messages stamped with a later tick keep their position for a subsequent drain.
    pub(crate) fn drain_due(&self, now: Tick) -> Vec<Message> {
        let mut queue = self.lock();
        let mut due = Vec::new();

        let mut index = 0;
        while index < queue.len() {
            if queue[index].deliver_at <= now {
                if let Some(envelope) = queue.remove(index) {
                    due.push(envelope.message);
                }
            } else {
                index += 1;
            }
        }

        due
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Number of queued messages, due or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Envelope>> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Inbox;
    use crate::config::Config;
    use crate::message::{Gossip, Message};
    use crate::rng::Rng;

    fn gossip_from(sender: u64) -> Message {
        Message::Gossip(Gossip {
            sender,
            events: Vec::new(),
            subs: Vec::new(),
            unsubs: Vec::new(),
            event_ids: Vec::new(),
        })
    }

    #[test]
    fn synchronous_delivery_is_next_tick() {
        let config = Config {
            sync_delivery: true,
            ..Config::default()
        };
        let inbox = Inbox::new(&config, Arc::new(Rng::from_seed([1; 32])));

        inbox.receive(gossip_from(1), 10);

        assert!(inbox.drain_due(10).is_empty());
        assert_eq!(inbox.drain_due(11).len(), 1);
        assert!(inbox.is_empty());
    }

    #[test]
    fn random_delay_stays_in_bounds() {
        let config = Config {
            sync_delivery: false,
            message_max_delay: 4,
            ..Config::default()
        };
        let inbox = Inbox::new(&config, Arc::new(Rng::from_seed([2; 32])));

        for _ in 0..32 {
            inbox.receive(gossip_from(1), 0);
        }

        // Nothing may arrive on the tick it was sent, everything within the maximum delay.
        assert!(inbox.drain_due(0).is_empty());
        let mut drained = 0;
        for tick in 1..=4 {
            drained += inbox.drain_due(tick).len();
        }
        assert_eq!(drained, 32);
    }

    #[test]
    fn drains_in_queue_order() {
        let config = Config {
            sync_delivery: true,
            ..Config::default()
        };
        let inbox = Inbox::new(&config, Arc::new(Rng::from_seed([3; 32])));

        inbox.receive(gossip_from(1), 0);
        inbox.receive(gossip_from(2), 0);
        inbox.receive(gossip_from(3), 0);

        let senders: Vec<u64> = inbox
            .drain_due(1)
            .into_iter()
            .map(|message| message.sender())
            .collect();
        assert_eq!(senders, vec![1, 2, 3]);
    }
}
