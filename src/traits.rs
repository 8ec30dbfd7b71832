// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use crate::event::Event;
use crate::message::Message;
use crate::{ProcessId, Tick};

/// Scheduling, routing and delivery surface a process is driven by.
///
/// The host owns the clock and the mapping from process ids to reachable peers; processes never
/// hold references to each other. Under a discrete-event simulation the host advances the tick
/// explicitly, under a wall-clock scheduler a tick is whatever period the scheduler steps
/// processes at.
pub trait Host {
    /// Current tick of the monotonic protocol clock.
    fn now(&self) -> Tick;

    /// Route a message to the process with the given id.
    ///
    /// An unknown target is a silent no-op: the peer has left the system and the protocol
    /// tolerates the loss.
    fn send(&self, to: ProcessId, message: Message);

    /// Application upcall, invoked at most once per event id on each process.
    fn deliver(&self, process: ProcessId, event: &Event);
}

impl<H: Host + ?Sized> Host for &H {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn send(&self, to: ProcessId, message: Message) {
        (**self).send(to, message)
    }

    fn deliver(&self, process: ProcessId, event: &Event) {
        (**self).deliver(process, event)
    }
}

impl<H: Host + ?Sized> Host for Arc<H> {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn send(&self, to: ProcessId, message: Message) {
        (**self).send(to, message)
    }

    fn deliver(&self, process: ProcessId, event: &Event) {
        (**self).deliver(process, event)
    }
}
