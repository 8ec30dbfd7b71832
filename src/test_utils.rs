// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic in-memory simulation of a process network, for tests and examples.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::event::Event;
use crate::inbox::Inbox;
use crate::message::Message;
use crate::process::Process;
use crate::rng::Rng;
use crate::traits::Host;
use crate::{ProcessId, Tick};

/// Discrete-event host: a shared clock, a routing table of inboxes and a log of every
/// application-level delivery.
#[derive(Debug, Default)]
pub struct SimHost {
    tick: Mutex<Tick>,
    inboxes: Mutex<HashMap<ProcessId, Inbox>>,
    deliveries: Mutex<Vec<(ProcessId, Event)>>,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ProcessId, inbox: Inbox) {
        self.inboxes.lock().unwrap().insert(id, inbox);
    }

    /// Remove a process from the routing table; subsequent sends to it are dropped.
    pub fn unregister(&self, id: ProcessId) {
        self.inboxes.lock().unwrap().remove(&id);
    }

    pub fn advance(&self) {
        *self.tick.lock().unwrap() += 1;
    }

    /// Every `(process, event)` delivery upcall recorded so far.
    pub fn deliveries(&self) -> Vec<(ProcessId, Event)> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl Host for SimHost {
    fn now(&self) -> Tick {
        *self.tick.lock().unwrap()
    }

    fn send(&self, to: ProcessId, message: Message) {
        let now = self.now();
        if let Some(inbox) = self.inboxes.lock().unwrap().get(&to) {
            inbox.receive(message, now);
        }
    }

    fn deliver(&self, process: ProcessId, event: &Event) {
        self.deliveries.lock().unwrap().push((process, event.clone()));
    }
}

/// A set of processes driven in lockstep over a shared [`SimHost`].
///
/// Every process gets its own RNG seeded from its id, so runs are reproducible.
pub struct SimNetwork {
    host: Arc<SimHost>,
    processes: BTreeMap<ProcessId, Process<Arc<SimHost>>>,
}

impl SimNetwork {
    pub fn new(config: Config, ids: impl IntoIterator<Item = ProcessId>) -> Self {
        let host = Arc::new(SimHost::new());
        let mut processes = BTreeMap::new();

        for id in ids {
            let process = Process::new(id, config.clone(), host.clone(), Rng::from_seed(seed(id)))
                .expect("valid simulation config");
            host.register(id, process.inbox());
            processes.insert(id, process);
        }

        Self { host, processes }
    }

    /// Seed every process' view with every other process.
    pub fn connect_all(&mut self) {
        let ids: Vec<ProcessId> = self.processes.keys().copied().collect();
        for process in self.processes.values_mut() {
            for id in &ids {
                process.add_peer(*id);
            }
        }
    }

    /// Step every process once per tick, for the given number of ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            for process in self.processes.values_mut() {
                process.step();
            }
            self.host.advance();
        }
    }

    pub fn now(&self) -> Tick {
        self.host.now()
    }

    pub fn host(&self) -> &Arc<SimHost> {
        &self.host
    }

    pub fn process(&self, id: ProcessId) -> &Process<Arc<SimHost>> {
        self.processes.get(&id).expect("process exists")
    }

    pub fn process_mut(&mut self, id: ProcessId) -> &mut Process<Arc<SimHost>> {
        self.processes.get_mut(&id).expect("process exists")
    }

    /// Events delivered to one process, in delivery order.
    pub fn deliveries_for(&self, id: ProcessId) -> Vec<Event> {
        self.host
            .deliveries()
            .into_iter()
            .filter(|(process, _)| *process == id)
            .map(|(_, event)| event)
            .collect()
    }
}

fn seed(id: ProcessId) -> [u8; 32] {
    let mut seed = [0; 32];
    seed[..8].copy_from_slice(&id.to_le_bytes());
    seed
}
