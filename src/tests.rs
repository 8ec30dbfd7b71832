// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::config::Config;
use crate::event::{Event, EventId};
use crate::message::{Gossip, Message};
use crate::recovery::RetrieveStage;
use crate::test_utils::SimNetwork;

/// Small deterministic deployment: synchronous one-tick delivery, tight buffer bounds.
fn test_config() -> Config {
    Config {
        view_max: 5,
        subs_max: 5,
        unsubs_max: 5,
        events_max: 5,
        event_ids_max: 5,
        archived_max: 10,
        unsubs_validity: 50,
        long_ago: 10,
        frequency_bias: 0.5,
        fanout: 3,
        recovery_delay: 20,
        recovery_timeout: 20,
        message_max_delay: 1,
        sync_delivery: true,
        age_based_event_purging: true,
        frequency_based_membership_purging: true,
    }
}

fn gossip(sender: u64, events: Vec<Event>, event_ids: Vec<EventId>) -> Gossip {
    Gossip {
        sender,
        events,
        subs: Vec::new(),
        unsubs: Vec::new(),
        event_ids,
    }
}

#[test]
fn three_process_dissemination() {
    let mut network = SimNetwork::new(test_config(), [1, 2, 3]);
    network.connect_all();

    let event_id = network.process_mut(1).broadcast().unwrap();
    network.run(5);

    for id in [2, 3] {
        let delivered = network.deliveries_for(id);
        assert_eq!(delivered.len(), 1, "process {id} must deliver exactly once");
        assert_eq!(delivered[0].id(), event_id);
    }

    // The originator records the id but never upcalls for its own event.
    assert!(network.deliveries_for(1).is_empty());
}

#[test]
fn unsubscription_propagates_and_process_goes_quiescent() {
    let mut network = SimNetwork::new(test_config(), [1, 2, 3, 4, 5]);
    network.connect_all();
    network.run(5);

    assert!(network.process_mut(3).unsubscribe());
    network.run(15);

    let departed = network.process(3);
    assert!(departed.is_unsubscribed());
    assert!(departed.view().is_empty());
    assert!(departed.subscriptions().is_empty());
    assert!(departed.unsubscriptions().is_empty());

    for id in [1, 2, 4, 5] {
        let process = network.process(id);
        assert!(
            !process.view().contains(&3),
            "process {id} still gossips towards the departed peer"
        );
        assert!(!process.subscriptions().contains(&3));
        assert!(process.unsubscriptions().contains(&3));
    }
}

#[test]
fn missed_event_is_recovered_from_the_announcers_archive() {
    let mut network = SimNetwork::new(test_config(), [1, 2]);
    network.process_mut(2).add_peer(1);

    // Process 1 broadcasts while nobody is in its view: the event rotates straight into its
    // archive without ever being gossiped.
    let event_id = network.process_mut(1).broadcast().unwrap();
    network.run(1);
    assert_eq!(network.process(1).store().archived_len(), 1);

    // Process 2 learns the id only through a summary, never the event itself.
    let now = network.now();
    network
        .process_mut(2)
        .inject_gossip(gossip(1, Vec::new(), vec![event_id]), now);

    network.run(25);

    let delivered = network.deliveries_for(2);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].id(), event_id);
    assert_eq!(network.process(2).recovery().active_len(), 0);
}

#[test]
fn unanswered_recovery_walks_all_stages_then_gives_up() {
    // Process 2 is alone: its view names peer 1, but neither peer 1 nor the supposed
    // originator 99 exist, so no retrieve request is ever answered.
    let mut network = SimNetwork::new(test_config(), [2]);
    network.process_mut(2).add_peer(1);

    let event_id = EventId::new([42; 16], 99);
    network
        .process_mut(2)
        .inject_gossip(gossip(1, Vec::new(), vec![event_id]), 0);
    assert_eq!(network.process(2).recovery().missing_len(), 1);

    network.run(22);
    assert_eq!(
        network.process(2).recovery().stage_of(&event_id),
        Some(RetrieveStage::Sender)
    );

    network.run(20);
    assert_eq!(
        network.process(2).recovery().stage_of(&event_id),
        Some(RetrieveStage::Random)
    );

    network.run(20);
    assert_eq!(
        network.process(2).recovery().stage_of(&event_id),
        Some(RetrieveStage::Originator)
    );

    network.run(20);
    assert_eq!(network.process(2).recovery().stage_of(&event_id), None);
    assert_eq!(network.process(2).recovery().active_len(), 0);
}

#[test]
fn buffers_stay_bounded_under_sustained_load() {
    let mut network = SimNetwork::new(test_config(), [1, 2, 3, 4]);
    network.connect_all();

    // Every process broadcasts every tick for a while; the debug assertions inside `step`
    // check every buffer bound on every process at every tick boundary.
    for _ in 0..10 {
        for id in [1, 2, 3, 4] {
            network.process_mut(id).broadcast();
        }
        network.run(1);
    }
    network.run(20);

    for id in [1, 2, 3, 4] {
        let process = network.process(id);
        assert!(process.view().len() <= 5);
        assert!(process.subscriptions().len() <= 5);
        assert!(process.store().events_len() <= 5);
        assert!(process.store().delivered_len() <= 5);
        assert!(process.store().archived_len() <= 10);
    }
}

#[test]
fn reception_is_idempotent_modulo_frequencies() {
    let mut network = SimNetwork::new(test_config(), [1]);
    let event = Event::with_age(EventId::new([7; 16], 9), 2);

    let summary = Gossip {
        sender: 9,
        events: vec![event.clone()],
        subs: vec![7],
        unsubs: vec![8],
        event_ids: vec![event.id()],
    };

    network.process_mut(1).inject_gossip(summary.clone(), 0);
    network.process_mut(1).inject_gossip(summary, 0);

    let process = network.process(1);
    assert_eq!(network.deliveries_for(1).len(), 1);
    assert_eq!(process.view(), vec![7]);
    assert_eq!(process.unsubscriptions(), vec![8]);
    assert_eq!(process.recovery().missing_len(), 0);
}

#[test]
fn duplicate_events_raise_the_stored_age() {
    let mut network = SimNetwork::new(test_config(), [1]);
    let event_id = EventId::new([7; 16], 9);

    network
        .process_mut(1)
        .inject_gossip(gossip(9, vec![Event::with_age(event_id, 2)], Vec::new()), 0);
    network
        .process_mut(1)
        .inject_gossip(gossip(9, vec![Event::with_age(event_id, 7)], Vec::new()), 0);

    let events = network.process(1).store().snapshot_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].age(), 7);
    assert_eq!(network.deliveries_for(1).len(), 1);
}

#[test]
fn announced_but_missing_events_are_tracked() {
    let mut network = SimNetwork::new(test_config(), [1]);
    let event_id = EventId::new([3; 16], 9);

    network
        .process_mut(1)
        .inject_gossip(gossip(9, Vec::new(), vec![event_id]), 0);

    assert_eq!(network.process(1).recovery().missing_len(), 1);
}

#[test]
fn fanout_is_clamped_to_the_view() {
    let mut network = SimNetwork::new(test_config(), [1, 2, 3]);
    network.process_mut(1).add_peer(2);
    network.process_mut(1).add_peer(3);

    network.run(1);

    // Fanout is three, but only two peers are known: exactly one gossip each.
    assert_eq!(network.process(2).pending_messages(), 1);
    assert_eq!(network.process(3).pending_messages(), 1);
    assert_eq!(network.process(1).pending_messages(), 0);
}

#[test]
fn empty_view_still_rotates_events_into_the_archive() {
    let mut network = SimNetwork::new(test_config(), [1]);

    network.process_mut(1).broadcast().unwrap();
    network.run(1);

    let process = network.process(1);
    assert_eq!(process.store().events_len(), 0);
    assert_eq!(process.store().archived_len(), 1);
    assert!(network.deliveries_for(1).is_empty());
}

#[test]
fn departed_process_can_resubscribe() {
    let mut network = SimNetwork::new(test_config(), [1, 2]);
    network.connect_all();
    network.run(2);

    assert!(network.process_mut(2).unsubscribe());
    assert!(!network.process_mut(2).unsubscribe());
    network.run(2);
    assert!(network.process(2).is_unsubscribed());
    assert!(network.process_mut(2).broadcast().is_none());

    assert!(network.process_mut(2).subscribe(1));
    assert!(!network.process_mut(2).subscribe(1));
    assert_eq!(network.process(2).view(), vec![1]);
    assert!(network.process_mut(2).broadcast().is_some());
}

#[test]
fn messages_survive_a_cbor_round_trip() {
    let message = Message::Gossip(Gossip {
        sender: 4,
        events: vec![Event::with_age(EventId::new([1; 16], 4), 3)],
        subs: vec![4, 5],
        unsubs: vec![6],
        event_ids: vec![EventId::new([2; 16], 5)],
    });

    let mut bytes: Vec<u8> = Vec::new();
    ciborium::ser::into_writer(&message, &mut bytes).unwrap();
    let decoded: Message = ciborium::de::from_reader(&bytes[..]).unwrap();

    assert_eq!(message, decoded);
}
