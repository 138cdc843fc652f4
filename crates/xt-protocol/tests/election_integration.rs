/// Integration tests: master election, resignation and takeover.
mod common;

use std::time::Duration;

use common::{eventually, fast_config, init_tracing, peer};
use xt_protocol::{GroupEventBus, GroupEventKind, PeerConfig};
use xt_store::{MemoryStore, SharedStore};

#[tokio::test]
async fn first_peer_is_master_second_is_not() {
    init_tracing();
    let medium = MemoryStore::new();
    let bus = GroupEventBus::new();
    let mut a = peer(&medium, "a", "good", fast_config(), &bus);
    let mut b = peer(&medium, "b", "good", fast_config(), &bus);

    a.init().unwrap();
    b.init().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(a.is_master());
    assert!(!b.is_master());

    a.cleanup();
    b.cleanup();
}

#[tokio::test]
async fn cleanup_hands_over_master_without_waiting_for_death() {
    init_tracing();
    // Dead threshold of 30s: a takeover within the test window can only
    // come from the resignation.
    let slow = PeerConfig::default()
        .namespace("xt")
        .ping_interval(Duration::from_secs(10));
    let medium = MemoryStore::new();
    let bus = GroupEventBus::new();
    let mut a = peer(&medium, "a", "good", slow.clone(), &bus);
    let mut b = peer(&medium, "b", "good", slow, &bus);
    a.init().unwrap();
    b.init().unwrap();
    assert!(a.is_master());

    let mut events = bus.subscribe("good");
    a.cleanup();
    assert!(!a.is_master());

    assert!(eventually(Duration::from_secs(1), || b.is_master()).await);
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("master event in time")
        .expect("bus open");
    assert_eq!(event.group, "good");
    assert_eq!(event.kind, GroupEventKind::MasterAppointed);

    b.cleanup();
}

#[tokio::test]
async fn halted_master_is_replaced_after_dead_threshold() {
    init_tracing();
    let medium = MemoryStore::new();
    let bus = GroupEventBus::new();
    let mut a = peer(&medium, "a", "good", fast_config(), &bus);
    let mut b = peer(&medium, "b", "good", fast_config(), &bus);
    a.init().unwrap();
    b.init().unwrap();
    assert!(a.is_master());

    a.halt();
    // The record and master slot stay behind, as after a crash.
    assert_eq!(medium.context().get("xt.good.master").as_deref(), Some("a"));

    assert!(eventually(Duration::from_secs(2), || b.is_master()).await);
    assert!(!a.is_master());
    assert_eq!(b.get_peers(None, false), Vec::<String>::new());
    assert_eq!(b.get_peers(None, true), vec!["a"]);

    // A halted peer can still withdraw its record.
    a.cleanup();
    assert!(b.get_peers(None, true).is_empty());
    b.cleanup();
}

#[tokio::test]
async fn group_converges_on_one_master() {
    init_tracing();
    let medium = MemoryStore::new();
    let bus = GroupEventBus::new();
    let mut peers: Vec<_> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|id| peer(&medium, id, "good", fast_config(), &bus))
        .collect();
    for p in &mut peers {
        p.init().unwrap();
    }

    assert!(eventually(Duration::from_secs(1), || peers.iter().filter(|p| p.is_master()).count() == 1).await);

    // Keep retiring the master; someone else must always take over.
    for _ in 0..3 {
        let idx = peers.iter().position(|p| p.is_master()).unwrap();
        let mut retired = peers.remove(idx);
        retired.cleanup();
        assert!(eventually(Duration::from_secs(1), || peers.iter().filter(|p| p.is_master()).count() == 1).await);
    }

    for p in &mut peers {
        p.cleanup();
    }
}

#[tokio::test]
async fn groups_elect_independently() {
    let medium = MemoryStore::new();
    let bus = GroupEventBus::new();
    let mut good_events = bus.subscribe("good");
    let mut evil_events = bus.subscribe("evil");

    let mut a = peer(&medium, "a", "good", fast_config(), &bus);
    let mut e = peer(&medium, "e", "evil", fast_config(), &bus);
    a.init().unwrap();
    e.init().unwrap();

    assert!(a.is_master());
    assert!(e.is_master());
    assert_eq!(good_events.try_recv().map(|ev| ev.group).as_deref(), Some("good"));
    assert_eq!(evil_events.try_recv().map(|ev| ev.group).as_deref(), Some("evil"));
    assert!(good_events.try_recv().is_none());

    a.cleanup();
    e.cleanup();
}

#[tokio::test]
async fn stale_master_record_is_claimed_on_init() {
    let medium = MemoryStore::new();
    let bus = GroupEventBus::new();
    // Left behind by a context that died without cleaning up.
    let leftover = medium.context();
    leftover.set("xt.good.master", "ghost").unwrap();
    leftover.set("xt.good.ghost.ping", "1").unwrap();

    let mut a = peer(&medium, "a", "good", fast_config(), &bus);
    a.init().unwrap();
    assert!(a.is_master());

    a.cleanup();
    leftover.remove("xt.good.ghost.ping");
    assert!(medium.is_empty());
}
