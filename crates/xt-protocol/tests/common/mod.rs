//! Shared helpers for the xt-protocol integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use xt_protocol::{Envelope, FnHandler, GroupEventBus, MessageHandler, Peer, PeerConfig};
use xt_store::MemoryStore;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xt_protocol=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Fast liveness so election tests finish quickly.
pub fn fast_config() -> PeerConfig {
    PeerConfig::default()
        .namespace("xt")
        .ping_interval(Duration::from_millis(50))
        .dead_multiplier(3)
}

/// An uninitialized peer with a fixed id and its own event bus.
pub fn peer(medium: &MemoryStore, id: &str, group: &str, config: PeerConfig, bus: &GroupEventBus) -> Peer {
    let mut peer = Peer::with_config(medium.context(), config);
    peer.set_id(id).unwrap();
    peer.set_group(group).unwrap();
    peer.set_title(format!("title-{id}")).unwrap();
    peer.set_event_bus(bus.clone()).unwrap();
    peer
}

/// Handler recording every envelope it is given.
pub fn recorder<I, S>(types: I) -> (Arc<dyn MessageHandler>, Arc<Mutex<Vec<Envelope>>>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = FnHandler::new(types, move |env: &Envelope| {
        sink.lock().unwrap().push(env.clone());
    });
    (Arc::new(handler), seen)
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
