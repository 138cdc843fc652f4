/// Protocol state shared between a [`Peer`](super::Peer) handle and its
/// background task.
///
/// Every entry point re-reads the store and acts on what it finds, so
/// repeated, duplicated or reordered notifications converge on the same
/// result instead of corrupting anything.
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use xt_store::{SharedStore, StorageEvent, StoreError};

use crate::config::PeerConfig;
use crate::discovery::{Directory, PingProbe};
use crate::envelope::Envelope;
use crate::error::PeerError;
use crate::events::{GroupEvent, GroupEventBus};
use crate::handler::HandlerRegistry;
use crate::keys::{KeyKind, KeySpace, RecordField};
use crate::types::now_ms;

use super::PeerIdentity;

pub(crate) struct PeerCore {
    pub(crate) identity: PeerIdentity,
    pub(crate) keys: KeySpace,
    pub(crate) config: PeerConfig,
    pub(crate) store: Arc<dyn SharedStore>,
    handlers: Arc<HandlerRegistry>,
    bus: GroupEventBus,
    probe: Option<PingProbe>,
    /// Held while reacting to a tick or notification; false once resigned.
    gate: Mutex<bool>,
    /// Whether the last election pass found this peer in the master slot.
    master: AtomicBool,
    /// Message keys (with the value seen) already consumed here.
    consumed: Mutex<LruCache<String, String>>,
    send_seq: AtomicU64,
}

impl PeerCore {
    pub(crate) fn new(
        identity: PeerIdentity,
        config: PeerConfig,
        store: Arc<dyn SharedStore>,
        handlers: Arc<HandlerRegistry>,
        bus: GroupEventBus,
        probe: Option<PingProbe>,
    ) -> Self {
        let keys = KeySpace::new(&config.namespace, &identity.group);
        let capacity = NonZeroUsize::new(config.consumed_cache).unwrap_or(NonZeroUsize::MIN);
        Self {
            identity,
            keys,
            config,
            store,
            handlers,
            bus,
            probe,
            gate: Mutex::new(true),
            master: AtomicBool::new(false),
            consumed: Mutex::new(LruCache::new(capacity)),
            send_seq: AtomicU64::new(0),
        }
    }

    fn id(&self) -> &str {
        &self.identity.id
    }

    /// Lock the gate, returning `None` once this peer has resigned.
    fn enter(&self) -> Option<MutexGuard<'_, bool>> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if *gate {
            Some(gate)
        } else {
            None
        }
    }

    pub(crate) fn directory(&self) -> Directory<'_> {
        Directory {
            store: self.store.as_ref(),
            keys: &self.keys,
            probe: self.probe.as_ref(),
            dead_threshold: self.config.dead_threshold(),
        }
    }

    // ── Published record ─────────────────────────────────────────────

    /// Write the full record: title, details, types and a fresh ping.
    pub(crate) fn publish_record(&self) -> Result<(), StoreError> {
        self.store
            .set(&self.keys.record(self.id(), RecordField::Title), &self.identity.title)?;
        self.store.set(
            &self.keys.record(self.id(), RecordField::Details),
            &self.identity.details,
        )?;
        self.publish_types()?;
        self.write_ping()
    }

    pub(crate) fn publish_types(&self) -> Result<(), StoreError> {
        let types = serde_json::to_string(&self.handlers.types())
            .unwrap_or_else(|_| "[]".to_string());
        self.store
            .set(&self.keys.record(self.id(), RecordField::Types), &types)
    }

    /// Republish capabilities and pick up messages the new handler accepts.
    /// Does nothing once the peer has halted or resigned.
    pub(crate) fn handlers_changed(&self) -> Result<(), StoreError> {
        let Some(_gate) = self.enter() else {
            tracing::debug!(peer = %self.id(), "peer inactive, handler registered locally only");
            return Ok(());
        };
        self.publish_types()?;
        self.deliver_pending();
        Ok(())
    }

    fn write_ping(&self) -> Result<(), StoreError> {
        self.store.set(
            &self.keys.record(self.id(), RecordField::Ping),
            &now_ms().to_string(),
        )
    }

    // ── Liveness and election ────────────────────────────────────────

    /// One liveness cycle: refresh the ping, re-run the election and pick
    /// up any message whose notification never arrived.
    pub(crate) fn on_tick(&self) {
        let Some(_gate) = self.enter() else { return };
        if let Err(e) = self.write_ping() {
            tracing::warn!(peer = %self.id(), error = %e, "liveness write failed, retrying next tick");
        }
        self.evaluate_master();
        self.deliver_pending();
    }

    /// Claim the master slot if it is empty or names a dead peer.
    ///
    /// Two peers may claim at once; whichever write each context sees last
    /// stands, and the loser steps down on its next evaluation.
    pub(crate) fn evaluate_master(&self) {
        let master_key = self.keys.master();
        let current = self.store.get(&master_key);

        let held = match current.as_deref() {
            Some(id) if id == self.id() => true,
            Some(id) if !self.directory().is_dead(id, now_ms()) => false,
            stale => {
                tracing::debug!(
                    peer = %self.id(),
                    group = %self.keys.group(),
                    previous = ?stale,
                    "master slot empty or stale, claiming"
                );
                if let Err(e) = self.store.set(&master_key, self.id()) {
                    tracing::warn!(peer = %self.id(), error = %e, "failed to claim master slot");
                    return;
                }
                // Another context may have written in between.
                self.store.get(&master_key).as_deref() == Some(self.id())
            }
        };

        self.set_master(held);
    }

    fn set_master(&self, held: bool) {
        let was = self.master.swap(held, Ordering::SeqCst);
        if held && !was {
            tracing::info!(peer = %self.id(), group = %self.keys.group(), "appointed master");
            self.bus.publish(GroupEvent::master_appointed(self.keys.group()));
        } else if !held && was {
            tracing::info!(peer = %self.id(), group = %self.keys.group(), "no longer master");
        }
    }

    // ── Notifications and delivery ───────────────────────────────────

    /// React to a change made by another context.
    pub(crate) fn on_change(&self, event: &StorageEvent) {
        let Some(_gate) = self.enter() else { return };
        let Some(kind) = self.keys.parse(&event.key) else { return };

        match kind {
            KeyKind::Master
            | KeyKind::Record {
                field: RecordField::Ping,
                ..
            } => self.evaluate_master(),
            KeyKind::Public { .. } | KeyKind::Addressed { .. } if event.new_value.is_some() => {
                self.deliver(&event.key, kind);
            }
            _ => {}
        }
    }

    /// Full pass after notifications may have been lost: re-run the
    /// election and pick up every message waiting for this peer.
    pub(crate) fn resync(&self) {
        let Some(_gate) = self.enter() else { return };
        self.evaluate_master();
        self.deliver_pending();
    }

    /// Deliver every message already in the store for this peer.
    pub(crate) fn deliver_pending(&self) {
        for key in self.store.keys() {
            if let Some(kind) = self.keys.parse(&key) {
                if kind.is_message() {
                    self.deliver(&key, kind);
                }
            }
        }
    }

    fn deliver(&self, key: &str, kind: KeyKind<'_>) {
        let sender = match kind {
            KeyKind::Public { sender } if sender != self.id() => sender,
            KeyKind::Addressed { target, sender } if target == self.id() => sender,
            _ => return,
        };

        // Read the store, not the notification: a duplicate notification
        // for a consumed key finds nothing here.
        let Some(raw) = self.store.get(key) else { return };

        let mut envelope = match Envelope::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(peer = %self.id(), key, error = %e, "skipping malformed envelope");
                return;
            }
        };
        envelope.from = Some(sender.to_string());

        let Some(handler) = self.handlers.find(&envelope.msg_type) else {
            tracing::debug!(
                peer = %self.id(),
                key,
                msg_type = %envelope.msg_type,
                "no handler for message type, leaving it"
            );
            return;
        };

        if !self.claim(key, raw) {
            tracing::debug!(peer = %self.id(), key, "skipping already consumed message");
            return;
        }
        tracing::debug!(peer = %self.id(), key, msg_type = %envelope.msg_type, "delivering message");
        handler.process(&envelope);
        self.store.remove(key);
    }

    /// Record `key` as consumed. False if this exact message already was,
    /// so concurrent delivery paths hand it to one handler only.
    fn claim(&self, key: &str, raw: String) -> bool {
        let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        if consumed.get(key).is_some_and(|seen| *seen == raw) {
            return false;
        }
        consumed.put(key.to_string(), raw);
        true
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Write `envelope` for `target`, or the public channel. Returns the key.
    pub(crate) fn send(&self, envelope: &Envelope, target: Option<&str>) -> Result<String, PeerError> {
        let seq = self.send_seq.fetch_add(1, Ordering::Relaxed);
        let uniquifier = format!("{}-{seq}", envelope.timestamp);
        let key = match target {
            Some(target) => self.keys.addressed_message(target, self.id(), &uniquifier),
            None => self.keys.public_message(self.id(), &uniquifier),
        };
        self.store.set(&key, &envelope.to_json()?)?;
        tracing::debug!(peer = %self.id(), key = %key, msg_type = %envelope.msg_type, "sent message");
        Ok(key)
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Stop reacting to ticks and notifications without touching the store.
    pub(crate) fn deactivate(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Remove this peer's record and give up the master slot if held.
    pub(crate) fn resign(&self) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        *gate = false;

        let master_key = self.keys.master();
        if self.store.get(&master_key).as_deref() == Some(self.id()) {
            tracing::info!(peer = %self.id(), group = %self.keys.group(), "resigning master");
            self.store.remove(&master_key);
        }
        self.master.store(false, Ordering::SeqCst);

        for field in RecordField::ALL {
            self.store.remove(&self.keys.record(self.id(), field));
        }
    }
}
