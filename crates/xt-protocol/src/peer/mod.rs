/// Peer — one context's participant in its group.
///
/// Lifecycle: `Uninitialized → Active → CleanedUp`. Identity is set while
/// uninitialized; `init()` publishes it, starts the liveness loop and joins
/// the master election; `cleanup()` withdraws everything again.
mod engine;
mod task;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use xt_store::SharedStore;

use crate::config::PeerConfig;
use crate::discovery::{Directory, PingProbe};
use crate::envelope::Envelope;
use crate::error::PeerError;
use crate::events::{GroupEventBus, GroupSubscription};
use crate::handler::{HandlerRegistry, MessageHandler};
use crate::info::PeerInfo;
use crate::keys::{validate_peer_id, validate_segment, KeySpace};
use crate::types::{now_ms, DEFAULT_GROUP};
use crate::wait::{PeerWait, WaitRequest};

use self::engine::PeerCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Uninitialized,
    Active,
    CleanedUp,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
            Self::CleanedUp => write!(f, "cleaned up"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PeerIdentity {
    pub(crate) id: String,
    pub(crate) group: String,
    pub(crate) title: String,
    pub(crate) details: String,
}

impl PeerIdentity {
    fn generated() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let title = format!("peer-{}", &id[..8]);
        Self {
            id,
            group: DEFAULT_GROUP.to_string(),
            title,
            details: String::new(),
        }
    }
}

struct PeerTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl PeerTask {
    /// Ask the loop to exit after its current step.
    fn stop(self) {
        let _ = self.shutdown.send(());
    }

    fn abort(self) {
        self.handle.abort();
    }
}

pub struct Peer {
    identity: PeerIdentity,
    config: PeerConfig,
    store: Arc<dyn SharedStore>,
    handlers: Arc<HandlerRegistry>,
    bus: GroupEventBus,
    probe: Option<PingProbe>,
    state: PeerState,
    core: Option<Arc<PeerCore>>,
    task: Option<PeerTask>,
}

impl Peer {
    /// Create an uninitialized peer with a generated id in the default group.
    pub fn new<S: SharedStore + 'static>(store: S) -> Self {
        Self::with_config(store, PeerConfig::new())
    }

    pub fn with_config<S: SharedStore + 'static>(store: S, config: PeerConfig) -> Self {
        Self {
            identity: PeerIdentity::generated(),
            config,
            store: Arc::new(store),
            handlers: Arc::new(HandlerRegistry::new()),
            bus: GroupEventBus::global().clone(),
            probe: None,
            state: PeerState::Uninitialized,
            core: None,
            task: None,
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn group(&self) -> &str {
        &self.identity.group
    }

    pub fn title(&self) -> &str {
        &self.identity.title
    }

    pub fn details(&self) -> &str {
        &self.identity.details
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    fn ensure_uninitialized(&self) -> Result<(), PeerError> {
        if self.state == PeerState::Uninitialized {
            Ok(())
        } else {
            Err(PeerError::IdentityLocked)
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> Result<(), PeerError> {
        self.ensure_uninitialized()?;
        let id = id.into();
        validate_peer_id(&id)?;
        self.identity.id = id;
        Ok(())
    }

    pub fn set_group(&mut self, group: impl Into<String>) -> Result<(), PeerError> {
        self.ensure_uninitialized()?;
        let group = group.into();
        validate_segment("group", &group)?;
        self.identity.group = group;
        Ok(())
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> Result<(), PeerError> {
        self.ensure_uninitialized()?;
        self.identity.title = title.into();
        Ok(())
    }

    pub fn set_details(&mut self, details: impl Into<String>) -> Result<(), PeerError> {
        self.ensure_uninitialized()?;
        self.identity.details = details.into();
        Ok(())
    }

    /// Publish coordination events on `bus` instead of the global bus.
    pub fn set_event_bus(&mut self, bus: GroupEventBus) -> Result<(), PeerError> {
        self.ensure_uninitialized()?;
        self.bus = bus;
        Ok(())
    }

    /// Override how other peers' liveness timestamps are read.
    pub fn set_ping_probe(&mut self, probe: PingProbe) -> Result<(), PeerError> {
        self.ensure_uninitialized()?;
        self.probe = Some(probe);
        Ok(())
    }

    pub fn event_bus(&self) -> &GroupEventBus {
        &self.bus
    }

    /// Subscribe to coordination events of this peer's group.
    pub fn subscribe_events(&self) -> GroupSubscription {
        self.bus.subscribe(&self.identity.group)
    }

    // ── Handlers ─────────────────────────────────────────────────────

    /// Register a handler. Earlier handlers take priority.
    ///
    /// On an active peer the published type list is refreshed at once and
    /// messages left waiting for the new types are delivered.
    pub fn add_handler(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), PeerError> {
        if self.state == PeerState::CleanedUp {
            return Err(PeerError::InvalidState {
                operation: "add a handler to",
                state: self.state,
            });
        }
        self.handlers.add(handler);

        if let Some(core) = self.active_core() {
            core.handlers_changed()?;
        }
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Publish this peer and start coordinating.
    ///
    /// Must run inside a tokio runtime.
    pub fn init(&mut self) -> Result<(), PeerError> {
        if self.state != PeerState::Uninitialized {
            return Err(PeerError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        validate_segment("namespace", &self.config.namespace)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PeerError::NoRuntime)?;

        let core = Arc::new(PeerCore::new(
            self.identity.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.handlers),
            self.bus.clone(),
            self.probe.clone(),
        ));

        // Subscribe first so nothing written from here on is missed.
        let subscription = self.store.subscribe();
        if let Err(e) = core.publish_record() {
            core.resign();
            return Err(e.into());
        }
        core.evaluate_master();
        core.deliver_pending();

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(task::peer_loop(Arc::clone(&core), subscription, shutdown_rx));

        self.core = Some(core);
        self.task = Some(PeerTask { shutdown, handle });
        self.state = PeerState::Active;
        tracing::info!(peer = %self.identity.id, group = %self.identity.group, "peer initialized");
        Ok(())
    }

    /// Stop coordinating and withdraw this peer from the store.
    ///
    /// Resigns the master slot if held so another peer can take it without
    /// waiting for the dead threshold. Safe to call more than once.
    /// Pending [`wait_for_peer`](Self::wait_for_peer) futures are not
    /// cancelled; they settle on their own.
    pub fn cleanup(&mut self) {
        if self.state != PeerState::Active {
            return;
        }
        if let Some(task) = self.task.take() {
            task.stop();
        }
        if let Some(core) = &self.core {
            core.resign();
        }
        self.state = PeerState::CleanedUp;
        tracing::info!(peer = %self.identity.id, group = %self.identity.group, "peer cleaned up");
    }

    /// Stop the liveness loop without resigning or removing anything, as if
    /// this context had vanished. Other peers see it die after the dead
    /// threshold. `cleanup()` still withdraws the record afterwards.
    ///
    /// A halted peer no longer publishes types or consumes messages, even
    /// when handlers are added. The state stays [`PeerState::Active`] and
    /// [`send`](Self::send) still writes.
    pub fn halt(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(core) = &self.core {
            core.deactivate();
        }
        tracing::info!(peer = %self.identity.id, "peer halted");
    }

    fn active_core(&self) -> Option<&Arc<PeerCore>> {
        match self.state {
            PeerState::Active => self.core.as_ref(),
            _ => None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    fn key_space(&self) -> KeySpace {
        KeySpace::new(&self.config.namespace, &self.identity.group)
    }

    fn with_directory<R>(&self, f: impl FnOnce(&Directory<'_>) -> R) -> R {
        let keys = self.key_space();
        let directory = Directory {
            store: self.store.as_ref(),
            keys: &keys,
            probe: self.probe.as_ref(),
            dead_threshold: self.config.dead_threshold(),
        };
        f(&directory)
    }

    /// Whether the group's master record currently names this peer.
    pub fn is_master(&self) -> bool {
        self.state == PeerState::Active
            && self.with_directory(|d| d.master()).as_deref() == Some(self.id())
    }

    /// Ids of the other peers in this group.
    ///
    /// With `msg_type`, only peers declaring that type. Dead peers are
    /// left out unless `include_dead`.
    pub fn get_peers(&self, msg_type: Option<&str>, include_dead: bool) -> Vec<String> {
        self.with_directory(|d| d.peers(self.id(), msg_type, include_dead, now_ms()))
    }

    /// Info for every live peer in this group other than this one.
    pub fn get_peer_info(&self) -> Vec<PeerInfo> {
        self.with_directory(|d| d.peer_info(self.id(), now_ms()))
    }

    /// This peer's own published record, if any.
    pub fn info(&self) -> Option<PeerInfo> {
        PeerInfo::load(self.store.as_ref(), &self.key_space(), self.id())
    }

    // ── Messaging ────────────────────────────────────────────────────

    /// Write a message for `target`, or for the group's public channel.
    ///
    /// Success means the message is in the store, not that anyone received
    /// it. Returns the store key the message was written under.
    pub fn send<T: Serialize + ?Sized>(
        &self,
        msg_type: &str,
        data: &T,
        target: Option<&str>,
    ) -> Result<String, PeerError> {
        let core = self.active_core().ok_or_else(|| PeerError::InvalidState {
            operation: "send from",
            state: self.state,
        })?;
        if let Some(target) = target {
            validate_peer_id(target)?;
        }
        let data = serde_json::to_value(data).map_err(|e| PeerError::Serialization(e.to_string()))?;
        core.send(&Envelope::new(msg_type, data), target)
    }

    /// Wait until `peer_id` has published a record (declaring `msg_type`,
    /// if given), or fail once `timeout` elapses.
    ///
    /// Uses the configured default timeout when `timeout` is `None`.
    pub fn wait_for_peer(
        &self,
        peer_id: &str,
        msg_type: Option<&str>,
        timeout: Option<Duration>,
    ) -> PeerWait {
        if let Err(e) = validate_peer_id(peer_id) {
            return PeerWait::settled(Err(e));
        }
        let request = WaitRequest {
            peer_id: peer_id.to_string(),
            msg_type: msg_type.map(str::to_string),
            timeout: timeout.unwrap_or(self.config.default_wait_timeout),
            recheck: self.config.ping_interval,
        };
        PeerWait::spawn(Arc::clone(&self.store), self.key_space(), request)
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(core) = &self.core {
            core.deactivate();
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.identity.id)
            .field("group", &self.identity.group)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xt_store::MemoryStore;

    #[test]
    fn state_display() {
        assert_eq!(PeerState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(PeerState::Active.to_string(), "active");
        assert_eq!(PeerState::CleanedUp.to_string(), "cleaned up");
    }

    #[test]
    fn generated_identity() {
        let identity = PeerIdentity::generated();
        assert_eq!(identity.id.len(), 32);
        assert_eq!(identity.group, DEFAULT_GROUP);
        assert!(identity.title.starts_with("peer-"));
        assert!(identity.details.is_empty());
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let medium = MemoryStore::new();
        let mut peer = Peer::with_config(medium.context(), PeerConfig::default().namespace("xt"));
        peer.set_event_bus(GroupEventBus::new()).unwrap();
        peer.cleanup();
        assert_eq!(peer.state(), PeerState::Uninitialized);

        peer.init().unwrap();
        assert!(!medium.is_empty());
        peer.cleanup();
        peer.cleanup();
        assert_eq!(peer.state(), PeerState::CleanedUp);
        assert!(medium.is_empty());
    }

    #[tokio::test]
    async fn failed_init_leaves_nothing_behind() {
        let medium = MemoryStore::new();
        medium.disable_writes();
        let mut peer = Peer::with_config(medium.context(), PeerConfig::default().namespace("xt"));

        let err = peer.init().unwrap_err();
        assert!(matches!(err, PeerError::Store(xt_store::StoreError::Unavailable(_))));
        assert_eq!(peer.state(), PeerState::Uninitialized);
        assert!(medium.is_empty());
    }

    #[test]
    fn debug_shows_identity_and_state() {
        let medium = MemoryStore::new();
        let mut peer = Peer::new(medium.context());
        peer.set_id("dbg").unwrap();
        let shown = format!("{peer:?}");
        assert!(shown.contains("dbg"));
        assert!(shown.contains("Uninitialized"));
    }
}
