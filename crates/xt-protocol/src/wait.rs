/// Wait-for-peer — a deferred rendezvous with a peer that may not exist yet.
///
/// Each wait runs in its own task with its own store subscription and
/// deadline, so it settles on its own schedule regardless of what happens
/// to the peer that started it.
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use xt_store::{SharedStore, StoreSubscription};

use crate::error::PeerError;
use crate::info::PeerInfo;
use crate::keys::KeySpace;

/// What a wait is waiting for.
#[derive(Debug, Clone)]
pub(crate) struct WaitRequest {
    pub(crate) peer_id: String,
    pub(crate) msg_type: Option<String>,
    pub(crate) timeout: Duration,
    /// Re-check cadence when no notification arrives.
    pub(crate) recheck: Duration,
}

impl WaitRequest {
    /// The target's info, if it is published and declares the required type.
    fn satisfied_by(&self, store: &dyn SharedStore, keys: &KeySpace) -> Option<PeerInfo> {
        let info = PeerInfo::load(store, keys, &self.peer_id)?;
        match &self.msg_type {
            Some(t) if !info.supports(t) => None,
            _ => Some(info),
        }
    }
}

/// Future settling with the target's [`PeerInfo`], or
/// [`PeerError::WaitTimeout`] once the deadline passes.
#[must_use = "a PeerWait does nothing useful unless awaited"]
pub struct PeerWait {
    rx: oneshot::Receiver<Result<PeerInfo, PeerError>>,
}

impl PeerWait {
    pub(crate) fn spawn(store: Arc<dyn SharedStore>, keys: KeySpace, request: WaitRequest) -> Self {
        let (tx, rx) = oneshot::channel();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            let _ = tx.send(Err(PeerError::NoRuntime));
            return Self { rx };
        };

        // Subscribe before the first check so a write landing in between
        // still wakes the wait.
        let subscription = store.subscribe();
        runtime.spawn(wait_loop(store, keys, request, subscription, tx));
        Self { rx }
    }

    pub(crate) fn settled(result: Result<PeerInfo, PeerError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl Future for PeerWait {
    type Output = Result<PeerInfo, PeerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(PeerError::WaitAbandoned)))
    }
}

async fn wait_loop(
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    request: WaitRequest,
    mut subscription: StoreSubscription,
    mut tx: oneshot::Sender<Result<PeerInfo, PeerError>>,
) {
    let deadline = Instant::now() + request.timeout;
    let mut subscribed = true;
    // Notifications may be lost; poll as well so a ready target is still seen.
    let mut recheck = tokio::time::interval(request.recheck.max(Duration::from_millis(1)));
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);
    recheck.tick().await;

    let outcome = loop {
        if let Some(info) = request.satisfied_by(store.as_ref(), &keys) {
            break Ok(info);
        }

        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(peer_id = %request.peer_id, "wait dropped before settling");
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {
                break Err(PeerError::WaitTimeout {
                    peer_id: request.peer_id.clone(),
                    timeout: request.timeout,
                });
            }
            _ = recheck.tick() => {}
            note = subscription.next(), if subscribed => {
                // Any change (or lag) may have made the target ready; recheck.
                if note.is_none() {
                    subscribed = false;
                }
            }
        }
    };

    match &outcome {
        Ok(_) => tracing::debug!(peer_id = %request.peer_id, "waited-for peer is ready"),
        Err(e) => tracing::debug!(peer_id = %request.peer_id, error = %e, "wait for peer failed"),
    }
    let _ = tx.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use xt_store::MemoryStore;

    fn request(id: &str, msg_type: Option<&str>, ms: u64) -> WaitRequest {
        WaitRequest {
            peer_id: id.into(),
            msg_type: msg_type.map(Into::into),
            timeout: Duration::from_millis(ms),
            recheck: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn already_present_settles_immediately() {
        let medium = MemoryStore::new();
        let waiter: Arc<dyn SharedStore> = Arc::new(medium.context());
        medium.context().set("xt.default.b.title", "bob").unwrap();

        let info = PeerWait::spawn(waiter, KeySpace::new("xt", "default"), request("b", None, 50))
            .await
            .unwrap();
        assert_eq!(info.title, "bob");
    }

    #[tokio::test]
    async fn appears_later() {
        let medium = MemoryStore::new();
        let waiter: Arc<dyn SharedStore> = Arc::new(medium.context());
        let other = medium.context();

        let wait = PeerWait::spawn(waiter, KeySpace::new("xt", "default"), request("b", Some("hello"), 1_000));
        other.set("xt.default.b.title", "bob").unwrap();
        other.set("xt.default.b.types", r#"["hello"]"#).unwrap();

        let info = wait.await.unwrap();
        assert!(info.supports("hello"));
    }

    /// A store whose notifications never arrive.
    struct Deaf {
        inner: xt_store::ContextStore,
        quiet: tokio::sync::broadcast::Sender<xt_store::StorageEvent>,
    }

    impl SharedStore for Deaf {
        fn context_id(&self) -> xt_store::ContextId {
            self.inner.context_id()
        }
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), xt_store::StoreError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) {
            self.inner.remove(key)
        }
        fn keys(&self) -> Vec<String> {
            self.inner.keys()
        }
        fn subscribe(&self) -> StoreSubscription {
            StoreSubscription::new(self.inner.context_id(), self.quiet.subscribe())
        }
    }

    #[tokio::test]
    async fn appears_without_notification() {
        let medium = MemoryStore::new();
        let (quiet, _) = tokio::sync::broadcast::channel(1);
        let waiter: Arc<dyn SharedStore> = Arc::new(Deaf {
            inner: medium.context(),
            quiet,
        });

        let wait = PeerWait::spawn(waiter, KeySpace::new("xt", "default"), request("b", None, 1_000));
        tokio::time::sleep(Duration::from_millis(30)).await;
        medium.context().set("xt.default.b.title", "bob").unwrap();

        assert_eq!(wait.await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn times_out() {
        let medium = MemoryStore::new();
        let waiter: Arc<dyn SharedStore> = Arc::new(medium.context());

        let err = PeerWait::spawn(waiter, KeySpace::new("xt", "default"), request("b", None, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::WaitTimeout { ref peer_id, .. } if peer_id == "b"));
    }

    #[tokio::test]
    async fn settled_wait() {
        let err = PeerWait::settled(Err(PeerError::NoRuntime)).await.unwrap_err();
        assert!(matches!(err, PeerError::NoRuntime));
    }

    #[test]
    fn no_runtime_fails_instead_of_panicking() {
        let medium = MemoryStore::new();
        let waiter: Arc<dyn SharedStore> = Arc::new(medium.context());
        let wait = PeerWait::spawn(waiter, KeySpace::new("xt", "default"), request("b", None, 20));

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert!(matches!(rt.block_on(wait), Err(PeerError::NoRuntime)));
    }
}
