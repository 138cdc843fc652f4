use std::fmt;

use tokio::sync::broadcast::{self, error::RecvError};

/// Identity of one execution context (one tab, one window) sharing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A single key change, tagged with the context that made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Context that performed the write.
    pub origin: ContextId,
    pub key: String,
    pub old_value: Option<String>,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

/// What a subscriber observes on its next wake-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Another context changed a key.
    Changed(StorageEvent),
    /// The subscriber fell behind and `n` notifications were dropped.
    ///
    /// Consumers must re-read the store rather than rely on the missed events.
    Lagged(u64),
}

/// Stream of changes made by contexts other than the subscriber.
pub struct StoreSubscription {
    local: ContextId,
    rx: broadcast::Receiver<StorageEvent>,
}

impl StoreSubscription {
    /// Wrap a raw broadcast receiver, filtering out `local`'s own writes.
    ///
    /// Store adapters other than [`MemoryStore`](crate::MemoryStore) build
    /// their subscriptions through this.
    pub fn new(local: ContextId, rx: broadcast::Receiver<StorageEvent>) -> Self {
        Self { local, rx }
    }

    /// Wait for the next foreign change.
    ///
    /// Returns `None` once the store has shut down.
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.local => continue,
                Ok(event) => return Some(Notification::Changed(event)),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(context = %self.local, lagged = n, "store subscription lagged");
                    return Some(Notification::Lagged(n));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
