/// In-process shared store.
///
/// One `MemoryStore` is the medium; each context gets its own
/// [`ContextStore`] handle from [`MemoryStore::context`]. Writes through a
/// handle are visible to every handle immediately and notify every
/// subscriber except the writing context, the same contract a browser's
/// local storage offers to its tabs.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::event::{ContextId, StorageEvent, StoreSubscription};
use crate::{SharedStore, StoreError};

/// Default notification buffer per subscriber.
const DEFAULT_EVENT_BUFFER: usize = 1024;

struct Inner {
    entries: Mutex<BTreeMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    next_context: AtomicU64,
    /// Maximum total bytes of keys plus values, if bounded.
    quota: Option<usize>,
    /// Cleared while the medium refuses writes.
    writable: AtomicBool,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: StorageEvent) {
        // No subscribers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }
}

/// The shared medium. Cheap to clone; clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, unbounded store.
    pub fn new() -> Self {
        Self::build(DEFAULT_EVENT_BUFFER, None)
    }

    /// Create a store that rejects writes once keys plus values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self::build(DEFAULT_EVENT_BUFFER, Some(bytes))
    }

    /// Create a store whose subscribers buffer at most `capacity` notifications.
    pub fn with_event_buffer(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    fn build(capacity: usize, quota: Option<usize>) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(BTreeMap::new()),
                events,
                next_context: AtomicU64::new(1),
                quota,
                writable: AtomicBool::new(true),
            }),
        }
    }

    /// Open a new context on this store.
    pub fn context(&self) -> ContextStore {
        let id = ContextId(self.inner.next_context.fetch_add(1, Ordering::Relaxed));
        ContextStore {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Refuse every write with [`StoreError::Unavailable`] until
    /// [`enable_writes`](Self::enable_writes). Reads and removals still work,
    /// like a storage area switched to read-only by its host.
    pub fn disable_writes(&self) {
        self.inner.writable.store(false, Ordering::SeqCst);
    }

    pub fn enable_writes(&self) {
        self.inner.writable.store(true, Ordering::SeqCst);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries().is_empty()
    }

    /// Copy of every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.inner
            .entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// One context's view of a [`MemoryStore`].
#[derive(Clone)]
pub struct ContextStore {
    id: ContextId,
    inner: Arc<Inner>,
}

impl SharedStore for ContextStore {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn get(&self, key: &str) -> Option<String> {
        self.inner.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if !self.inner.writable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("writes disabled, cannot set {key}")));
        }
        let old_value = {
            let mut entries = self.inner.entries();

            if let Some(quota) = self.inner.quota {
                let used: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
                let freed = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
                let size = key.len() + value.len();
                if used - freed + size > quota {
                    tracing::debug!(context = %self.id, key, size, quota, "write rejected by quota");
                    return Err(StoreError::QuotaExceeded {
                        key: key.to_string(),
                        size,
                        quota,
                    });
                }
            }

            entries.insert(key.to_string(), value.to_string())
        };

        if old_value.as_deref() != Some(value) {
            self.inner.notify(StorageEvent {
                origin: self.id,
                key: key.to_string(),
                old_value,
                new_value: Some(value.to_string()),
            });
        }
        Ok(())
    }

    fn remove(&self, key: &str) {
        let old_value = self.inner.entries().remove(key);
        if old_value.is_some() {
            self.inner.notify(StorageEvent {
                origin: self.id,
                key: key.to_string(),
                old_value,
                new_value: None,
            });
        }
    }

    fn keys(&self) -> Vec<String> {
        self.inner.entries().keys().cloned().collect()
    }

    fn subscribe(&self) -> StoreSubscription {
        StoreSubscription::new(self.id, self.inner.events.subscribe())
    }
}
