//! xt shared store layer.
//!
//! The medium every cross-context peer talks through: a flat string
//! key-value store plus a stream of "key changed" notifications that
//! reach every context except the writer.
//!
//! # Quick start
//!
//! ```rust
//! use xt_store::{MemoryStore, SharedStore};
//!
//! let store = MemoryStore::new();
//! let tab_a = store.context();
//! let tab_b = store.context();
//!
//! tab_a.set("xt.default.a.title", "alice").unwrap();
//! assert_eq!(tab_b.get("xt.default.a.title").as_deref(), Some("alice"));
//! ```

mod error;
mod event;
mod memory;

pub use error::StoreError;
pub use event::{ContextId, Notification, StorageEvent, StoreSubscription};
pub use memory::{ContextStore, MemoryStore};

/// Contract of the shared medium, seen from one context.
///
/// Writes notify other contexts only; a context never hears its own
/// writes. Nothing here is transactional: readers may observe any
/// interleaving of writes from different contexts.
pub trait SharedStore: Send + Sync {
    /// Identity of the context this handle writes as.
    fn context_id(&self) -> ContextId;

    /// Read the current value of `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Removing an absent key is a no-op.
    fn remove(&self, key: &str);

    /// Snapshot of every key currently present.
    fn keys(&self) -> Vec<String>;

    /// Subscribe to changes made by other contexts.
    fn subscribe(&self) -> StoreSubscription;
}
