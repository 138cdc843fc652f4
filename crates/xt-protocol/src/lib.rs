//! xt protocol layer.
//!
//! Coordination between execution contexts (tabs, windows) that share
//! nothing but an [`xt_store::SharedStore`]: discovery, liveness, a
//! best-effort master election and typed messaging, all carried by writes
//! to the store and the change notifications those writes trigger.
//!
//! Election is convergent, not consensual: two peers may briefly both
//! believe they are master, and every liveness tick and notification
//! re-runs the claim-if-empty-or-stale rule until one id stands.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use xt_protocol::{Envelope, FnHandler, Peer};
//! use xt_store::MemoryStore;
//!
//! # async fn example() -> Result<(), xt_protocol::PeerError> {
//! let medium = MemoryStore::new();
//!
//! let mut alice = Peer::new(medium.context());
//! alice.set_id("alice")?;
//! alice.add_handler(Arc::new(FnHandler::new(["greet"], |env: &Envelope| {
//!     println!("hello from {:?}: {}", env.from, env.data);
//! })))?;
//! alice.init()?;
//!
//! let mut bob = Peer::new(medium.context());
//! bob.set_id("bob")?;
//! bob.init()?;
//!
//! let info = bob.wait_for_peer("alice", Some("greet"), Some(Duration::from_secs(1))).await?;
//! bob.send("greet", "hi", Some(&info.id))?;
//!
//! bob.cleanup();
//! alice.cleanup();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod events;
pub mod handler;
pub mod info;
pub mod keys;
pub mod peer;
pub mod types;
pub mod wait;

pub use config::PeerConfig;
pub use discovery::PingProbe;
pub use envelope::Envelope;
pub use error::PeerError;
pub use events::{GroupEvent, GroupEventBus, GroupEventKind, GroupSubscription};
pub use handler::{FnHandler, HandlerRegistry, MessageHandler};
pub use info::PeerInfo;
pub use keys::{KeyKind, KeySpace, RecordField};
pub use peer::{Peer, PeerState};
pub use types::{now_ms, DEFAULT_GROUP, DEFAULT_NAMESPACE};
pub use wait::PeerWait;
