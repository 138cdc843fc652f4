use std::time::Duration;

use xt_store::StoreError;

use crate::peer::PeerState;

/// Protocol-level errors for xt peers.
///
/// Usage errors (identity changes after `init`, double `init`) are
/// reported here rather than ignored; they indicate a bug in the caller.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("invalid identity: {reason}")]
    InvalidIdentity { reason: String },

    #[error("identity is locked once the peer has left the uninitialized state")]
    IdentityLocked,

    #[error("cannot {operation} a peer that is {state}")]
    InvalidState {
        operation: &'static str,
        state: PeerState,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("timed out after {timeout:?} waiting for peer {peer_id}")]
    WaitTimeout { peer_id: String, timeout: Duration },

    #[error("wait for peer was dropped before it settled")]
    WaitAbandoned,

    #[error("no tokio runtime available")]
    NoRuntime,
}
