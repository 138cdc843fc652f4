/// PeerInfo — read-only projection of another peer's published record.
///
/// Built fresh from the store on every query and never cached, so it
/// always reflects what the store holds at read time.
use serde::Serialize;
use xt_store::SharedStore;

use crate::keys::{KeySpace, RecordField};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub id: String,
    pub group: String,
    pub title: String,
    pub details: String,
    /// Message types the peer has handlers for.
    pub types: Vec<String>,
    /// Last liveness timestamp (Unix ms), if one is published.
    pub last_ping: Option<u64>,
    /// Whether the group's master record names this peer.
    pub is_master: bool,
}

impl PeerInfo {
    /// Load the record of `id`, or `None` if nothing is published for it.
    pub fn load(store: &dyn SharedStore, keys: &KeySpace, id: &str) -> Option<Self> {
        let [title, details, types, ping] =
            RecordField::ALL.map(|field| store.get(&keys.record(id, field)));

        if title.is_none() && details.is_none() && types.is_none() && ping.is_none() {
            return None;
        }

        Some(Self {
            id: id.to_string(),
            group: keys.group().to_string(),
            title: title.unwrap_or_default(),
            details: details.unwrap_or_default(),
            types: types.as_deref().map(parse_types).unwrap_or_default(),
            last_ping: ping.as_deref().and_then(parse_ping),
            is_master: store.get(&keys.master()).as_deref() == Some(id),
        })
    }

    /// Whether the peer declared a handler for `msg_type`.
    pub fn supports(&self, msg_type: &str) -> bool {
        self.types.iter().any(|t| t == msg_type)
    }
}

/// Decode a published type list. Malformed lists count as empty.
pub(crate) fn parse_types(raw: &str) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(types) => types,
        Err(e) => {
            tracing::debug!(raw, error = %e, "ignoring malformed type list");
            Vec::new()
        }
    }
}

pub(crate) fn parse_ping(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}
