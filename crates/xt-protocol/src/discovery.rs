/// Discovery and liveness over a snapshot of the store.
///
/// Pure reads: nothing here writes, waits or caches. Every call reflects
/// the store as it is right now.
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use xt_store::SharedStore;

use crate::info::{parse_ping, parse_types, PeerInfo};
use crate::keys::{KeyKind, KeySpace, RecordField};

/// Replacement for the store read of a peer's last liveness timestamp.
///
/// Installed with [`Peer::set_ping_probe`](crate::Peer::set_ping_probe) to
/// inject failures in tests.
pub type PingProbe = Arc<dyn Fn(&str) -> Option<u64> + Send + Sync>;

pub(crate) struct Directory<'a> {
    pub(crate) store: &'a dyn SharedStore,
    pub(crate) keys: &'a KeySpace,
    pub(crate) probe: Option<&'a PingProbe>,
    pub(crate) dead_threshold: Duration,
}

impl Directory<'_> {
    /// Last liveness timestamp of `id` (Unix ms), if any.
    pub(crate) fn last_ping(&self, id: &str) -> Option<u64> {
        match self.probe {
            Some(probe) => (**probe)(id),
            None => self
                .store
                .get(&self.keys.record(id, RecordField::Ping))
                .as_deref()
                .and_then(parse_ping),
        }
    }

    /// A peer is dead once its timestamp is older than the threshold.
    /// A peer with no timestamp at all is dead.
    pub(crate) fn is_dead(&self, id: &str, now: u64) -> bool {
        match self.last_ping(id) {
            Some(last) => now.saturating_sub(last) > self.dead_threshold.as_millis() as u64,
            None => true,
        }
    }

    /// Ids of every peer with at least one published record field.
    pub(crate) fn published_ids(&self) -> BTreeSet<String> {
        self.store
            .keys()
            .iter()
            .filter_map(|key| match self.keys.parse(key) {
                Some(KeyKind::Record { peer_id, .. }) => Some(peer_id.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Other peers of the group, optionally restricted to those declaring
    /// `msg_type`, excluding dead ones unless `include_dead`.
    pub(crate) fn peers(
        &self,
        self_id: &str,
        msg_type: Option<&str>,
        include_dead: bool,
        now: u64,
    ) -> Vec<String> {
        self.published_ids()
            .into_iter()
            .filter(|id| id != self_id)
            .filter(|id| include_dead || !self.is_dead(id, now))
            .filter(|id| match msg_type {
                Some(t) => self.declared_types(id).iter().any(|d| d == t),
                None => true,
            })
            .collect()
    }

    /// Info for every live peer of the group other than `self_id`.
    pub(crate) fn peer_info(&self, self_id: &str, now: u64) -> Vec<PeerInfo> {
        self.peers(self_id, None, false, now)
            .iter()
            .filter_map(|id| PeerInfo::load(self.store, self.keys, id))
            .collect()
    }

    pub(crate) fn master(&self) -> Option<String> {
        self.store.get(&self.keys.master())
    }

    fn declared_types(&self, id: &str) -> Vec<String> {
        self.store
            .get(&self.keys.record(id, RecordField::Types))
            .as_deref()
            .map(parse_types)
            .unwrap_or_default()
    }
}
