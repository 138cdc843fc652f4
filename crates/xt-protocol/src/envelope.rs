use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PeerError;
use crate::types::now_ms;

/// A typed message placed in the shared store for pickup by another peer.
///
/// Stored as JSON: `{"type": "...", "data": ..., "timestamp": 1700000000000}`.
/// Older writers used `time` for the timestamp and may omit it entirely;
/// both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type, matched against handler capabilities.
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Application payload (arbitrary JSON).
    #[serde(default)]
    pub data: serde_json::Value,

    /// Unix timestamp in milliseconds.
    #[serde(default, alias = "time")]
    pub timestamp: u64,

    /// Sending peer, taken from the store key on delivery.
    #[serde(skip)]
    pub from: Option<String>,
}

impl Envelope {
    /// Create a new envelope stamped with the current time.
    pub fn new(msg_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data,
            timestamp: now_ms(),
            from: None,
        }
    }

    pub fn to_json(&self) -> Result<String, PeerError> {
        serde_json::to_string(self).map_err(|e| PeerError::Serialization(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, PeerError> {
        serde_json::from_str(raw).map_err(|e| PeerError::InvalidEnvelope {
            reason: e.to_string(),
        })
    }

    /// Decode the payload into a concrete type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, PeerError> {
        serde_json::from_value(self.data.clone()).map_err(|e| PeerError::InvalidEnvelope {
            reason: e.to_string(),
        })
    }
}
