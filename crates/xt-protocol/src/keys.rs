/// Store key layout for one group.
///
/// Every key a group uses lives under `<namespace>.<group>.`:
///
/// | key                                   | meaning                  |
/// |---------------------------------------|--------------------------|
/// | `master`                              | id of the current master |
/// | `<id>.title` / `.details` / `.types` / `.ping` | peer record     |
/// | `public.<sender>.<uniq>`              | public channel message   |
/// | `<target>.<sender>.<uniq>`            | addressed message        |
///
/// Segments are separated by `.`, so ids and group names may not contain one.
use crate::error::PeerError;

/// Segment holding the master record.
pub const MASTER_SEGMENT: &str = "master";

/// Segment prefixing public channel messages.
pub const PUBLIC_SEGMENT: &str = "public";

/// One field of a published peer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Title,
    Details,
    /// JSON array of supported message types.
    Types,
    /// Last liveness timestamp (Unix ms).
    Ping,
}

impl RecordField {
    pub const ALL: [RecordField; 4] = [
        RecordField::Title,
        RecordField::Details,
        RecordField::Types,
        RecordField::Ping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Details => "details",
            Self::Types => "types",
            Self::Ping => "ping",
        }
    }

    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == segment)
    }
}

/// What a key in this group's namespace refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind<'a> {
    Master,
    Record { peer_id: &'a str, field: RecordField },
    Public { sender: &'a str },
    Addressed { target: &'a str, sender: &'a str },
}

impl KeyKind<'_> {
    /// Whether this key carries a message envelope.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Public { .. } | Self::Addressed { .. })
    }
}

/// Key builder and parser for one `<namespace>.<group>` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    group: String,
    prefix: String,
}

impl KeySpace {
    pub fn new(namespace: &str, group: &str) -> Self {
        Self {
            group: group.to_string(),
            prefix: format!("{namespace}.{group}."),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// `<namespace>.<group>.`, shared by every key of the group.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn master(&self) -> String {
        format!("{}{MASTER_SEGMENT}", self.prefix)
    }

    pub fn record(&self, peer_id: &str, field: RecordField) -> String {
        format!("{}{peer_id}.{}", self.prefix, field.as_str())
    }

    pub fn public_message(&self, sender: &str, uniquifier: &str) -> String {
        format!("{}{PUBLIC_SEGMENT}.{sender}.{uniquifier}", self.prefix)
    }

    pub fn addressed_message(&self, target: &str, sender: &str, uniquifier: &str) -> String {
        format!("{}{target}.{sender}.{uniquifier}", self.prefix)
    }

    /// Classify `key`. Returns `None` for keys outside this group or
    /// with a shape this protocol does not use.
    pub fn parse<'a>(&self, key: &'a str) -> Option<KeyKind<'a>> {
        let rest = key.strip_prefix(self.prefix.as_str())?;
        let segments: Vec<&'a str> = rest.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        match *segments.as_slice() {
            [MASTER_SEGMENT] => Some(KeyKind::Master),
            [PUBLIC_SEGMENT, sender, ..] => Some(KeyKind::Public { sender }),
            [first, second] => Some(match RecordField::parse(second) {
                Some(field) => KeyKind::Record {
                    peer_id: first,
                    field,
                },
                None => KeyKind::Addressed {
                    target: first,
                    sender: second,
                },
            }),
            [target, sender, ..] => Some(KeyKind::Addressed { target, sender }),
            _ => None,
        }
    }
}

/// Check that `value` can be used as a key segment.
pub fn validate_segment(what: &str, value: &str) -> Result<(), PeerError> {
    if value.is_empty() {
        return Err(PeerError::InvalidIdentity {
            reason: format!("{what} must not be empty"),
        });
    }
    if value.contains('.') {
        return Err(PeerError::InvalidIdentity {
            reason: format!("{what} {value:?} must not contain '.'"),
        });
    }
    Ok(())
}

/// Check that `id` is usable as a peer id.
pub fn validate_peer_id(id: &str) -> Result<(), PeerError> {
    validate_segment("peer id", id)?;
    if id == MASTER_SEGMENT || id == PUBLIC_SEGMENT {
        return Err(PeerError::InvalidIdentity {
            reason: format!("peer id {id:?} is reserved"),
        });
    }
    Ok(())
}
