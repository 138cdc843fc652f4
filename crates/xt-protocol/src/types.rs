use std::time::{SystemTime, UNIX_EPOCH};

/// Group used when none is set.
pub const DEFAULT_GROUP: &str = "default";

/// Key namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "xt";

/// Current Unix time in milliseconds.
///
/// Liveness timestamps are compared across contexts, so this is wall-clock
/// time rather than a monotonic instant.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
