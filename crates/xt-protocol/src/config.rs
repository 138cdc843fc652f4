use std::time::Duration;

use crate::types::DEFAULT_NAMESPACE;

/// Configuration for a [`Peer`](crate::Peer).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use xt_protocol::PeerConfig;
///
/// let config = PeerConfig::new()
///     .ping_interval(Duration::from_millis(500))
///     .dead_multiplier(4);
/// assert_eq!(config.dead_threshold(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// First key segment shared by every group.
    pub(crate) namespace: String,
    /// How often a peer rewrites its liveness timestamp.
    pub(crate) ping_interval: Duration,
    /// Dead threshold as a multiple of `ping_interval`.
    pub(crate) dead_multiplier: u32,
    /// Timeout for `wait_for_peer` calls that do not pass one.
    pub(crate) default_wait_timeout: Duration,
    /// How many consumed message keys are remembered for dedup.
    pub(crate) consumed_cache: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerConfig {
    /// Create a new config with defaults.
    ///
    /// `XT_NAMESPACE` and `XT_PING_INTERVAL_MS`, when set, override the
    /// namespace and ping interval. Builder calls override both.
    pub fn new() -> Self {
        let namespace = std::env::var("XT_NAMESPACE")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let ping_interval = std::env::var("XT_PING_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(1));

        Self {
            namespace,
            ping_interval,
            dead_multiplier: 3,
            default_wait_timeout: Duration::from_secs(30),
            consumed_cache: 256,
        }
    }

    /// Set the key namespace (default: `xt`).
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the liveness interval (default: 1s).
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the dead threshold multiplier (default: 3).
    pub fn dead_multiplier(mut self, multiplier: u32) -> Self {
        self.dead_multiplier = multiplier.max(1);
        self
    }

    /// Set the default `wait_for_peer` timeout (default: 30s).
    pub fn default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = timeout;
        self
    }

    /// Set how many consumed message keys are remembered (default: 256).
    pub fn consumed_cache(mut self, entries: usize) -> Self {
        self.consumed_cache = entries;
        self
    }

    pub fn namespace_str(&self) -> &str {
        &self.namespace
    }

    pub fn interval(&self) -> Duration {
        self.ping_interval
    }

    /// Age after which a liveness timestamp marks its peer as dead.
    pub fn dead_threshold(&self) -> Duration {
        self.ping_interval * self.dead_multiplier
    }

    pub fn wait_timeout(&self) -> Duration {
        self.default_wait_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let config = PeerConfig::new()
            .namespace("test")
            .ping_interval(Duration::from_millis(100))
            .dead_multiplier(0)
            .default_wait_timeout(Duration::from_millis(250))
            .consumed_cache(8);

        assert_eq!(config.namespace_str(), "test");
        assert_eq!(config.interval(), Duration::from_millis(100));
        // Multiplier is clamped to at least one interval.
        assert_eq!(config.dead_threshold(), Duration::from_millis(100));
        assert_eq!(config.wait_timeout(), Duration::from_millis(250));
        assert_eq!(config.consumed_cache, 8);
    }

    #[test]
    fn default_dead_threshold_is_three_pings() {
        let config = PeerConfig::new().ping_interval(Duration::from_millis(500));
        assert_eq!(config.dead_threshold(), Duration::from_millis(1500));
    }
}
