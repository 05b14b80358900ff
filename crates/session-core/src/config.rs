//! Tunables for the per-client coordination actors.

use crate::bus::Backoff;
use std::time::Duration;

/// Interval between ICE restarts on connected links.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(6);

/// Descriptors not refreshed within this window are ignored by discovery.
pub const DEFAULT_DESCRIPTOR_TTL: Duration = Duration::from_secs(30);

/// Interval at which a waiting participant re-reads its own status.
pub const DEFAULT_ADMISSION_RECHECK: Duration = Duration::from_secs(10);

/// Mesh actor command queue size.
pub const DEFAULT_MAILBOX_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub health_interval: Duration,
    pub descriptor_ttl: Duration,
    pub admission_recheck: Duration,
    pub mailbox_size: usize,
    pub backoff: Backoff,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            health_interval: DEFAULT_HEALTH_INTERVAL,
            descriptor_ttl: DEFAULT_DESCRIPTOR_TTL,
            admission_recheck: DEFAULT_ADMISSION_RECHECK,
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            backoff: Backoff::default(),
        }
    }
}

impl MeshConfig {
    /// Staleness window as a chrono duration, for store queries.
    #[must_use]
    pub fn descriptor_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.descriptor_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.health_interval, Duration::from_secs(6));
        assert_eq!(config.descriptor_ttl, Duration::from_secs(30));
        assert_eq!(config.descriptor_ttl_chrono(), chrono::Duration::seconds(30));
        assert_eq!(config.backoff.delay(1), Duration::from_millis(2000));
    }
}
