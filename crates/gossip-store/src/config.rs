use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;
use crate::error::GossipStoreError;

/// Configuration for the store runtime.
///
/// Durations are written in humantime form in JSON (`"250ms"`, `"60s"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Interval between expiry sweeps.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Entries removed per lock acquisition during a sweep.
    pub sweep_batch_size: usize,
    /// Quiet period before a dirty store is written.
    #[serde(with = "humantime_serde")]
    pub persist_debounce: Duration,
    /// Upper bound on how long continuous mutations can postpone a write.
    #[serde(with = "humantime_serde")]
    pub persist_max_delay: Duration,
    /// Best-effort timeout for one backend write.
    #[serde(with = "humantime_serde")]
    pub persist_timeout: Duration,
    /// Capacity bound. The oldest entry is evicted when full.
    pub max_entries: usize,
    /// Pending broadcast jobs before new ones are dropped.
    pub fanout_queue: usize,
    /// Concurrent sends per broadcast.
    pub fanout_concurrency: usize,
    /// Lazy-consumer broadcast buffer. Slow consumers lag past it.
    pub lazy_queue: usize,
    /// Store event channel capacity.
    pub event_queue: usize,
    /// Capabilities this node supports for inbound payloads.
    pub local_capabilities: CapabilitySet,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 256,
            persist_debounce: Duration::from_millis(250),
            persist_max_delay: Duration::from_secs(5),
            persist_timeout: Duration::from_secs(10),
            max_entries: 100_000,
            fanout_queue: 4096,
            fanout_concurrency: 16,
            lazy_queue: 1024,
            event_queue: 4096,
            local_capabilities: CapabilitySet::all_known(),
        }
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self, GossipStoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GossipStoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| GossipStoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), GossipStoreError> {
        let durations = [
            ("sweep_interval", self.sweep_interval),
            ("persist_debounce", self.persist_debounce),
            ("persist_max_delay", self.persist_max_delay),
            ("persist_timeout", self.persist_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(GossipStoreError::Config(format!("{name} cannot be 0")));
            }
        }

        let sizes = [
            ("sweep_batch_size", self.sweep_batch_size),
            ("max_entries", self.max_entries),
            ("fanout_queue", self.fanout_queue),
            ("fanout_concurrency", self.fanout_concurrency),
            ("lazy_queue", self.lazy_queue),
            ("event_queue", self.event_queue),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(GossipStoreError::Config(format!("{name} cannot be 0")));
            }
        }

        if self.persist_max_delay < self.persist_debounce {
            return Err(GossipStoreError::Config(
                "persist_max_delay must be >= persist_debounce".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityId, TRADE_STATISTICS};

    #[test]
    fn default_is_valid() {
        StoreConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = StoreConfig::from_json(r#"{"sweep_interval": "5s", "max_entries": 10}"#).unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.max_entries, 10);
        assert_eq!(config.persist_debounce, Duration::from_millis(250));
    }

    #[test]
    fn capabilities_from_json() {
        let config = StoreConfig::from_json(r#"{"local_capabilities": [0, 77]}"#).unwrap();
        assert!(config.local_capabilities.contains(TRADE_STATISTICS));
        assert!(config.local_capabilities.contains(CapabilityId(77)));
        assert_eq!(config.local_capabilities.len(), 2);
    }

    #[test]
    fn zero_values_rejected() {
        let err = StoreConfig::from_json(r#"{"sweep_batch_size": 0}"#).unwrap_err();
        assert!(err.to_string().contains("sweep_batch_size"));
        let err = StoreConfig::from_json(r#"{"persist_debounce": "0s"}"#).unwrap_err();
        assert!(err.to_string().contains("persist_debounce"));
    }

    #[test]
    fn max_delay_below_debounce_rejected() {
        let config = StoreConfig {
            persist_debounce: Duration::from_secs(2),
            persist_max_delay: Duration::from_secs(1),
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            StoreConfig::from_json("{"),
            Err(GossipStoreError::Config(_))
        ));
    }

    #[test]
    fn roundtrips_through_json() {
        let config = StoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"250ms\""));
        assert_eq!(StoreConfig::from_json(&json).unwrap(), config);
    }
}
