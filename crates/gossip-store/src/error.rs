/// Errors for gossip-store lifecycle operations.
///
/// Ingestion never returns these: it resolves problems locally and reports an
/// [`Outcome`](crate::Outcome). These cover persistence, configuration,
/// serialization and the runtime being gone. Per-peer send failures are
/// reported as [`StoreEvent::SendFailed`](crate::StoreEvent::SendFailed).
#[derive(Debug, thiserror::Error)]
pub enum GossipStoreError {
    #[error("persistence write failed: {reason}")]
    PersistenceWriteFailed { reason: String },

    #[error("persistence load failed: {reason}")]
    PersistenceLoadFailed { reason: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("store runtime shut down")]
    Shutdown,
}

impl From<rmp_serde::encode::Error> for GossipStoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        GossipStoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for GossipStoreError {
    fn from(e: serde_json::Error) -> Self {
        GossipStoreError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_persistence_write_failed() {
        let err = GossipStoreError::PersistenceWriteFailed {
            reason: "disk full".into(),
        };
        assert_eq!(err.to_string(), "persistence write failed: disk full");
    }

    #[test]
    fn test_display_shutdown() {
        assert_eq!(GossipStoreError::Shutdown.to_string(), "store runtime shut down");
    }

    #[test]
    fn test_from_json_error_is_config() {
        let err: GossipStoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, GossipStoreError::Config(_)));
    }
}
