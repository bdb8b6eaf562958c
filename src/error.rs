//! Error types for the feed client

use thiserror::Error;

/// Feed client errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Out-of-order update for {asset_id}: {reason}")]
    OutOfOrderUpdate { asset_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session task error: {0}")]
    Task(String),

    #[error("Max reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

impl FeedError {
    /// Whether the error terminates the owning session instead of triggering a reconnect
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::Protocol(_)
                | FeedError::Auth(_)
                | FeedError::Config(_)
                | FeedError::Serialization(_)
                | FeedError::Task(_)
                | FeedError::MaxReconnectAttemptsExceeded
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl From<prometheus::Error> for FeedError {
    fn from(err: prometheus::Error) -> Self {
        FeedError::Metrics(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Ipc(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FeedError::Protocol("no auth".into()).is_fatal());
        assert!(FeedError::Auth("denied".into()).is_fatal());
        assert!(FeedError::MaxReconnectAttemptsExceeded.is_fatal());
        assert!(!FeedError::Transport("reset".into()).is_fatal());
        assert!(!FeedError::Decode("bad".into()).is_fatal());
        assert!(!FeedError::OutOfOrderUpdate {
            asset_id: "1".into(),
            reason: "stale".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_json_error_maps_to_decode() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(FeedError::from(err), FeedError::Decode(_)));
    }
}
