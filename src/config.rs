//! Configuration module for the feed client

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::channel::{AssetId, Channel};
use crate::error::{FeedError, Result};
use crate::websocket::{BackoffConfig, SessionSettings};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base WebSocket endpoint; channel paths are appended as `/ws/{channel}`
    pub ws_endpoint: String,

    /// Channels to open
    pub channels: Vec<Channel>,

    /// Asset ids announced on the market channel
    pub asset_ids: Vec<AssetId>,

    /// Market (condition) ids filtering the user channel; empty means all
    pub markets: Vec<String>,

    /// Value of `custom_feature_enabled` in the market announce
    pub custom_feature_enabled: bool,

    /// Keepalive period in seconds
    pub heartbeat_interval_secs: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub reconnect_jitter: f64,
    /// Zero retries forever
    pub max_reconnect_attempts: u32,

    /// Order book depth levels to report
    pub depth_levels: usize,

    /// Book status log interval in seconds
    pub status_interval_secs: u64,

    /// Port of the health and metrics endpoint
    pub health_port: u16,

    /// IPC socket path for publishing top of book
    pub ipc_socket_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let channels = match env::var("CHANNELS") {
            Ok(raw) => parse_list(&raw)
                .iter()
                .map(|c| c.parse::<Channel>())
                .collect::<Result<Vec<_>>>()?,
            Err(_) => defaults.channels,
        };

        let config = Self {
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            channels,
            asset_ids: env::var("ASSET_IDS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            markets: env::var("MARKETS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
            custom_feature_enabled: env_or("CUSTOM_FEATURE_ENABLED", defaults.custom_feature_enabled),
            heartbeat_interval_secs: env_or("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval_secs),
            reconnect_delay_ms: env_or("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            max_reconnect_delay_ms: env_or("MAX_RECONNECT_DELAY_MS", defaults.max_reconnect_delay_ms),
            reconnect_jitter: env_or("RECONNECT_JITTER", defaults.reconnect_jitter),
            max_reconnect_attempts: env_or("MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts),
            depth_levels: env_or("DEPTH_LEVELS", defaults.depth_levels),
            status_interval_secs: env_or("STATUS_INTERVAL_SECS", defaults.status_interval_secs),
            health_port: env_or("HEALTH_PORT", defaults.health_port),
            ipc_socket_path: env::var("IPC_SOCKET_PATH").ok().filter(|p| !p.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the sessions cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ws_endpoint.trim().is_empty() {
            return Err(FeedError::Config("WS endpoint is empty".to_string()));
        }
        if !(self.ws_endpoint.starts_with("ws://") || self.ws_endpoint.starts_with("wss://")) {
            return Err(FeedError::Config(format!(
                "WS endpoint must use ws:// or wss://: {}",
                self.ws_endpoint
            )));
        }
        if self.channels.is_empty() {
            return Err(FeedError::Config("no channels configured".to_string()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(FeedError::Config("heartbeat interval must be positive".to_string()));
        }
        if self.reconnect_delay_ms == 0 || self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(FeedError::Config(format!(
                "invalid reconnect delays: base {}ms, max {}ms",
                self.reconnect_delay_ms, self.max_reconnect_delay_ms
            )));
        }
        if !(0.0..1.0).contains(&self.reconnect_jitter) {
            return Err(FeedError::Config(format!(
                "reconnect jitter must be in [0, 1): {}",
                self.reconnect_jitter
            )));
        }
        Ok(())
    }

    pub fn channel_url(&self, channel: Channel) -> String {
        channel.endpoint(&self.ws_endpoint)
    }

    /// Initial desired set of a channel
    pub fn initial_subscriptions(&self, channel: Channel) -> Vec<AssetId> {
        match channel {
            Channel::Market => self.asset_ids.clone(),
            Channel::User => self.markets.clone(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            backoff: BackoffConfig {
                base: Duration::from_millis(self.reconnect_delay_ms),
                max: Duration::from_millis(self.max_reconnect_delay_ms),
                jitter: self.reconnect_jitter,
            },
            max_reconnect_attempts: (self.max_reconnect_attempts > 0)
                .then_some(self.max_reconnect_attempts),
            custom_feature_enabled: self.custom_feature_enabled,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://ws-subscriptions-clob.polymarket.com".to_string(),
            channels: vec![Channel::Market],
            asset_ids: Vec::new(),
            markets: Vec::new(),
            custom_feature_enabled: false,
            heartbeat_interval_secs: 10,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 60_000,
            reconnect_jitter: 0.2,
            max_reconnect_attempts: 0,
            depth_levels: 20,
            status_interval_secs: 30,
            health_port: 9090,
            ipc_socket_path: None,
        }
    }
}

/// Split a comma-separated list, dropping blanks
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.channel_url(Channel::Market),
            "wss://ws-subscriptions-clob.polymarket.com/ws/market"
        );
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(" 1, 2,,3 "), vec!["1", "2", "3"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let http = Config {
            ws_endpoint: "https://example.com".to_string(),
            ..Config::default()
        };
        assert!(matches!(http.validate(), Err(FeedError::Config(_))));

        let jitter = Config {
            reconnect_jitter: 1.0,
            ..Config::default()
        };
        assert!(jitter.validate().is_err());

        let delays = Config {
            reconnect_delay_ms: 5_000,
            max_reconnect_delay_ms: 1_000,
            ..Config::default()
        };
        assert!(delays.validate().is_err());

        let no_channels = Config {
            channels: Vec::new(),
            ..Config::default()
        };
        assert!(no_channels.validate().is_err());
    }

    #[test]
    fn test_session_settings() {
        let config = Config {
            max_reconnect_attempts: 3,
            ..Config::default()
        };
        let settings = config.session_settings();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(settings.max_reconnect_attempts, Some(3));
        assert_eq!(settings.backoff.max, Duration::from_secs(60));
        assert_eq!(Config::default().session_settings().max_reconnect_attempts, None);
    }

    #[test]
    fn test_initial_subscriptions() {
        let config = Config {
            asset_ids: vec!["1".into()],
            markets: vec!["0xabc".into()],
            ..Config::default()
        };
        assert_eq!(config.initial_subscriptions(Channel::Market), vec!["1"]);
        assert_eq!(config.initial_subscriptions(Channel::User), vec!["0xabc"]);
    }
}
