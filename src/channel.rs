//! Feed channels

use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Instrument identifier (CLOB token id)
pub type AssetId = String;

/// Logical subscription stream, each multiplexed over its own connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Public order book stream keyed by asset id
    Market,
    /// Authenticated stream of the account's trades and orders
    User,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Market => "market",
            Channel::User => "user",
        }
    }

    /// Endpoint for this channel under the venue's base WebSocket URL
    pub fn endpoint(&self, base: &str) -> String {
        format!("{}/ws/{}", base.trim_end_matches('/'), self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(Channel::Market),
            "user" => Ok(Channel::User),
            other => Err(FeedError::Config(format!("unknown channel: {other}"))),
        }
    }
}
