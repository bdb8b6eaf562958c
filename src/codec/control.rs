//! Outbound control messages

use serde::Serialize;

use crate::auth::ApiCredentials;
use crate::channel::AssetId;

/// Literal keepalive frame
pub const PING: &str = "PING";
/// Literal keepalive reply
pub const PONG: &str = "PONG";

/// Message written by a session to its transport
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Market channel handshake announcing the asset ids to stream
    MarketOpen {
        assets_ids: Vec<AssetId>,
        custom_feature_enabled: bool,
    },
    /// User channel handshake carrying credentials and an optional market filter
    UserOpen {
        markets: Vec<String>,
        auth: ApiCredentials,
    },
    Subscribe { assets_ids: Vec<AssetId> },
    Unsubscribe { assets_ids: Vec<AssetId> },
    Ping,
}

#[derive(Serialize)]
pub(super) struct MarketOpenFrame<'a> {
    pub assets_ids: &'a [AssetId],
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub custom_feature_enabled: bool,
}

#[derive(Serialize)]
pub(super) struct UserOpenFrame<'a> {
    pub markets: &'a [String],
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub auth: &'a ApiCredentials,
}

#[derive(Serialize)]
pub(super) struct OperationFrame<'a> {
    pub assets_ids: &'a [AssetId],
    pub operation: &'static str,
}
