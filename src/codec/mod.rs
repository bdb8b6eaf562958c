//! Frame codec
//!
//! Turns inbound text frames into market events and outbound control
//! messages into the exact JSON shapes the venue expects.

mod control;
mod events;

pub use control::{ControlMessage, PING, PONG};
pub use events::{
    BookSnapshot, MarketEvent, PriceChange, PriceChangeEvent, PriceLevel, TickSizeChange,
    TradeTick, UnknownEvent, UserOrder, UserTrade,
};

use control::{MarketOpenFrame, OperationFrame, UserOpenFrame};

use crate::error::{FeedError, Result};

/// Decode a raw frame into events, preserving arrival order.
///
/// The venue sends either a single JSON object or an array of objects.
/// Unknown event types are passed through as [`MarketEvent::Unknown`].
pub fn decode(raw: &str) -> Result<Vec<MarketEvent>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    match value {
        serde_json::Value::Array(items) => items.into_iter().map(MarketEvent::from_value).collect(),
        other => Ok(vec![MarketEvent::from_value(other)?]),
    }
}

/// Encode a control message into its wire text
pub fn encode(message: &ControlMessage) -> Result<String> {
    let encoded = match message {
        ControlMessage::MarketOpen {
            assets_ids,
            custom_feature_enabled,
        } => serde_json::to_string(&MarketOpenFrame {
            assets_ids,
            msg_type: "MARKET",
            custom_feature_enabled: *custom_feature_enabled,
        }),
        ControlMessage::UserOpen { markets, auth } => serde_json::to_string(&UserOpenFrame {
            markets,
            msg_type: "user",
            auth,
        }),
        ControlMessage::Subscribe { assets_ids } => serde_json::to_string(&OperationFrame {
            assets_ids,
            operation: "subscribe",
        }),
        ControlMessage::Unsubscribe { assets_ids } => serde_json::to_string(&OperationFrame {
            assets_ids,
            operation: "unsubscribe",
        }),
        ControlMessage::Ping => return Ok(PING.to_string()),
    };

    encoded.map_err(|e| FeedError::Serialization(e.to_string()))
}
