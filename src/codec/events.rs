//! Inbound market and user channel events

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::channel::AssetId;
use crate::error::{FeedError, Result};
use crate::orderbook::Side;

/// Price level as carried on the wire (price, size pair)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub size: Decimal,
}

/// Full order book snapshot (`book`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub asset_id: AssetId,
    #[serde(default)]
    pub market: String,
    #[serde(alias = "buys")]
    pub bids: Vec<PriceLevel>,
    #[serde(alias = "sells")]
    pub asks: Vec<PriceLevel>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Single price level delta inside a `price_change` event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub asset_id: AssetId,
    pub side: Side,
    pub price: Decimal,
    /// New aggregate size at the level; zero removes it
    pub size: Decimal,
    pub hash: Option<String>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
}

/// Batch of level deltas (`price_change`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChangeEvent {
    pub market: String,
    pub timestamp: Option<u64>,
    pub changes: Vec<PriceChange>,
}

/// Public trade print (`last_trade_price`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub asset_id: AssetId,
    #[serde(default)]
    pub market: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub size: Decimal,
    pub side: Side,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub fee_rate_bps: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<u64>,
}

/// Minimum tick size change (`tick_size_change`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSizeChange {
    pub asset_id: AssetId,
    #[serde(default)]
    pub market: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub old_tick_size: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub new_tick_size: Decimal,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<u64>,
}

/// Fill involving the authenticated account (`trade`, user channel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTrade {
    pub id: String,
    pub asset_id: AssetId,
    #[serde(default)]
    pub market: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub size: Decimal,
    pub side: Side,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<u64>,
}

/// Order lifecycle update for the authenticated account (`order`, user channel)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOrder {
    pub id: String,
    pub asset_id: AssetId,
    #[serde(default)]
    pub market: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,
    pub side: Side,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub original_size: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    pub size_matched: Option<Decimal>,
    /// PLACEMENT, UPDATE or CANCELLATION
    #[serde(default, rename = "type")]
    pub update_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<u64>,
}

/// Event with a missing or unrecognised `event_type`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownEvent {
    pub event_type: Option<String>,
    pub payload: serde_json::Value,
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MarketEvent {
    Book(BookSnapshot),
    PriceChange(PriceChangeEvent),
    LastTradePrice(TradeTick),
    TickSizeChange(TickSizeChange),
    Trade(UserTrade),
    Order(UserOrder),
    Unknown(UnknownEvent),
}

impl MarketEvent {
    /// Wire tag of the event, `unknown` for unrecognised shapes
    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::Book(_) => "book",
            MarketEvent::PriceChange(_) => "price_change",
            MarketEvent::LastTradePrice(_) => "last_trade_price",
            MarketEvent::TickSizeChange(_) => "tick_size_change",
            MarketEvent::Trade(_) => "trade",
            MarketEvent::Order(_) => "order",
            MarketEvent::Unknown(_) => "unknown",
        }
    }

    /// Whether applying the event can change price levels
    pub fn affects_book(&self) -> bool {
        matches!(self, MarketEvent::Book(_) | MarketEvent::PriceChange(_))
    }

    /// Decode a single JSON value
    pub(crate) fn from_value(value: serde_json::Value) -> Result<Self> {
        let event_type = value
            .get("event_type")
            .and_then(|v| v.as_str())
            .map(str::to_owned);

        let event = match event_type.as_deref() {
            Some("book") => MarketEvent::Book(serde_json::from_value(value)?),
            Some("price_change") => {
                let raw: RawPriceChangeEvent = serde_json::from_value(value)?;
                MarketEvent::PriceChange(raw.normalize()?)
            }
            Some("last_trade_price") => MarketEvent::LastTradePrice(serde_json::from_value(value)?),
            Some("tick_size_change") => MarketEvent::TickSizeChange(serde_json::from_value(value)?),
            Some("trade") => MarketEvent::Trade(serde_json::from_value(value)?),
            Some("order") => MarketEvent::Order(serde_json::from_value(value)?),
            _ => MarketEvent::Unknown(UnknownEvent {
                event_type,
                payload: value,
            }),
        };

        Ok(event)
    }
}

/// `price_change` in either the per-asset (`changes`) or the batched
/// (`price_changes`, asset id per entry) layout
#[derive(Debug, Deserialize)]
struct RawPriceChangeEvent {
    #[serde(default)]
    asset_id: Option<AssetId>,
    #[serde(default)]
    market: String,
    #[serde(default)]
    changes: Vec<RawLevelChange>,
    #[serde(default)]
    price_changes: Vec<RawLevelChange>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: Option<u64>,
    #[serde(default)]
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLevelChange {
    #[serde(default)]
    asset_id: Option<AssetId>,
    #[serde(deserialize_with = "deserialize_decimal")]
    price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    size: Decimal,
    side: Side,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    best_bid: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    best_ask: Option<Decimal>,
}

impl RawPriceChangeEvent {
    fn normalize(self) -> Result<PriceChangeEvent> {
        let RawPriceChangeEvent {
            asset_id,
            market,
            changes,
            price_changes,
            timestamp,
            hash,
        } = self;

        let changes = changes
            .into_iter()
            .chain(price_changes)
            .map(|change| {
                let asset_id = change.asset_id.or_else(|| asset_id.clone()).ok_or_else(|| {
                    FeedError::Decode("price_change entry without asset_id".to_string())
                })?;
                Ok(PriceChange {
                    asset_id,
                    side: change.side,
                    price: change.price,
                    size: change.size,
                    hash: change.hash.or_else(|| hash.clone()),
                    best_bid: change.best_bid,
                    best_ask: change.best_ask,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PriceChangeEvent {
            market,
            timestamp,
            changes,
        })
    }
}

/// Decimal from either a JSON string or number
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    decimal_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal: {value}")))
}

/// Optional decimal; null, missing or empty string map to `None`
fn deserialize_opt_decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(v) => decimal_from_value(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid decimal: {v}"))),
    }
}

fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => parse_decimal(s),
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

/// Accepts bare fractions such as `.48`
fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let text = match trimmed.strip_prefix('.') {
        Some(fraction) => format!("0.{fraction}"),
        None => trimmed.to_string(),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Millisecond timestamp from a JSON string or number
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {n}"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid timestamp: {other}"
        ))),
    }
}
