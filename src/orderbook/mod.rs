//! Order book module
//!
//! Reconstructs per-asset order books from snapshot and delta events.

mod book;
mod metrics;
mod store;

pub use book::OrderBook;
pub use metrics::OrderBookMetrics;
pub use store::{OrderBookStore, StoreStats};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::channel::AssetId;

/// Side of the order book (`BUY` rests on the bid, `SELL` on the ask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY", alias = "buy", alias = "Buy", alias = "bid", alias = "BID")]
    Bid,
    #[serde(rename = "SELL", alias = "sell", alias = "Sell", alias = "ask", alias = "ASK")]
    Ask,
}

/// A single level in the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
}

/// Last trade print recorded against a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastTrade {
    pub price: Decimal,
    pub size: Decimal,
    pub side: Side,
    pub timestamp: Option<u64>,
}

/// Best bid and ask of one book at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub asset_id: AssetId,
    pub best_bid: Option<Level>,
    pub best_ask: Option<Level>,
    pub timestamp: Option<u64>,
}

/// Depth-limited view of a book with derived metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookState {
    pub asset_id: AssetId,
    pub market: String,
    pub timestamp: Option<u64>,
    pub hash: Option<String>,
    pub tick_size: Option<Decimal>,
    pub last_trade: Option<LastTrade>,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub metrics: OrderBookMetrics,
}
