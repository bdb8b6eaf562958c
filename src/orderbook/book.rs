//! Core order book implementation
//!
//! Uses BTreeMap for efficient sorted price level management.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{BookState, LastTrade, Level, OrderBookMetrics, Side, TopOfBook};
use crate::codec::{BookSnapshot, TickSizeChange, TradeTick};
use crate::error::{FeedError, Result};

/// Order book for a single asset
#[derive(Debug, Clone)]
pub struct OrderBook {
    asset_id: String,
    market: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Venue timestamp (ms) of the last applied update
    last_timestamp: Option<u64>,
    /// Venue hash of the last applied update
    last_hash: Option<String>,
    tick_size: Option<Decimal>,
    last_trade: Option<LastTrade>,
    /// Levels reflect a snapshot of the current connection
    synced: bool,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(asset_id: &str, market: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            market: market.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_timestamp: None,
            last_hash: None,
            tick_size: None,
            last_trade: None,
            synced: false,
        }
    }

    /// Replace both sides with a snapshot
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            if level.size > Decimal::ZERO {
                self.bids.insert(Reverse(level.price), level.size);
            }
        }

        for level in &snapshot.asks {
            if level.size > Decimal::ZERO {
                self.asks.insert(level.price, level.size);
            }
        }

        if !snapshot.market.is_empty() {
            self.market = snapshot.market.clone();
        }
        self.last_timestamp = snapshot.timestamp;
        self.last_hash = snapshot.hash.clone();
        self.synced = true;
    }

    /// Drop all levels until the next snapshot.
    ///
    /// Deltas are rejected meanwhile, since updates missed while the feed was
    /// down cannot be recovered from later deltas.
    pub fn invalidate(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.synced = false;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Set the aggregate size at one price level.
    ///
    /// A non-positive size removes the level. Updates older than the last
    /// applied one, or arriving before a snapshot, are rejected.
    pub fn apply_delta(
        &mut self,
        side: Side,
        price: Decimal,
        size: Decimal,
        timestamp: Option<u64>,
    ) -> Result<()> {
        if !self.synced {
            return Err(FeedError::OutOfOrderUpdate {
                asset_id: self.asset_id.clone(),
                reason: "awaiting snapshot".to_string(),
            });
        }

        if let (Some(ts), Some(last)) = (timestamp, self.last_timestamp) {
            if ts < last {
                return Err(FeedError::OutOfOrderUpdate {
                    asset_id: self.asset_id.clone(),
                    reason: format!("update at {ts} is older than book at {last}"),
                });
            }
        }

        match side {
            Side::Bid => {
                if size <= Decimal::ZERO {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Ask => {
                if size <= Decimal::ZERO {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                }
            }
        }

        if timestamp.is_some() {
            self.last_timestamp = timestamp;
        }
        Ok(())
    }

    /// Record a trade print; levels are left untouched
    pub fn record_trade(&mut self, trade: &TradeTick) {
        self.last_trade = Some(LastTrade {
            price: trade.price,
            size: trade.size,
            side: trade.side,
            timestamp: trade.timestamp,
        });
    }

    pub fn set_tick_size(&mut self, change: &TickSizeChange) {
        self.tick_size = Some(change.new_tick_size);
    }

    /// Get best bid level
    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first_key_value().map(|(Reverse(p), s)| Level {
            price: *p,
            size: *s,
        })
    }

    /// Get best ask level
    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first_key_value().map(|(p, s)| Level {
            price: *p,
            size: *s,
        })
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::from(2)),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Get spread in basis points
    pub fn spread_bps(&self) -> Option<Decimal> {
        match (self.spread(), self.mid_price()) {
            (Some(spread), Some(mid)) if mid > Decimal::ZERO => {
                Some(spread / mid * Decimal::from(10000))
            }
            _ => None,
        }
    }

    /// Calculate order book imbalance at top N levels
    pub fn imbalance(&self, levels: usize) -> Option<Decimal> {
        let bid_volume: Decimal = self.bids.iter().take(levels).map(|(_, q)| q).sum();
        let ask_volume: Decimal = self.asks.iter().take(levels).map(|(_, q)| q).sum();

        let total = bid_volume + ask_volume;
        if total > Decimal::ZERO {
            Some((bid_volume - ask_volume) / total)
        } else {
            None
        }
    }

    /// Best `levels` levels of one side, best first
    pub fn depth(&self, side: Side, levels: usize) -> Vec<Level> {
        match side {
            Side::Bid => self
                .bids
                .iter()
                .take(levels)
                .map(|(Reverse(p), s)| Level {
                    price: *p,
                    size: *s,
                })
                .collect(),
            Side::Ask => self
                .asks
                .iter()
                .take(levels)
                .map(|(p, s)| Level {
                    price: *p,
                    size: *s,
                })
                .collect(),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn tick_size(&self) -> Option<Decimal> {
        self.tick_size
    }

    pub fn last_trade(&self) -> Option<&LastTrade> {
        self.last_trade.as_ref()
    }

    pub fn top_of_book(&self) -> TopOfBook {
        TopOfBook {
            asset_id: self.asset_id.clone(),
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            timestamp: self.last_timestamp,
        }
    }

    /// Depth-limited state for publishing
    pub fn state(&self, depth: usize) -> BookState {
        BookState {
            asset_id: self.asset_id.clone(),
            market: self.market.clone(),
            timestamp: self.last_timestamp,
            hash: self.last_hash.clone(),
            tick_size: self.tick_size,
            last_trade: self.last_trade.clone(),
            bids: self.depth(Side::Bid, depth),
            asks: self.depth(Side::Ask, depth),
            metrics: self.calculate_metrics(),
        }
    }

    /// Calculate order book metrics
    fn calculate_metrics(&self) -> OrderBookMetrics {
        OrderBookMetrics {
            mid_price: self.mid_price(),
            spread: self.spread(),
            spread_bps: self.spread_bps(),
            imbalance: self.imbalance(5),
            bid_depth: self.bids.values().copied().sum(),
            ask_depth: self.asks.values().copied().sum(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }

    #[cfg(test)]
    fn all_sizes(&self) -> Vec<Decimal> {
        self.bids.values().chain(self.asks.values()).copied().collect()
    }
}
