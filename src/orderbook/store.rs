//! Order book store
//!
//! Owns the order books of every tracked asset. Snapshots for assets that
//! are not tracked are ignored, so a late `book` event cannot resurrect an
//! unsubscribed asset.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use super::{BookState, Level, OrderBook, Side, TopOfBook};
use crate::codec::{BookSnapshot, TickSizeChange, TradeTick};
use crate::error::{FeedError, Result};

/// Counters of applied and dropped updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub snapshots: u64,
    pub snapshots_ignored: u64,
    pub deltas_applied: u64,
    pub deltas_dropped: u64,
    pub trades: u64,
}

/// Order books keyed by asset id
#[derive(Debug, Default)]
pub struct OrderBookStore {
    books: HashMap<String, OrderBook>,
    tracked: HashSet<String>,
    stats: StoreStats,
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept snapshots for these assets
    pub fn track<'a>(&mut self, asset_ids: impl IntoIterator<Item = &'a String>) {
        self.tracked.extend(asset_ids.into_iter().cloned());
    }

    pub fn is_tracked(&self, asset_id: &str) -> bool {
        self.tracked.contains(asset_id)
    }

    /// Replace a book wholesale, creating it if needed.
    ///
    /// Returns `None` when the asset is not tracked.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) -> Option<TopOfBook> {
        if !self.tracked.contains(&snapshot.asset_id) {
            self.stats.snapshots_ignored += 1;
            return None;
        }

        let book = self
            .books
            .entry(snapshot.asset_id.clone())
            .or_insert_with(|| OrderBook::new(&snapshot.asset_id, &snapshot.market));
        book.apply_snapshot(snapshot);
        self.stats.snapshots += 1;
        Some(book.top_of_book())
    }

    /// Empty every book until its next snapshot; returns the number of books
    pub fn invalidate_all(&mut self) -> usize {
        for book in self.books.values_mut() {
            book.invalidate();
        }
        self.books.len()
    }

    /// Apply a level delta.
    ///
    /// Deltas for assets without a snapshot, or older than the book, are
    /// dropped and counted.
    pub fn apply_delta(
        &mut self,
        asset_id: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
        timestamp: Option<u64>,
    ) -> Result<TopOfBook> {
        let outcome = match self.books.get_mut(asset_id) {
            Some(book) => book
                .apply_delta(side, price, size, timestamp)
                .map(|()| book.top_of_book()),
            None => Err(FeedError::OutOfOrderUpdate {
                asset_id: asset_id.to_string(),
                reason: "no snapshot received".to_string(),
            }),
        };

        match outcome {
            Ok(_) => self.stats.deltas_applied += 1,
            Err(_) => self.stats.deltas_dropped += 1,
        }
        outcome
    }

    /// Record a trade print against its book, if tracked
    pub fn apply_trade(&mut self, trade: &TradeTick) -> bool {
        self.stats.trades += 1;
        match self.books.get_mut(&trade.asset_id) {
            Some(book) => {
                book.record_trade(trade);
                true
            }
            None => false,
        }
    }

    pub fn apply_tick_size(&mut self, change: &TickSizeChange) -> bool {
        match self.books.get_mut(&change.asset_id) {
            Some(book) => {
                book.set_tick_size(change);
                true
            }
            None => false,
        }
    }

    pub fn best_bid(&self, asset_id: &str) -> Option<Level> {
        self.books.get(asset_id).and_then(OrderBook::best_bid)
    }

    pub fn best_ask(&self, asset_id: &str) -> Option<Level> {
        self.books.get(asset_id).and_then(OrderBook::best_ask)
    }

    pub fn top_of_book(&self, asset_id: &str) -> Option<TopOfBook> {
        self.books.get(asset_id).map(OrderBook::top_of_book)
    }

    pub fn depth(&self, asset_id: &str, side: Side, levels: usize) -> Vec<Level> {
        self.books
            .get(asset_id)
            .map(|book| book.depth(side, levels))
            .unwrap_or_default()
    }

    /// Get the state of a specific book
    pub fn state(&self, asset_id: &str, depth: usize) -> Option<BookState> {
        self.books.get(asset_id).map(|book| book.state(depth))
    }

    pub fn book(&self, asset_id: &str) -> Option<&OrderBook> {
        self.books.get(asset_id)
    }

    /// Stop tracking an asset and drop its book
    pub fn remove(&mut self, asset_id: &str) -> Option<OrderBook> {
        self.tracked.remove(asset_id);
        self.books.remove(asset_id)
    }

    /// Get list of assets being tracked
    pub fn asset_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.books.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}
