//! Event dispatcher
//!
//! Applies decoded events to the order book store and fans them out to
//! registered observers, in arrival order.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::codec::MarketEvent;
use crate::metrics::FeedMetrics;
use crate::orderbook::{OrderBookStore, TopOfBook};

/// Event delivered to observers
#[derive(Debug, Clone)]
pub struct Notification {
    pub channel: Channel,
    pub event: MarketEvent,
    /// Updated top of book of every book the event changed
    pub books: Vec<TopOfBook>,
}

/// Observer callback
pub type EventCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Routes events into the store and to observers
pub struct EventDispatcher {
    store: Arc<RwLock<OrderBookStore>>,
    observers: RwLock<Vec<EventCallback>>,
    metrics: Arc<FeedMetrics>,
}

impl EventDispatcher {
    pub fn new(store: Arc<RwLock<OrderBookStore>>, metrics: Arc<FeedMetrics>) -> Self {
        Self {
            store,
            observers: RwLock::new(Vec::new()),
            metrics,
        }
    }

    pub async fn register(&self, callback: EventCallback) {
        self.observers.write().await.push(callback);
    }

    #[cfg(test)]
    pub(crate) async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Empty all books until fresh snapshots arrive
    pub async fn invalidate_books(&self) {
        let invalidated = self.store.write().await.invalidate_all();
        if invalidated > 0 {
            debug!(books = invalidated, "Books awaiting snapshot");
        }
    }

    /// Apply and publish events of one frame
    pub async fn dispatch(&self, channel: Channel, events: Vec<MarketEvent>) {
        for event in events {
            self.metrics.events.with_label_values(&[event.kind()]).inc();

            let books = {
                let mut store = self.store.write().await;
                self.apply(&mut store, &event)
            };

            let observers = self.observers.read().await;
            if observers.is_empty() {
                continue;
            }
            let notification = Notification {
                channel,
                event,
                books,
            };
            for observer in observers.iter() {
                observer(&notification);
            }
        }
    }

    /// Apply one event under the store's write guard
    fn apply(&self, store: &mut OrderBookStore, event: &MarketEvent) -> Vec<TopOfBook> {
        match event {
            MarketEvent::Book(snapshot) => match store.apply_snapshot(snapshot) {
                Some(top) => {
                    debug!(
                        asset_id = %snapshot.asset_id,
                        bids = snapshot.bids.len(),
                        asks = snapshot.asks.len(),
                        "Book snapshot applied"
                    );
                    vec![top]
                }
                None => {
                    debug!(asset_id = %snapshot.asset_id, "Ignoring snapshot for untracked asset");
                    Vec::new()
                }
            },
            MarketEvent::PriceChange(change) => {
                let mut touched = BTreeSet::new();
                for delta in &change.changes {
                    match store.apply_delta(
                        &delta.asset_id,
                        delta.side,
                        delta.price,
                        delta.size,
                        change.timestamp,
                    ) {
                        Ok(_) => {
                            touched.insert(delta.asset_id.as_str());
                        }
                        Err(e) => {
                            self.metrics.out_of_order_updates.inc();
                            debug!(error = %e, "Dropping price change");
                        }
                    }
                }
                touched
                    .into_iter()
                    .filter_map(|asset_id| store.top_of_book(asset_id))
                    .collect()
            }
            MarketEvent::LastTradePrice(trade) => {
                if !store.apply_trade(trade) {
                    trace!(asset_id = %trade.asset_id, "Trade for untracked book");
                }
                Vec::new()
            }
            MarketEvent::TickSizeChange(change) => {
                if store.apply_tick_size(change) {
                    debug!(
                        asset_id = %change.asset_id,
                        tick_size = %change.new_tick_size,
                        "Tick size changed"
                    );
                }
                Vec::new()
            }
            MarketEvent::Trade(_) | MarketEvent::Order(_) => Vec::new(),
            MarketEvent::Unknown(unknown) => {
                trace!(event_type = ?unknown.event_type, "Unknown event type");
                Vec::new()
            }
        }
    }
}
