//! Feed client
//!
//! Owns the order book store, dispatcher and subscriptions, and runs one
//! session task per configured channel.

use futures_util::future::select_all;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::{ApiCredentials, CredentialProvider};
use crate::channel::{AssetId, Channel};
use crate::config::Config;
use crate::dispatcher::{EventDispatcher, Notification};
use crate::error::{FeedError, Result};
use crate::metrics::FeedMetrics;
use crate::orderbook::{BookState, Level, OrderBookStore, TopOfBook};
use crate::subscription::SubscriptionManager;
use crate::websocket::{Session, SessionContext, SessionState, Transport, WsTransport};

struct RunningSession {
    channel: Channel,
    state: watch::Receiver<SessionState>,
    handle: Option<JoinHandle<Result<()>>>,
}

/// Market data client for the configured channels
pub struct FeedClient<T: Transport = WsTransport> {
    config: Arc<Config>,
    transport: Arc<T>,
    store: Arc<RwLock<OrderBookStore>>,
    dispatcher: Arc<EventDispatcher>,
    subscriptions: Arc<SubscriptionManager>,
    metrics: Arc<FeedMetrics>,
    stop_tx: Option<watch::Sender<bool>>,
    sessions: Vec<RunningSession>,
}

impl FeedClient<WsTransport> {
    /// Create a client connecting over WebSocket
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, WsTransport::default())
    }
}

impl<T: Transport> FeedClient<T> {
    /// Create a client on a custom transport
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(FeedMetrics::new()?);
        let mut books = OrderBookStore::new();
        if config.channels.contains(&Channel::Market) {
            books.track(&config.asset_ids);
        }
        let store = Arc::new(RwLock::new(books));
        let dispatcher = Arc::new(EventDispatcher::new(store.clone(), metrics.clone()));
        let subscriptions = Arc::new(SubscriptionManager::with_initial(
            config
                .channels
                .iter()
                .map(|channel| (*channel, config.initial_subscriptions(*channel))),
        ));

        Ok(Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            store,
            dispatcher,
            subscriptions,
            metrics,
            stop_tx: None,
            sessions: Vec::new(),
        })
    }

    /// Start one session per configured channel.
    ///
    /// When the user channel is configured, credentials are derived first and
    /// a provider failure is returned before any connection is attempted.
    /// Without a provider the user session fails on its own.
    pub async fn start(&mut self, provider: Option<&dyn CredentialProvider>) -> Result<()> {
        if self.sessions.iter().any(|s| s.handle.is_some()) {
            return Err(FeedError::Config("client already started".to_string()));
        }
        self.sessions.clear();

        let auth: Option<ApiCredentials> = match provider {
            Some(provider) if self.config.channels.contains(&Channel::User) => {
                Some(provider.derive_credential().await?)
            }
            _ => None,
        };

        let (stop_tx, _) = watch::channel(false);
        let context = SessionContext {
            subscriptions: self.subscriptions.clone(),
            dispatcher: self.dispatcher.clone(),
            metrics: self.metrics.clone(),
        };

        for channel in self.config.channels.clone() {
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            self.subscriptions.attach(channel, outbound_tx).await;

            let (session, state) = Session::new(
                channel,
                self.config.channel_url(channel),
                if channel == Channel::User { auth.clone() } else { None },
                self.config.session_settings(),
                self.transport.clone(),
                context.clone(),
                outbound_rx,
            );
            let handle = tokio::spawn(session.run(stop_tx.subscribe()));

            self.sessions.push(RunningSession {
                channel,
                state,
                handle: Some(handle),
            });
        }

        self.stop_tx = Some(stop_tx);
        info!(channels = ?self.config.channels, "Feed client started");
        Ok(())
    }

    /// Wait until any session terminates and return its result
    pub async fn wait(&mut self) -> Result<()> {
        let (indices, handles): (Vec<usize>, Vec<&mut JoinHandle<Result<()>>>) = self
            .sessions
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.handle.as_mut().map(|h| (i, h)))
            .unzip();

        if handles.is_empty() {
            return Ok(());
        }

        let (joined, position, rest) = select_all(handles).await;
        drop(rest);

        let index = indices[position];
        self.sessions[index].handle = None;
        flatten(self.sessions[index].channel, joined)
    }

    /// Stop all sessions, close their transports and return the first error
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            stop_tx.send_replace(true);
        }

        let mut first_error = None;
        for session in &mut self.sessions {
            let Some(handle) = session.handle.take() else {
                continue;
            };
            if let Err(e) = flatten(session.channel, handle.await) {
                warn!(channel = %session.channel, error = %e, "Session ended with error");
                first_error.get_or_insert(e);
            }
        }

        info!("Feed client stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Subscribe; market assets are tracked before the request goes out
    pub async fn subscribe(&self, channel: Channel, ids: &[AssetId]) -> Vec<AssetId> {
        if channel == Channel::Market {
            self.store.write().await.track(ids);
        }
        self.subscriptions.subscribe(channel, ids).await
    }

    /// Unsubscribe and forget the books of removed market assets.
    ///
    /// The store guard is held across the change so a snapshot dispatched
    /// concurrently is either dropped with the book or ignored afterwards.
    pub async fn unsubscribe(&self, channel: Channel, ids: &[AssetId]) -> Vec<AssetId> {
        if channel != Channel::Market {
            return self.subscriptions.unsubscribe(channel, ids).await;
        }

        let mut store = self.store.write().await;
        let removed = self.subscriptions.unsubscribe(channel, ids).await;
        for asset_id in &removed {
            store.remove(asset_id);
        }
        removed
    }

    /// Register an observer for every dispatched event
    pub async fn on_event<F>(&self, callback: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.dispatcher.register(Arc::new(callback)).await;
    }

    pub async fn best_bid(&self, asset_id: &str) -> Option<Level> {
        self.store.read().await.best_bid(asset_id)
    }

    pub async fn best_ask(&self, asset_id: &str) -> Option<Level> {
        self.store.read().await.best_ask(asset_id)
    }

    pub async fn top_of_book(&self, asset_id: &str) -> Option<TopOfBook> {
        self.store.read().await.top_of_book(asset_id)
    }

    pub async fn book_state(&self, asset_id: &str) -> Option<BookState> {
        self.store
            .read()
            .await
            .state(asset_id, self.config.depth_levels)
    }

    pub async fn desired(&self, channel: Channel) -> Vec<AssetId> {
        self.subscriptions.desired(channel).await
    }

    pub fn state(&self, channel: Channel) -> Option<SessionState> {
        self.sessions
            .iter()
            .find(|s| s.channel == channel)
            .map(|s| *s.state.borrow())
    }

    pub fn state_watch(&self, channel: Channel) -> Option<watch::Receiver<SessionState>> {
        self.sessions
            .iter()
            .find(|s| s.channel == channel)
            .map(|s| s.state.clone())
    }

    pub fn store(&self) -> Arc<RwLock<OrderBookStore>> {
        self.store.clone()
    }

    pub fn metrics(&self) -> Arc<FeedMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn flatten(
    channel: Channel,
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    joined.map_err(|e| FeedError::Task(format!("{channel} session task failed: {e}")))?
}
