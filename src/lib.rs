//! CLOB Feed - Order Book Stream Client Library
//!
//! This crate connects to a CLOB venue's market and user WebSocket channels,
//! keeps subscriptions reconciled across reconnects and rebuilds a local
//! order book per asset from snapshot and delta events.

pub mod auth;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod orderbook;
pub mod publisher;
pub mod subscription;
pub mod websocket;

pub use auth::{ApiCredentials, CredentialProvider, EnvCredentials, StaticCredentials};
pub use channel::{AssetId, Channel};
pub use client::FeedClient;
pub use codec::{decode, encode, ControlMessage, MarketEvent};
pub use config::Config;
pub use dispatcher::{EventCallback, EventDispatcher, Notification};
pub use error::{FeedError, Result};
pub use metrics::FeedMetrics;
pub use orderbook::{BookState, Level, OrderBook, OrderBookStore, Side, TopOfBook};
pub use publisher::Publisher;
pub use subscription::SubscriptionManager;
pub use websocket::{
    SessionState, Transport, TransportConnection, TransportEvent, WsTransport,
};
