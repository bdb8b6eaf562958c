//! Transport boundary
//!
//! A transport opens a connection and hands back a writable sink plus a
//! queue of inbound events fed by its own listener task.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Inbound event from a transport listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame
    Message(String),
    /// Socket-level failure; the connection is unusable afterwards
    Error(String),
    /// Peer closed the connection
    Closed { code: Option<u16>, reason: String },
}

/// Write half of an open connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Open connection
pub struct TransportConnection {
    pub sink: Box<dyn FrameSink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Connection factory
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str) -> Result<TransportConnection>;
}
