//! WebSocket transport over tokio-tungstenite
//!
//! Splits the socket: the write half becomes the session's sink, the read
//! half is drained by a listener task into the session's event queue.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::transport::{FrameSink, Transport, TransportConnection, TransportEvent};
use crate::error::{FeedError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Transport connecting with tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsTransport {
    event_buffer: usize,
}

impl WsTransport {
    pub fn new(event_buffer: usize) -> Self {
        Self {
            event_buffer: event_buffer.max(1),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<TransportConnection> {
        info!(url = %url, "Connecting to WebSocket");

        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| FeedError::Transport(format!("Failed to connect: {}", e)))?;

        info!(status = ?response.status(), "WebSocket connected");

        let (sink, source) = ws_stream.split();
        let (tx, rx) = mpsc::channel(self.event_buffer);
        tokio::spawn(listen(source, tx));

        Ok(TransportConnection {
            sink: Box::new(WsSink { sink }),
            events: rx,
        })
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await.map_err(FeedError::from)
    }
}

/// Forward socket frames to the session until the socket ends or the
/// session drops its receiver
async fn listen(mut source: SplitStream<WsStream>, tx: mpsc::Sender<TransportEvent>) {
    loop {
        let event = match source.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                TransportEvent::Message(text)
            }
            Some(Ok(Message::Binary(data))) => {
                TransportEvent::Message(String::from_utf8_lossy(&data).to_string())
            }
            // tungstenite queues the pong reply itself
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                continue
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                let (code, reason) = frame
                    .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                    .unwrap_or((None, String::new()));
                let _ = tx.send(TransportEvent::Closed { code, reason }).await;
                return;
            }
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
            None => {
                warn!("WebSocket stream ended");
                let _ = tx
                    .send(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    })
                    .await;
                return;
            }
        };

        if tx.send(event).await.is_err() {
            debug!("Session dropped its event queue, stopping listener");
            return;
        }
    }
}
