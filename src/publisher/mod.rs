//! Publisher module for IPC communication
//!
//! Publishes top-of-book updates to other processes over a Unix socket.
//! Each message is MessagePack with a big-endian u32 length prefix.

use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::orderbook::TopOfBook;

/// Publisher for sending top-of-book updates via Unix socket
pub struct Publisher {
    socket_path: String,
    stream: Mutex<Option<UnixStream>>,
}

impl Publisher {
    /// Create a new publisher
    pub async fn new(socket_path: &str) -> Result<Self> {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            stream: Mutex::new(None),
        };

        // Try initial connection (the consumer may not be up yet)
        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        Ok(publisher)
    }

    /// Connect to the Unix socket
    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(FeedError::Ipc(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            FeedError::Ipc(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        let mut guard = self.stream.lock().await;
        *guard = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    /// Frame an update as length-prefixed MessagePack
    pub fn encode(top: &TopOfBook) -> Result<Vec<u8>> {
        let data = rmp_serde::to_vec(top).map_err(|e| {
            FeedError::Serialization(format!("Failed to serialize: {}", e))
        })?;

        let len = (data.len() as u32).to_be_bytes();
        let mut message = Vec::with_capacity(4 + data.len());
        message.extend_from_slice(&len);
        message.extend_from_slice(&data);
        Ok(message)
    }

    /// Publish a top-of-book update; delivery failures are logged, not returned
    pub async fn publish(&self, top: &TopOfBook) -> Result<()> {
        let message = Self::encode(top)?;

        let mut guard = self.stream.lock().await;

        // Check if we need to reconnect
        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(());
            }
            guard = self.stream.lock().await;
        }

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&message).await {
                Ok(_) => {
                    debug!(asset_id = %top.asset_id, "Published top of book");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None;
                }
            }
        }

        Ok(())
    }

    /// Drain a queue of updates until every sender is dropped
    pub async fn run(self, mut updates: mpsc::Receiver<TopOfBook>) {
        while let Some(top) = updates.recv().await {
            if let Err(e) = self.publish(&top).await {
                warn!(error = %e, "Failed to publish top of book");
            }
        }
        debug!("Publisher queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::Level;
    use rust_decimal_macros::dec;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    fn top() -> TopOfBook {
        TopOfBook {
            asset_id: "1".to_string(),
            best_bid: Some(Level {
                price: dec!(0.48),
                size: dec!(30),
            }),
            best_ask: None,
            timestamp: Some(42),
        }
    }

    #[tokio::test]
    async fn test_publish_length_prefixed_msgpack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap()).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        publisher.publish(&top()).await.unwrap();

        let mut len = [0u8; 4];
        server.read_exact(&mut len).await.unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        server.read_exact(&mut body).await.unwrap();

        let decoded: TopOfBook = rmp_serde::from_slice(&body).unwrap();
        assert_eq!(decoded, top());
    }

    #[tokio::test]
    async fn test_missing_socket_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let publisher = Publisher::new(path.to_str().unwrap()).await.unwrap();
        assert!(publisher.publish(&top()).await.is_ok());
    }

    #[test]
    fn test_encode_prefix_matches_body() {
        let framed = Publisher::encode(&top()).unwrap();
        let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
        assert_eq!(len, framed.len() - 4);
    }
}
