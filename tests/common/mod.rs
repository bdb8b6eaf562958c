//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use clob_feed::websocket::FrameSink;
use clob_feed::{Channel, Config, FeedError, Result, Transport, TransportConnection, TransportEvent};

#[derive(Default)]
struct MockState {
    fail_opens: usize,
    opens: Vec<Instant>,
    connections: Vec<MockConnection>,
}

struct MockConnection {
    sent: Vec<String>,
    closed: bool,
    events: mpsc::Sender<TransportEvent>,
}

/// In-memory transport recording every open and written frame
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` open attempts
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().unwrap().fail_opens = n;
    }

    /// Number of open attempts, failed ones included
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().connections.len()
    }

    /// Frames written on the `index`th successful connection
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .connections
            .get(index)
            .map(|c| c.sent.clone())
            .unwrap_or_default()
    }

    /// Written frames parsed as JSON, keepalives skipped
    pub fn sent_json(&self, index: usize) -> Vec<serde_json::Value> {
        self.sent(index)
            .iter()
            .filter(|frame| frame.as_str() != "PING")
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        self.state
            .lock()
            .unwrap()
            .connections
            .get(index)
            .map(|c| c.closed)
            .unwrap_or(false)
    }

    /// Deliver an inbound event on the `index`th connection
    pub async fn push(&self, index: usize, event: TransportEvent) {
        let events = self.state.lock().unwrap().connections[index].events.clone();
        events.send(event).await.unwrap();
    }

    pub async fn push_text(&self, index: usize, text: &str) {
        self.push(index, TransportEvent::Message(text.to_string())).await;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<TransportConnection> {
        let mut state = self.state.lock().unwrap();
        state.opens.push(Instant::now());

        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(FeedError::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        let index = state.connections.len();
        state.connections.push(MockConnection {
            sent: Vec::new(),
            closed: false,
            events: tx,
        });

        Ok(TransportConnection {
            sink: Box::new(MockSink {
                state: self.state.clone(),
                index,
            }),
            events: rx,
        })
    }
}

struct MockSink {
    state: Arc<Mutex<MockState>>,
    index: usize,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let connection = &mut state.connections[self.index];
        if connection.closed {
            return Err(FeedError::Transport("sink closed".to_string()));
        }
        connection.sent.push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().connections[self.index].closed = true;
        Ok(())
    }
}

/// Config with fast, deterministic reconnects
pub fn test_config(channels: Vec<Channel>, asset_ids: &[&str]) -> Config {
    Config {
        ws_endpoint: "ws://localhost".to_string(),
        channels,
        asset_ids: asset_ids.iter().map(|s| s.to_string()).collect(),
        heartbeat_interval_secs: 10,
        reconnect_delay_ms: 100,
        max_reconnect_delay_ms: 800,
        reconnect_jitter: 0.0,
        ..Config::default()
    }
}

/// Let spawned tasks run; the paused clock advances only when all are idle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
