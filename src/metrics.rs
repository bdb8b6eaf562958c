//! Prometheus counters for the feed

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{FeedError, Result};

/// Feed counters registered in their own registry
#[derive(Clone)]
pub struct FeedMetrics {
    registry: Registry,
    pub frames_received: IntCounterVec,
    pub decode_errors: IntCounterVec,
    pub events: IntCounterVec,
    pub out_of_order_updates: IntCounter,
    pub reconnects: IntCounterVec,
    pub heartbeats_sent: IntCounterVec,
}

impl FeedMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let frames_received = IntCounterVec::new(
            Opts::new("feed_frames_received_total", "Text frames received"),
            &["channel"],
        )?;
        let decode_errors = IntCounterVec::new(
            Opts::new("feed_decode_errors_total", "Frames dropped as malformed"),
            &["channel"],
        )?;
        let events = IntCounterVec::new(
            Opts::new("feed_events_total", "Decoded events dispatched"),
            &["event_type"],
        )?;
        let out_of_order_updates = IntCounter::new(
            "feed_out_of_order_updates_total",
            "Deltas dropped for unknown or stale books",
        )?;
        let reconnects = IntCounterVec::new(
            Opts::new("feed_reconnects_total", "Reconnect attempts scheduled"),
            &["channel"],
        )?;
        let heartbeats_sent = IntCounterVec::new(
            Opts::new("feed_heartbeats_sent_total", "Keepalive frames sent"),
            &["channel"],
        )?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(out_of_order_updates.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(heartbeats_sent.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            decode_errors,
            events,
            out_of_order_updates,
            reconnects,
            heartbeats_sent,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all counters in the Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| FeedError::Metrics(e.to_string()))
    }
}

impl std::fmt::Debug for FeedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedMetrics").finish_non_exhaustive()
    }
}
