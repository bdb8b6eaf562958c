//! Connection session
//!
//! Drives one channel through connect, announce, receive and reconnect.
//! A single task owns the transport sink, so heartbeats, subscription
//! changes and inbound handling never interleave writes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::backoff::{Backoff, BackoffConfig};
use super::transport::{Transport, TransportConnection, TransportEvent};
use crate::auth::ApiCredentials;
use crate::channel::Channel;
use crate::codec::{self, ControlMessage, PONG};
use crate::dispatcher::EventDispatcher;
use crate::error::{FeedError, Result};
use crate::metrics::FeedMetrics;
use crate::subscription::SubscriptionManager;

/// Lifecycle state of a channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Authenticating,
    Ready,
    Closing,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session tuning
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub heartbeat_interval: Duration,
    pub backoff: BackoffConfig,
    /// Consecutive failed connects tolerated before failing; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
    pub custom_feature_enabled: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            max_reconnect_attempts: None,
            custom_feature_enabled: false,
        }
    }
}

/// Shared collaborators of a session
#[derive(Clone)]
pub struct SessionContext {
    pub subscriptions: Arc<SubscriptionManager>,
    pub dispatcher: Arc<EventDispatcher>,
    pub metrics: Arc<FeedMetrics>,
}

/// One channel's connection lifecycle
pub struct Session<T: Transport> {
    channel: Channel,
    url: String,
    auth: Option<ApiCredentials>,
    settings: SessionSettings,
    transport: Arc<T>,
    context: SessionContext,
    outbound: mpsc::UnboundedReceiver<ControlMessage>,
    state: watch::Sender<SessionState>,
    backoff: Backoff,
}

impl<T: Transport> Session<T> {
    /// Create a session; `outbound` receives the subscription manager's control messages
    pub fn new(
        channel: Channel,
        url: String,
        auth: Option<ApiCredentials>,
        settings: SessionSettings,
        transport: Arc<T>,
        context: SessionContext,
        outbound: mpsc::UnboundedReceiver<ControlMessage>,
    ) -> (Self, watch::Receiver<SessionState>) {
        let (state, state_rx) = watch::channel(SessionState::Disconnected);
        let backoff = Backoff::new(settings.backoff.clone());

        let session = Self {
            channel,
            url,
            auth,
            settings,
            transport,
            context,
            outbound,
            state,
            backoff,
        };
        (session, state_rx)
    }

    /// Run until stopped or a fatal error.
    ///
    /// Returns `Ok` after an orderly stop; fatal errors leave the session in
    /// [`SessionState::Failed`] and are returned.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<()> {
        if self.channel == Channel::User && self.auth.is_none() {
            self.set_state(SessionState::Failed);
            error!(channel = %self.channel, "User channel requested without API credentials");
            return Err(FeedError::Protocol(
                "user channel requires API credentials".to_string(),
            ));
        }

        info!(channel = %self.channel, url = %self.url, "Starting session");

        loop {
            if *stop.borrow() {
                break;
            }

            self.set_state(SessionState::Connecting);
            let outcome = self.connect_and_process(&mut stop).await;

            self.context.subscriptions.go_offline(self.channel).await;
            self.discard_outbound();
            // Updates missed while offline are only recovered by the next snapshot
            if self.channel == Channel::Market {
                self.context.dispatcher.invalidate_books().await;
            }

            match outcome {
                Ok(()) => break,
                Err(e) if e.is_fatal() => return Err(self.fail(e)),
                Err(e) => {
                    if let Some(max) = self.settings.max_reconnect_attempts {
                        if self.backoff.attempts() >= max {
                            error!(
                                channel = %self.channel,
                                attempts = self.backoff.attempts(),
                                error = %e,
                                "Giving up after repeated connection failures"
                            );
                            return Err(self.fail(FeedError::MaxReconnectAttemptsExceeded));
                        }
                    }

                    self.set_state(SessionState::Disconnected);
                    let delay = self.backoff.next_delay();
                    self.context
                        .metrics
                        .reconnects
                        .with_label_values(&[self.channel.as_str()])
                        .inc();
                    warn!(
                        channel = %self.channel,
                        error = %e,
                        attempt = self.backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = stop.changed() => {
                            info!(channel = %self.channel, "Stop requested during backoff");
                            break;
                        }
                    }
                }
            }
        }

        self.set_state(SessionState::Disconnected);
        info!(channel = %self.channel, "Session stopped");
        Ok(())
    }

    /// Connect, announce and process frames until stop (`Ok`) or failure (`Err`)
    async fn connect_and_process(&mut self, stop: &mut watch::Receiver<bool>) -> Result<()> {
        let TransportConnection {
            mut sink,
            mut events,
        } = tokio::select! {
            opened = self.transport.open(&self.url) => opened?,
            _ = stop.changed() => return Ok(()),
        };
        self.set_state(SessionState::Open);

        let announce = self.announce().await?;
        self.set_state(SessionState::Authenticating);
        sink.send_text(codec::encode(&announce)?).await?;

        // The venue sends no acknowledgement; a successful announce write counts as ready
        self.set_state(SessionState::Ready);
        self.backoff.reset();
        info!(channel = %self.channel, "Session ready");

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    self.set_state(SessionState::Closing);
                    if let Err(e) = sink.close().await {
                        debug!(channel = %self.channel, error = %e, "Error while closing transport");
                    }
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    sink.send_text(codec::encode(&ControlMessage::Ping)?).await?;
                    self.context
                        .metrics
                        .heartbeats_sent
                        .with_label_values(&[self.channel.as_str()])
                        .inc();
                    trace!(channel = %self.channel, "Heartbeat sent");
                }
                Some(message) = self.outbound.recv() => {
                    debug!(channel = %self.channel, message = ?message, "Sending control message");
                    sink.send_text(codec::encode(&message)?).await?;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Message(text)) => self.handle_frame(&text).await,
                    Some(TransportEvent::Error(e)) => return Err(FeedError::Transport(e)),
                    Some(TransportEvent::Closed { code, reason }) => {
                        return Err(FeedError::Transport(format!(
                            "connection closed (code {:?}): {}",
                            code, reason
                        )));
                    }
                    None => {
                        return Err(FeedError::Transport("transport event queue ended".to_string()));
                    }
                },
            }
        }
    }

    /// Build the channel handshake carrying the full desired set
    async fn announce(&self) -> Result<ControlMessage> {
        match self.channel {
            Channel::Market => Ok(ControlMessage::MarketOpen {
                assets_ids: self.context.subscriptions.go_live(self.channel).await,
                custom_feature_enabled: self.settings.custom_feature_enabled,
            }),
            Channel::User => {
                let auth = self.auth.clone().ok_or_else(|| {
                    FeedError::Protocol("user channel requires API credentials".to_string())
                })?;
                Ok(ControlMessage::UserOpen {
                    markets: self.context.subscriptions.go_live(self.channel).await,
                    auth,
                })
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        self.context
            .metrics
            .frames_received
            .with_label_values(&[self.channel.as_str()])
            .inc();

        if text.trim().eq_ignore_ascii_case(PONG) {
            trace!(channel = %self.channel, "Heartbeat acknowledged");
            return;
        }

        match codec::decode(text) {
            Ok(events) => self.context.dispatcher.dispatch(self.channel, events).await,
            Err(e) => {
                self.context
                    .metrics
                    .decode_errors
                    .with_label_values(&[self.channel.as_str()])
                    .inc();
                warn!(channel = %self.channel, error = %e, "Failed to process message");
            }
        }
    }

    /// Queued changes are superseded by the next announce
    fn discard_outbound(&mut self) {
        let mut discarded = 0usize;
        while self.outbound.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(channel = %self.channel, discarded, "Discarded queued control messages");
        }
    }

    fn fail(&self, error: FeedError) -> FeedError {
        error!(channel = %self.channel, error = %error, "Session failed");
        self.set_state(SessionState::Failed);
        error
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(channel = %self.channel, from = %previous, to = %state, "Session state changed");
        }
    }
}
