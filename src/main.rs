//! CLOB Feed - Order Book Stream Handler
//!
//! Connects to the CLOB market (and optionally user) WebSocket channels,
//! maintains a local order book per asset and publishes top-of-book updates
//! to other system components.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clob_feed::{
    Channel, Config, CredentialProvider, EnvCredentials, FeedClient, FeedMetrics, MarketEvent,
    OrderBookStore, Publisher, SessionState, TopOfBook,
};

/// Application state shared with the health server
pub struct AppState {
    pub store: Arc<RwLock<OrderBookStore>>,
    pub metrics: Arc<FeedMetrics>,
    pub sessions: Vec<(Channel, watch::Receiver<SessionState>)>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting CLOB Feed Handler");

    // Load configuration
    let config = Config::load()?;
    info!(
        channels = ?config.channels,
        assets = config.asset_ids.len(),
        "Configuration loaded"
    );

    let mut client = FeedClient::new(config.clone())?;

    client
        .on_event(|notification| match &notification.event {
            MarketEvent::Book(book) => {
                debug!(asset_id = %book.asset_id, bids = book.bids.len(), asks = book.asks.len(), "Book snapshot");
            }
            MarketEvent::Unknown(unknown) => {
                debug!(event_type = ?unknown.event_type, "Unhandled event type");
            }
            event => {
                debug!(channel = %notification.channel, event_type = event.kind(), "Event");
            }
        })
        .await;

    // Initialize publisher for IPC
    let publisher_task = match &config.ipc_socket_path {
        Some(path) => {
            let publisher = Publisher::new(path).await?;
            let (tx, rx) = mpsc::channel::<TopOfBook>(10_000);
            client
                .on_event(move |notification| {
                    for top in &notification.books {
                        if tx.try_send(top.clone()).is_err() {
                            warn!(asset_id = %top.asset_id, "Publisher queue full, dropping update");
                        }
                    }
                })
                .await;
            Some(tokio::spawn(publisher.run(rx)))
        }
        None => None,
    };

    let provider = EnvCredentials;
    let provider: Option<&dyn CredentialProvider> = config
        .channels
        .contains(&Channel::User)
        .then_some(&provider as &dyn CredentialProvider);
    client.start(provider).await?;

    let state = Arc::new(AppState {
        store: client.store(),
        metrics: client.metrics(),
        sessions: config
            .channels
            .iter()
            .filter_map(|channel| client.state_watch(*channel).map(|rx| (*channel, rx)))
            .collect(),
    });

    // Start health check server
    let health_state = state.clone();
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Periodic book status
    let status_state = state.clone();
    let status_interval = Duration::from_secs(config.status_interval_secs.max(1));
    let depth_levels = config.depth_levels;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(status_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log_status(&status_state, depth_levels).await;
        }
    });

    let outcome = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            result.map_err(anyhow::Error::from)
        }
        result = client.wait() => {
            result.map_err(anyhow::Error::from)
        }
    };

    let stopped = client.stop().await;
    drop(client);
    if let Some(task) = publisher_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Publisher task failed");
        }
    }

    info!("CLOB Feed Handler stopped");
    outcome?;
    stopped?;
    Ok(())
}

async fn log_status(state: &AppState, depth_levels: usize) {
    let store = state.store.read().await;
    let stats = store.stats();
    info!(
        books = store.len(),
        snapshots = stats.snapshots,
        deltas = stats.deltas_applied,
        dropped = stats.deltas_dropped,
        trades = stats.trades,
        ignored_snapshots = stats.snapshots_ignored,
        "Feed status"
    );

    for asset_id in store.asset_ids() {
        if let Some(book) = store.state(&asset_id, depth_levels) {
            info!(
                asset_id = %asset_id,
                mid = ?book.metrics.mid_price,
                spread_bps = ?book.metrics.spread_bps,
                imbalance = ?book.metrics.imbalance,
                "Book"
            );
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    use std::net::SocketAddr;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let sessions: serde_json::Map<String, serde_json::Value> = state
        .sessions
        .iter()
        .map(|(channel, rx)| (channel.to_string(), rx.borrow().as_str().into()))
        .collect();
    let ready = state
        .sessions
        .iter()
        .all(|(_, rx)| *rx.borrow() == SessionState::Ready);
    let books = state.store.read().await.len();

    Json(serde_json::json!({
        "status": if ready { "healthy" } else { "degraded" },
        "component": "clob-feed",
        "sessions": sessions,
        "books": books,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    state.metrics.encode_text().map_err(|e| {
        warn!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
