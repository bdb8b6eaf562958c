//! Session lifecycle tests against an in-memory transport

mod common;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clob_feed::{
    ApiCredentials, Channel, CredentialProvider, FeedClient, FeedError, Level, Result,
    SessionState, StaticCredentials, TransportEvent,
};
use common::{settle, test_config, MockTransport};

const BOOK: &str = r#"{"event_type":"book","asset_id":"A","market":"0xm",
    "bids":[{"price":".48","size":"30"},{"price":".47","size":"10"}],
    "asks":[{"price":".52","size":"25"}],"timestamp":"1000","hash":"h1"}"#;

const PRICE_CHANGE: &str = r#"{"event_type":"price_change","market":"0xm","timestamp":"1001",
    "price_changes":[{"asset_id":"A","price":"0.49","size":"5","side":"BUY"}]}"#;

struct FailingProvider;

#[async_trait]
impl CredentialProvider for FailingProvider {
    async fn derive_credential(&self) -> Result<ApiCredentials> {
        Err(FeedError::Auth("invalid L1 signature".to_string()))
    }
}

async fn started(
    channels: Vec<Channel>,
    assets: &[&str],
) -> (FeedClient<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    let mut client =
        FeedClient::with_transport(test_config(channels, assets), transport.clone()).unwrap();
    client.start(None).await.unwrap();
    settle().await;
    (client, transport)
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_before_start_is_sent_in_single_announce() {
    let transport = MockTransport::new();
    let mut client = FeedClient::with_transport(
        test_config(vec![Channel::Market], &["A"]),
        transport.clone(),
    )
    .unwrap();

    let added = client.subscribe(Channel::Market, &["B".to_string()]).await;
    assert_eq!(added, vec!["B"]);

    client.start(None).await.unwrap();
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(
        transport.sent_json(0),
        vec![json!({"assets_ids": ["A", "B"], "type": "MARKET", "custom_feature_enabled": false})]
    );
    assert_eq!(client.state(Channel::Market), Some(SessionState::Ready));

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_live_subscribe_sends_only_new_ids() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;

    let added = client
        .subscribe(Channel::Market, &["A".to_string(), "B".to_string()])
        .await;
    assert_eq!(added, vec!["B"]);

    let repeated = client.subscribe(Channel::Market, &["B".to_string()]).await;
    assert!(repeated.is_empty());
    settle().await;

    let sent = transport.sent_json(0);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1], json!({"assets_ids": ["B"], "operation": "subscribe"}));

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_announces_current_desired_set() {
    let (mut client, transport) = started(vec![Channel::Market], &["A", "B"]).await;
    transport.push_text(0, BOOK).await;
    settle().await;
    assert!(client.best_bid("A").await.is_some());

    let removed = client.unsubscribe(Channel::Market, &["A".to_string()]).await;
    assert_eq!(removed, vec!["A"]);
    assert!(client.best_bid("A").await.is_none());
    settle().await;
    assert_eq!(
        transport.sent_json(0)[1],
        json!({"assets_ids": ["A"], "operation": "unsubscribe"})
    );

    transport
        .push(
            0,
            TransportEvent::Closed {
                code: Some(1006),
                reason: "abnormal".to_string(),
            },
        )
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(transport.open_count(), 2);
    assert_eq!(
        transport.sent_json(1),
        vec![json!({"assets_ids": ["B"], "type": "MARKET", "custom_feature_enabled": false})]
    );
    assert_eq!(client.state(Channel::Market), Some(SessionState::Ready));

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_books_await_snapshot_after_disconnect() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;
    transport.push_text(0, BOOK).await;
    settle().await;
    assert_eq!(client.best_bid("A").await.map(|l| l.price), Some(dec!(0.48)));

    transport
        .push(
            0,
            TransportEvent::Closed {
                code: Some(1006),
                reason: "abnormal".to_string(),
            },
        )
        .await;
    settle().await;
    assert_eq!(client.state(Channel::Market), Some(SessionState::Disconnected));
    assert_eq!(client.best_bid("A").await, None);
    assert_eq!(client.best_ask("A").await, None);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.state(Channel::Market), Some(SessionState::Ready));

    let late_delta = r#"{"event_type":"price_change","market":"0xm","timestamp":"5000",
        "price_changes":[{"asset_id":"A","price":"0.50","size":"7","side":"BUY"}]}"#;
    transport.push_text(1, late_delta).await;
    settle().await;

    assert_eq!(client.best_bid("A").await, None);
    assert_eq!(client.metrics().out_of_order_updates.get(), 1);
    {
        let store = client.store();
        let stats = store.read().await.stats();
        assert_eq!(stats.deltas_applied, 0);
        assert_eq!(stats.deltas_dropped, 1);
    }

    transport.push_text(1, BOOK).await;
    transport.push_text(1, PRICE_CHANGE).await;
    settle().await;
    assert_eq!(
        client.best_bid("A").await,
        Some(Level {
            price: dec!(0.49),
            size: dec!(5)
        })
    );

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_after_unsubscribe_is_ignored() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;
    transport.push_text(0, BOOK).await;
    settle().await;

    client.unsubscribe(Channel::Market, &["A".to_string()]).await;
    transport.push_text(0, BOOK).await;
    settle().await;

    assert!(client.desired(Channel::Market).await.is_empty());
    assert!(client.store().read().await.asset_ids().is_empty());
    assert_eq!(client.best_bid("A").await, None);

    client.subscribe(Channel::Market, &["A".to_string()]).await;
    transport.push_text(0, BOOK).await;
    settle().await;
    assert_eq!(client.best_bid("A").await.map(|l| l.price), Some(dec!(0.48)));

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_to_cap_and_resets_when_ready() {
    let transport = MockTransport::new();
    transport.fail_next_opens(6);
    let mut client = FeedClient::with_transport(
        test_config(vec![Channel::Market], &["A"]),
        transport.clone(),
    )
    .unwrap();
    client.start(None).await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.open_count(), 7);
    assert_eq!(client.state(Channel::Market), Some(SessionState::Ready));

    let times = transport.open_times();
    let gaps: Vec<u64> = times
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect();
    let expected = [100u64, 200, 400, 800, 800, 800];
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(*gap >= want && *gap < want + 10, "gap {gap}ms, expected {want}ms");
    }

    let failed_at = tokio::time::Instant::now();
    transport
        .push(0, TransportEvent::Error("connection reset".to_string()))
        .await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let times = transport.open_times();
    assert_eq!(times.len(), 8);
    let gap = (times[7] - failed_at).as_millis() as u64;
    assert!((100..110).contains(&gap), "gap after ready {gap}ms");

    let reconnects = client
        .metrics()
        .reconnects
        .with_label_values(&["market"])
        .get();
    assert_eq!(reconnects, 7);

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_prevents_reconnect() {
    let transport = MockTransport::new();
    transport.fail_next_opens(1);
    let mut config = test_config(vec![Channel::Market], &["A"]);
    config.reconnect_delay_ms = 5_000;
    config.max_reconnect_delay_ms = 60_000;

    let mut client = FeedClient::with_transport(config, transport.clone()).unwrap();
    client.start(None).await.unwrap();
    settle().await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(Channel::Market), Some(SessionState::Disconnected));

    client.stop().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(client.state(Channel::Market), Some(SessionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn test_user_channel_without_credentials_fails() {
    let transport = MockTransport::new();
    let mut client =
        FeedClient::with_transport(test_config(vec![Channel::User], &[]), transport.clone())
            .unwrap();
    client.start(None).await.unwrap();

    let result = client.wait().await;
    assert!(matches!(result, Err(FeedError::Protocol(_))));
    assert_eq!(transport.open_count(), 0);
    assert_eq!(client.state(Channel::User), Some(SessionState::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_credential_failure_surfaces_before_connect() {
    let transport = MockTransport::new();
    let mut client =
        FeedClient::with_transport(test_config(vec![Channel::User], &[]), transport.clone())
            .unwrap();

    let result = client.start(Some(&FailingProvider)).await;
    assert!(matches!(result, Err(FeedError::Auth(_))));
    settle().await;
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_user_channel_announce_carries_credentials() {
    let transport = MockTransport::new();
    let mut config = test_config(vec![Channel::User], &[]);
    config.markets = vec!["0xabc".to_string()];
    let mut client = FeedClient::with_transport(config, transport.clone()).unwrap();

    let provider = StaticCredentials(ApiCredentials::new("key", "secret", "pass"));
    client.start(Some(&provider)).await.unwrap();
    settle().await;

    assert_eq!(
        transport.sent_json(0),
        vec![json!({
            "markets": ["0xabc"],
            "type": "user",
            "auth": {"apiKey": "key", "secret": "secret", "passphrase": "pass"}
        })]
    );
    assert_eq!(client.state(Channel::User), Some(SessionState::Ready));

    // Filter changes take effect on the next connection
    client.subscribe(Channel::User, &["0xdef".to_string()]).await;
    settle().await;
    assert_eq!(transport.sent_json(0).len(), 1);

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sent_every_interval() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;

    tokio::time::sleep(Duration::from_secs(25)).await;

    let pings = transport
        .sent(0)
        .iter()
        .filter(|frame| frame.as_str() == "PING")
        .count();
    assert_eq!(pings, 2);
    assert_eq!(
        client
            .metrics()
            .heartbeats_sent
            .with_label_values(&["market"])
            .get(),
        2
    );

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_frames_update_books_and_reach_observers_in_order() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client
        .on_event(move |n| sink.lock().unwrap().push(n.event.kind()))
        .await;

    transport.push_text(0, BOOK).await;
    transport.push_text(0, PRICE_CHANGE).await;
    settle().await;

    assert_eq!(
        client.best_bid("A").await,
        Some(Level {
            price: dec!(0.49),
            size: dec!(5)
        })
    );
    assert_eq!(client.best_ask("A").await.map(|l| l.price), Some(dec!(0.52)));
    assert_eq!(*seen.lock().unwrap(), vec!["book", "price_change"]);

    let state = client.book_state("A").await.unwrap();
    assert_eq!(state.timestamp, Some(1001));
    assert_eq!(state.bids.len(), 3);

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_is_counted_and_session_continues() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;

    transport.push_text(0, "{not json").await;
    transport.push_text(0, "PONG").await;
    transport.push_text(0, BOOK).await;
    settle().await;

    let metrics = client.metrics();
    assert_eq!(metrics.decode_errors.with_label_values(&["market"]).get(), 1);
    assert_eq!(metrics.frames_received.with_label_values(&["market"]).get(), 3);
    assert_eq!(client.state(Channel::Market), Some(SessionState::Ready));
    assert!(client.best_bid("A").await.is_some());
    assert_eq!(transport.open_count(), 1);

    client.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_transport() {
    let (mut client, transport) = started(vec![Channel::Market], &["A"]).await;
    assert!(!transport.is_closed(0));

    client.stop().await.unwrap();

    assert!(transport.is_closed(0));
    assert_eq!(client.state(Channel::Market), Some(SessionState::Disconnected));
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_reconnect_attempts() {
    let transport = MockTransport::new();
    transport.fail_next_opens(10);
    let mut config = test_config(vec![Channel::Market], &["A"]);
    config.max_reconnect_attempts = 2;

    let mut client = FeedClient::with_transport(config, transport.clone()).unwrap();
    client.start(None).await.unwrap();

    let result = client.wait().await;
    assert!(matches!(result, Err(FeedError::MaxReconnectAttemptsExceeded)));
    assert_eq!(transport.open_count(), 3);
    assert_eq!(client.state(Channel::Market), Some(SessionState::Failed));
}
