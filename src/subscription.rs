//! Subscription manager
//!
//! Tracks the desired asset set of each channel. While a channel is live,
//! changes are forwarded to its session as control messages; otherwise they
//! wait for the next channel-open, which always announces the full set.

use std::collections::{BTreeSet, HashMap};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::channel::{AssetId, Channel};
use crate::codec::ControlMessage;

#[derive(Debug, Default)]
struct ChannelSubscriptions {
    desired: BTreeSet<AssetId>,
    outbound: Option<mpsc::UnboundedSender<ControlMessage>>,
    live: bool,
}

/// Desired subscriptions per channel
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    channels: Mutex<HashMap<Channel, ChannelSubscriptions>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an initial desired set per channel
    pub fn with_initial(initial: impl IntoIterator<Item = (Channel, Vec<AssetId>)>) -> Self {
        let mut channels: HashMap<Channel, ChannelSubscriptions> = HashMap::new();
        for (channel, ids) in initial {
            channels.entry(channel).or_default().desired.extend(ids);
        }
        Self {
            channels: Mutex::new(channels),
        }
    }

    /// Register the outbound queue of the session serving `channel`
    pub async fn attach(&self, channel: Channel, outbound: mpsc::UnboundedSender<ControlMessage>) {
        let mut channels = self.channels.lock().await;
        let entry = channels.entry(channel).or_default();
        entry.outbound = Some(outbound);
        entry.live = false;
    }

    /// Add ids to the desired set; returns the ids that were not already present
    pub async fn subscribe(&self, channel: Channel, ids: &[AssetId]) -> Vec<AssetId> {
        let mut channels = self.channels.lock().await;
        let entry = channels.entry(channel).or_default();

        let added: Vec<AssetId> = ids
            .iter()
            .filter(|id| entry.desired.insert((*id).clone()))
            .cloned()
            .collect();

        if !added.is_empty() {
            Self::forward(
                channel,
                entry,
                ControlMessage::Subscribe {
                    assets_ids: added.clone(),
                },
            );
        }
        added
    }

    /// Remove ids from the desired set; returns the ids that were present
    pub async fn unsubscribe(&self, channel: Channel, ids: &[AssetId]) -> Vec<AssetId> {
        let mut channels = self.channels.lock().await;
        let entry = channels.entry(channel).or_default();

        let removed: Vec<AssetId> = ids
            .iter()
            .filter(|id| entry.desired.remove(id.as_str()))
            .cloned()
            .collect();

        if !removed.is_empty() {
            Self::forward(
                channel,
                entry,
                ControlMessage::Unsubscribe {
                    assets_ids: removed.clone(),
                },
            );
        }
        removed
    }

    /// Mark the channel live and return the full desired set to announce.
    ///
    /// Changes made after this call are queued behind the announce.
    pub async fn go_live(&self, channel: Channel) -> Vec<AssetId> {
        let mut channels = self.channels.lock().await;
        let entry = channels.entry(channel).or_default();
        entry.live = true;
        entry.desired.iter().cloned().collect()
    }

    /// Mark the channel offline; changes are deferred until the next announce
    pub async fn go_offline(&self, channel: Channel) {
        if let Some(entry) = self.channels.lock().await.get_mut(&channel) {
            entry.live = false;
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_live(&self, channel: Channel) -> bool {
        self.channels
            .lock()
            .await
            .get(&channel)
            .map(|entry| entry.live)
            .unwrap_or(false)
    }

    /// Current desired set, in order
    pub async fn desired(&self, channel: Channel) -> Vec<AssetId> {
        self.channels
            .lock()
            .await
            .get(&channel)
            .map(|entry| entry.desired.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn forward(channel: Channel, entry: &mut ChannelSubscriptions, message: ControlMessage) {
        // The user channel has no incremental operation; the set is applied on the next open
        if !entry.live || channel == Channel::User {
            debug!(channel = %channel, "Subscription change deferred until next channel open");
            return;
        }

        let Some(outbound) = entry.outbound.as_ref() else {
            return;
        };
        if outbound.send(message).is_err() {
            info!(channel = %channel, "Session outbound queue closed, deferring subscription change");
            entry.live = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<AssetId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_deferred_until_live() {
        let manager = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.attach(Channel::Market, tx).await;

        manager.subscribe(Channel::Market, &ids(&["2", "1"])).await;
        assert!(rx.try_recv().is_err());

        let announced = manager.go_live(Channel::Market).await;
        assert_eq!(announced, ids(&["1", "2"]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_live_changes_forwarded() {
        let manager = SubscriptionManager::with_initial([(Channel::Market, ids(&["1"]))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.attach(Channel::Market, tx).await;
        manager.go_live(Channel::Market).await;

        let added = manager.subscribe(Channel::Market, &ids(&["1", "3"])).await;
        assert_eq!(added, ids(&["3"]));
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlMessage::Subscribe {
                assets_ids: ids(&["3"])
            }
        );

        let removed = manager.unsubscribe(Channel::Market, &ids(&["1", "9"])).await;
        assert_eq!(removed, ids(&["1"]));
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlMessage::Unsubscribe {
                assets_ids: ids(&["1"])
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_sends_nothing() {
        let manager = SubscriptionManager::with_initial([(Channel::Market, ids(&["1"]))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.attach(Channel::Market, tx).await;
        manager.go_live(Channel::Market).await;

        assert!(manager.subscribe(Channel::Market, &ids(&["1"])).await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_shrinks_next_announce() {
        let manager = SubscriptionManager::with_initial([(Channel::Market, ids(&["1", "2"]))]);
        let (tx, _rx) = mpsc::unbounded_channel();
        manager.attach(Channel::Market, tx).await;
        manager.go_live(Channel::Market).await;

        manager.unsubscribe(Channel::Market, &ids(&["2"])).await;
        manager.go_offline(Channel::Market).await;
        assert!(!manager.is_live(Channel::Market).await);

        assert_eq!(manager.go_live(Channel::Market).await, ids(&["1"]));
    }

    #[tokio::test]
    async fn test_user_channel_changes_wait_for_open() {
        let manager = SubscriptionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.attach(Channel::User, tx).await;
        manager.go_live(Channel::User).await;

        manager.subscribe(Channel::User, &ids(&["0xabc"])).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.desired(Channel::User).await, ids(&["0xabc"]));
    }

    #[tokio::test]
    async fn test_closed_queue_goes_offline() {
        let manager = SubscriptionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.attach(Channel::Market, tx).await;
        manager.go_live(Channel::Market).await;
        drop(rx);

        manager.subscribe(Channel::Market, &ids(&["5"])).await;
        assert!(!manager.is_live(Channel::Market).await);
        assert_eq!(manager.desired(Channel::Market).await, ids(&["5"]));
    }
}
