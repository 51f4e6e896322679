//! Broadcast fan-out of presence and call-state notifications

use callsign_core::models::Notification;
use callsign_core::traits::NotificationSink;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of notifications a slow receiver may lag behind
pub const DEFAULT_CAPACITY: usize = 256;

/// [`NotificationSink`] backed by a `tokio::sync::broadcast` channel
///
/// Publishing never waits: with no receivers the notification is dropped,
/// and a lagging receiver loses the oldest entries.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            trace!("No notification receivers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_every_receiver() {
        let notifier = BroadcastNotifier::default();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.publish(Notification::new("presence", 3, json!({"extension": "1001"})));

        assert_eq!(first.recv().await.unwrap().tenant_id, 3);
        assert_eq!(second.recv().await.unwrap().event_type, "presence");
    }

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let notifier = BroadcastNotifier::new(0);
        assert_eq!(notifier.receiver_count(), 0);
        notifier.publish(Notification::new("presence", 1, json!({})));
    }

    #[tokio::test]
    async fn test_lagging_receiver_does_not_block_publisher() {
        let notifier = BroadcastNotifier::new(2);
        let mut rx = notifier.subscribe();
        for i in 0..5 {
            notifier.publish(Notification::new("presence", i, json!({})));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(rx.recv().await.unwrap().tenant_id, 3);
    }
}
