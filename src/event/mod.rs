//! Notification fan-out to live subscribers.
//!
//! Every typed notification the bridge produces goes through a
//! [`NotificationSink`]. Publishing never blocks and silently does nothing
//! when no one is subscribed.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::{
    AckNotice, ConnectionStatus, NodeRecord, PositionReport, TelemetryReport, TextMessage,
    TracerouteExchange,
};

/// A typed notification.
///
/// Serializes as `{"type": "<kind>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// Link state changed.
    ConnectionStatus(ConnectionStatus),
    /// Delivery confirmation for a sent message.
    Ack(AckNotice),
    /// Traceroute response.
    Traceroute(TracerouteExchange),
    /// Inbound text message.
    Message(TextMessage),
    /// Position report.
    Position(PositionReport),
    /// Telemetry report.
    Telemetry(TelemetryReport),
    /// A node directory entry changed.
    NodeUpdate(Box<NodeRecord>),
}

/// Discriminant of a [`Notification`], for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ConnectionStatus,
    Ack,
    Traceroute,
    Message,
    Position,
    Telemetry,
    NodeUpdate,
}

impl Notification {
    /// Returns the notification kind.
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self {
            Self::ConnectionStatus(_) => NotificationKind::ConnectionStatus,
            Self::Ack(_) => NotificationKind::Ack,
            Self::Traceroute(_) => NotificationKind::Traceroute,
            Self::Message(_) => NotificationKind::Message,
            Self::Position(_) => NotificationKind::Position,
            Self::Telemetry(_) => NotificationKind::Telemetry,
            Self::NodeUpdate(_) => NotificationKind::NodeUpdate,
        }
    }

    /// Returns the packet id this notification correlates with, if any.
    ///
    /// For acks this is the acknowledged packet; for traceroutes, the request.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<u32> {
        match self {
            Self::Ack(ack) => Some(ack.packet_id),
            Self::Traceroute(trace) => trace.request_id,
            Self::Message(message) => message.packet_id,
            _ => None,
        }
    }

    /// Encodes the notification as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A subscription to notifications.
pub struct Subscription {
    receiver: broadcast::Receiver<Notification>,
}

impl Subscription {
    /// Receives the next notification.
    ///
    /// Skips over notifications dropped because this subscriber lagged.
    /// Returns `None` once the sink is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("subscriber lagged, skipped {skipped} notifications");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next already-queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Filter for specific notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    /// Accepted kinds; `None` accepts all.
    pub kinds: Option<Vec<NotificationKind>>,
    /// Required correlation id.
    pub correlation_id: Option<u32>,
}

impl NotificationFilter {
    /// Creates a filter for specific kinds.
    #[must_use]
    pub const fn kinds(kinds: Vec<NotificationKind>) -> Self {
        Self {
            kinds: Some(kinds),
            correlation_id: None,
        }
    }

    /// Creates a filter for the ack of one packet.
    #[must_use]
    pub fn ack(packet_id: u32) -> Self {
        Self {
            kinds: Some(vec![NotificationKind::Ack]),
            correlation_id: Some(packet_id),
        }
    }

    /// Creates a filter for the response to one traceroute request.
    #[must_use]
    pub fn traceroute(request_id: u32) -> Self {
        Self {
            kinds: Some(vec![NotificationKind::Traceroute]),
            correlation_id: Some(request_id),
        }
    }

    /// Checks if a notification matches this filter.
    #[must_use]
    pub fn matches(&self, notification: &Notification) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&notification.kind()) {
                return false;
            }
        }
        if let Some(expected) = self.correlation_id {
            if notification.correlation_id() != Some(expected) {
                return false;
            }
        }
        true
    }
}

/// Fans notifications out to subscribers.
#[derive(Clone)]
pub struct NotificationSink {
    sender: Arc<broadcast::Sender<Notification>>,
}

impl NotificationSink {
    /// Creates a sink buffering up to `capacity` notifications per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publishes a notification to all current subscribers.
    pub fn publish(&self, notification: Notification) {
        tracing::trace!("publishing {:?}", notification.kind());
        // No receivers is fine
        let _ = self.sender.send(notification);
    }

    /// Subscribes to all notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Waits for a notification matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the sink is closed.
    pub async fn wait_for(
        &self,
        filter: NotificationFilter,
        timeout: Duration,
    ) -> Option<Notification> {
        let mut subscription = self.subscribe();

        tokio::select! {
            biased;
            result = async {
                while let Some(notification) = subscription.recv().await {
                    if filter.matches(&notification) {
                        return Some(notification);
                    }
                }
                None
            } => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AckStatus;

    fn ack(packet_id: u32) -> Notification {
        Notification::Ack(AckNotice {
            packet_id,
            status: AckStatus::Ack,
            error: None,
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let sink = NotificationSink::new(16);
        let mut sub = sink.subscribe();

        sink.publish(Notification::ConnectionStatus(ConnectionStatus::reconnecting()));

        let notification = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap();
        assert!(matches!(
            notification,
            Some(Notification::ConnectionStatus(ConnectionStatus {
                reconnecting: Some(true),
                ..
            }))
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let sink = NotificationSink::new(4);
        assert_eq!(sink.subscriber_count(), 0);
        sink.publish(ack(1));
    }

    #[test]
    fn test_filter_by_kind() {
        let filter = NotificationFilter::kinds(vec![NotificationKind::Ack]);
        assert!(filter.matches(&ack(1)));
        assert!(!filter.matches(&Notification::ConnectionStatus(
            ConnectionStatus::reconnecting()
        )));
    }

    #[test]
    fn test_ack_filter() {
        let filter = NotificationFilter::ack(12345);
        assert!(filter.matches(&ack(12345)));
        assert!(!filter.matches(&ack(99999)));
    }

    #[test]
    fn test_traceroute_filter() {
        let filter = NotificationFilter::traceroute(8);
        let trace = Notification::Traceroute(TracerouteExchange {
            request_id: Some(8),
            ..TracerouteExchange::default()
        });
        assert!(filter.matches(&trace));
        assert!(!filter.matches(&ack(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let sink = NotificationSink::new(4);
        let result = sink
            .wait_for(NotificationFilter::ack(1), Duration::from_secs(5))
            .await;
        assert!(result.is_none());
    }

    #[test]
    fn test_json_envelope() {
        let json: serde_json::Value = serde_json::from_str(&ack(3).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["data"]["packetId"], 3);

        let node = Notification::NodeUpdate(Box::new(NodeRecord {
            id: Some("!00000001".into()),
            num: Some(1),
            is_favorite: true,
            ..NodeRecord::default()
        }));
        let json: serde_json::Value = serde_json::from_str(&node.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "node_update");
        assert_eq!(json["data"]["isFavorite"], true);
        assert_eq!(json["data"]["lastHeard"], serde_json::Value::Null);
    }
}
