//! Routing of session callbacks to notifications and store writes.
//!
//! Runs on the transport's callback threads. Every handler computes its
//! notification synchronously, publishes it, and hands any store write to
//! the [`Bridge`]; nothing here blocks on the consumer runtime.

use std::sync::Arc;

use serde_json::Value;

use crate::bridge::Bridge;
use crate::event::{Notification, NotificationSink};
use crate::nodes::NodeDirectory;
use crate::protocol::{
    InboundPacket, PortType, parse_position, parse_routing, parse_telemetry, parse_text,
    parse_traceroute,
};
use crate::store::MessageStore;

/// Characters of an inbound message body written to the info log.
const LOG_PREVIEW_CHARS: usize = 20;

/// Classifies inbound packets and node updates.
#[derive(Clone)]
pub struct Dispatcher {
    sink: NotificationSink,
    store: Arc<dyn MessageStore>,
    bridge: Bridge,
    directory: Arc<NodeDirectory>,
}

impl Dispatcher {
    /// Creates a dispatcher publishing to `sink` and persisting to `store`.
    #[must_use]
    pub fn new(
        sink: NotificationSink,
        store: Arc<dyn MessageStore>,
        bridge: Bridge,
        directory: Arc<NodeDirectory>,
    ) -> Self {
        Self {
            sink,
            store,
            bridge,
            directory,
        }
    }

    /// Handles one decoded packet. Packets on unhandled ports are dropped.
    pub fn dispatch_packet(&self, raw: &Value) {
        let packet = InboundPacket::from_value(raw);
        tracing::trace!("packet {:?} on {:?}", packet.id, packet.port);

        match packet.port {
            PortType::Routing => self.on_routing(&packet),
            PortType::Traceroute => {
                let exchange = parse_traceroute(&packet);
                tracing::debug!(
                    "traceroute response for {:?}: {} hops",
                    exchange.request_id,
                    exchange.route.len()
                );
                self.sink.publish(Notification::Traceroute(exchange));
            }
            PortType::Text => self.on_text(&packet),
            PortType::Position => self
                .sink
                .publish(Notification::Position(parse_position(&packet))),
            PortType::Telemetry => self
                .sink
                .publish(Notification::Telemetry(parse_telemetry(&packet))),
            PortType::Other => {}
        }
    }

    /// Handles a peer table update.
    pub fn dispatch_node(&self, node: &Value) {
        let record = self.directory.normalize(node);
        self.sink.publish(Notification::NodeUpdate(Box::new(record)));
    }

    fn on_routing(&self, packet: &InboundPacket) {
        let Some(notice) = parse_routing(packet) else {
            return;
        };
        tracing::debug!("ack for {}: {}", notice.packet_id, notice.status);

        let store = Arc::clone(&self.store);
        let (packet_id, status) = (notice.packet_id, notice.status);
        self.bridge.spawn("ack status update", async move {
            store.update_ack(packet_id, status).await.map(|_| ())
        });

        self.sink.publish(Notification::Ack(notice));
    }

    fn on_text(&self, packet: &InboundPacket) {
        let message = parse_text(packet);
        tracing::info!(
            "message from {} on channel {}: {}",
            message.sender,
            message.channel,
            preview(&message.text)
        );

        let store = Arc::clone(&self.store);
        let record = message.to_record();
        self.bridge.spawn("incoming message save", async move {
            store.append(record).await.map(|_| ())
        });

        self.sink.publish(Notification::Message(message));
    }
}

/// Leading characters of a message body, for logging.
fn preview(text: &str) -> &str {
    text.char_indices()
        .nth(LOG_PREVIEW_CHARS)
        .map_or(text, |(end, _)| &text[..end])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::event::Subscription;
    use crate::store::{MemoryStore, MessageFilter};
    use crate::types::{AckStatus, NewMessage};

    struct Fixture {
        dispatcher: Dispatcher,
        store: Arc<MemoryStore>,
        bridge: Bridge,
        sub: Subscription,
    }

    fn fixture() -> Fixture {
        let sink = NotificationSink::new(16);
        let store = Arc::new(MemoryStore::new());
        let bridge = Bridge::current().unwrap();
        let sub = sink.subscribe();
        let dispatcher = Dispatcher::new(
            sink,
            Arc::clone(&store) as Arc<dyn MessageStore>,
            bridge.clone(),
            Arc::new(NodeDirectory::new()),
        );
        Fixture {
            dispatcher,
            store,
            bridge,
            sub,
        }
    }

    async fn settle(bridge: &Bridge) {
        for _ in 0..100 {
            if bridge.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_unknown_port_is_dropped() {
        let mut f = fixture();
        f.dispatcher.dispatch_packet(&json!({
            "id": 1,
            "decoded": {"portnum": "ADMIN_APP", "payload": "00"}
        }));
        f.dispatcher.dispatch_packet(&json!({"id": 2}));

        assert!(f.sub.try_recv().is_none());
        assert_eq!(f.bridge.in_flight(), 0);
        assert!(f.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_routing_updates_store_and_notifies() {
        let mut f = fixture();
        f.store
            .append(NewMessage {
                packet_id: Some(55),
                sender: "!000000aa".into(),
                receiver: Some("!000000bb".into()),
                channel: 0,
                text: "ping".into(),
                is_outgoing: true,
                ack_status: AckStatus::Pending,
                reply_id: None,
            })
            .await
            .unwrap();

        f.dispatcher.dispatch_packet(&json!({
            "decoded": {
                "portnum": "ROUTING_APP",
                "requestId": 55,
                "routing": {"errorReason": "NO_ROUTE"}
            }
        }));

        match f.sub.try_recv() {
            Some(Notification::Ack(notice)) => {
                assert_eq!(notice.packet_id, 55);
                assert_eq!(notice.status, AckStatus::Nak);
                assert_eq!(notice.error.as_deref(), Some("NO_ROUTE"));
            }
            other => panic!("expected ack, got {other:?}"),
        }

        settle(&f.bridge).await;
        assert_eq!(f.store.messages()[0].ack_status, AckStatus::Nak);
    }

    #[tokio::test]
    async fn test_routing_without_request_id_is_ignored() {
        let mut f = fixture();
        f.dispatcher.dispatch_packet(&json!({
            "decoded": {"portnum": "ROUTING_APP", "routing": {}}
        }));
        assert!(f.sub.try_recv().is_none());
        assert_eq!(f.bridge.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_traceroute_filters_placeholder_hops() {
        let mut f = fixture();
        f.dispatcher.dispatch_packet(&json!({
            "from": 16,
            "decoded": {
                "portnum": "TRACEROUTE_APP",
                "requestId": 9,
                "traceroute": {
                    "route": [5, 4_294_967_295_u64, 0, 9],
                    "routeBack": [0],
                    "snrTowards": [10.0, 4.5]
                }
            }
        }));

        match f.sub.try_recv() {
            Some(Notification::Traceroute(exchange)) => {
                assert_eq!(exchange.request_id, Some(9));
                assert_eq!(exchange.route, vec![5, 9]);
                assert!(exchange.route_back.is_empty());
                assert_eq!(exchange.snr_towards, vec![10.0, 4.5]);
            }
            other => panic!("expected traceroute, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_is_persisted_and_notified() {
        let mut f = fixture();
        f.dispatcher.dispatch_packet(&json!({
            "id": 77,
            "fromId": "!000000bb",
            "toId": "^all",
            "channel": 1,
            "rxTime": 1_700_000_000,
            "decoded": {"portnum": "TEXT_MESSAGE_APP", "text": "hello", "replyId": 12}
        }));

        match f.sub.try_recv() {
            Some(Notification::Message(message)) => {
                assert_eq!(message.packet_id, Some(77));
                assert_eq!(message.receiver.as_deref(), Some("^all"));
                assert_eq!(message.reply_id, Some(12));
            }
            other => panic!("expected message, got {other:?}"),
        }

        settle(&f.bridge).await;
        let stored = f.store.query(MessageFilter::Channel(1), 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "hello");
        assert_eq!(stored[0].receiver, None);
        assert_eq!(stored[0].ack_status, AckStatus::Received);
        assert!(!stored[0].is_outgoing);
    }

    #[tokio::test]
    async fn test_position_and_telemetry_are_not_stored() {
        let mut f = fixture();
        f.dispatcher.dispatch_packet(&json!({
            "fromId": "!000000bb",
            "decoded": {"portnum": "POSITION_APP", "position": {"latitudeI": 521_000_000, "longitudeI": 43_000_000}}
        }));
        f.dispatcher.dispatch_packet(&json!({
            "fromId": "!000000bb",
            "decoded": {"portnum": 67, "telemetry": {"deviceMetrics": {"batteryLevel": 80}}}
        }));

        assert!(matches!(f.sub.try_recv(), Some(Notification::Position(_))));
        assert!(matches!(f.sub.try_recv(), Some(Notification::Telemetry(_))));
        assert_eq!(f.bridge.in_flight(), 0);
        assert!(f.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_node_update() {
        let mut f = fixture();
        f.dispatcher.dispatch_node(&json!({
            "num": 187,
            "user": {"id": "!000000bb", "longName": "Relay"},
            "is_favorite": true
        }));

        match f.sub.try_recv() {
            Some(Notification::NodeUpdate(record)) => {
                assert_eq!(record.id.as_deref(), Some("!000000bb"));
                assert!(record.is_favorite);
            }
            other => panic!("expected node update, got {other:?}"),
        }
    }

    #[test]
    fn test_log_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview("exactly twenty chars"), "exactly twenty chars");
        assert_eq!(
            preview("this body is longer than the preview"),
            "this body is longer "
        );
        let umlauts = "ä".repeat(30);
        assert_eq!(preview(&umlauts).chars().count(), LOG_PREVIEW_CHARS);
    }
}
