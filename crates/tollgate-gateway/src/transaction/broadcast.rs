//! Typed fan-out of transaction events to observers.

use super::types::HttpTransaction;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum GatewayEvent {
    RequestRecorded(HttpTransaction),
    ResponseRecorded(HttpTransaction),
    /// The upstream call failed; the transaction carries the problem-details body.
    ResponseFailed(HttpTransaction),
    StaticMockReloaded { definitions: usize },
}

impl GatewayEvent {
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            GatewayEvent::RequestRecorded(t)
            | GatewayEvent::ResponseRecorded(t)
            | GatewayEvent::ResponseFailed(t) => Some(&t.id),
            GatewayEvent::StaticMockReloaded { .. } => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::RequestRecorded(_) => "request_recorded",
            GatewayEvent::ResponseRecorded(_) => "response_recorded",
            GatewayEvent::ResponseFailed(_) => "response_failed",
            GatewayEvent::StaticMockReloaded { .. } => "static_mock_reloaded",
        }
    }
}

/// Publishing never blocks and never fails; events without subscribers are dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<GatewayEvent>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: GatewayEvent) {
        let kind = event.kind();
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(kind, delivered, "Event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Log every event at debug level until the channel closes.
    pub fn spawn_event_log(&self) -> JoinHandle<()> {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => debug!(
                        kind = event.kind(),
                        id = event.transaction_id().unwrap_or("-"),
                        "Transaction event"
                    ),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let b = Broadcaster::default();
        b.publish(GatewayEvent::StaticMockReloaded { definitions: 3 });
        assert_eq!(b.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let b = Broadcaster::new(8);
        let mut rx = b.subscribe();
        let txn = HttpTransaction {
            id: "x".to_string(),
            ..Default::default()
        };
        b.publish(GatewayEvent::ResponseFailed(txn));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, GatewayEvent::ResponseFailed(_)));
        assert_eq!(event.transaction_id(), Some("x"));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(GatewayEvent::StaticMockReloaded { definitions: 2 }).unwrap();
        assert_eq!(json["event"], "staticMockReloaded");
        assert_eq!(json["payload"]["definitions"], 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_event_log_reports_published_events() {
        let b = Broadcaster::new(8);
        let log = b.spawn_event_log();
        assert_eq!(b.subscriber_count(), 1);

        b.publish(GatewayEvent::ResponseRecorded(HttpTransaction {
            id: "txn-9".to_string(),
            ..Default::default()
        }));
        for _ in 0..50 {
            if logs_contain("txn-9") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(logs_contain("response_recorded"));
        assert!(logs_contain("txn-9"));

        drop(b);
        tokio::time::timeout(Duration::from_secs(1), log)
            .await
            .unwrap()
            .unwrap();
    }
}
