use std::collections::HashMap;

use handoff_core::{AlertEvent, AlertType};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::warn;

/// Per-type plus wildcard `all` subscriber registry for alert events.
/// Delivery is best-effort through a bounded per-subscriber buffer;
/// a full buffer drops the event and logs rather than blocking the
/// monitor's tick (spec.md §4.D, §5 "bounded-buffer publish-subscribe").
pub struct SubscriberRegistry {
    buffer_size: usize,
    by_type: RwLock<HashMap<AlertType, Vec<mpsc::Sender<AlertEvent>>>>,
    wildcard: RwLock<Vec<mpsc::Sender<AlertEvent>>>,
}

impl SubscriberRegistry {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            by_type: RwLock::new(HashMap::new()),
            wildcard: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to events of a single `alert_type`, returning the
    /// receiving half of the bounded channel.
    pub fn subscribe(&self, alert_type: AlertType) -> mpsc::Receiver<AlertEvent> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        self.by_type.write().entry(alert_type).or_default().push(tx);
        rx
    }

    /// Subscribes to every alert event regardless of type.
    pub fn subscribe_all(&self) -> mpsc::Receiver<AlertEvent> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        self.wildcard.write().push(tx);
        rx
    }

    /// Best-effort fan-out: never awaits, never blocks the caller.
    pub fn publish(&self, event: AlertEvent) {
        let by_type = self.by_type.read();
        if let Some(subscribers) = by_type.get(&event.alert_type) {
            for sub in subscribers {
                if sub.try_send(event.clone()).is_err() {
                    warn!(rule = %event.rule_name, "dropping alert event: subscriber buffer full or closed");
                }
            }
        }
        drop(by_type);

        let wildcard = self.wildcard.read();
        for sub in wildcard.iter() {
            if sub.try_send(event.clone()).is_err() {
                warn!(rule = %event.rule_name, "dropping alert event: wildcard subscriber buffer full or closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use handoff_core::Severity;

    fn event() -> AlertEvent {
        AlertEvent {
            rule_name: "depth".into(),
            alert_type: AlertType::QueueDepth,
            severity: Severity::Warning,
            value: 80.0,
            threshold: 50.0,
            fired_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn typed_subscriber_receives_matching_events() {
        let registry = SubscriberRegistry::new(4);
        let mut rx = registry.subscribe(AlertType::QueueDepth);
        registry.publish(event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.rule_name, "depth");
    }

    #[tokio::test]
    async fn wildcard_subscriber_receives_every_type() {
        let registry = SubscriberRegistry::new(4);
        let mut rx = registry.subscribe_all();
        registry.publish(event());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let registry = SubscriberRegistry::new(1);
        let _rx = registry.subscribe(AlertType::QueueDepth);
        registry.publish(event());
        // Buffer is now full (capacity 1, nothing received yet); this
        // publish must not block, it should just drop.
        registry.publish(event());
    }
}
