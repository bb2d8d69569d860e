// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel for dashboard events.
//!
//! [`EventBus`] fans every [`PurchaseEvent`] out to all current subscribers
//! over a `tokio::sync::broadcast` channel. Publishing is fire-and-forget:
//! with no subscriber the event is dropped, and a subscriber that falls
//! behind loses the oldest events rather than blocking publishers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use raffle_core::{EventSink, PurchaseEvent};

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// A published event with a unique delivery id.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: PurchaseEvent,
}

/// Broadcast bus implementing [`EventSink`].
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: PurchaseEvent) {
        let kind = event.kind;
        let record_id = event.record.id.clone();
        let envelope = Envelope {
            id: Uuid::new_v4(),
            event,
        };
        match self.tx.send(envelope) {
            Ok(receivers) => debug!(event = %kind, record_id = %record_id, receivers, "event published"),
            Err(_) => trace!(event = %kind, record_id = %record_id, "event dropped, no subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use raffle_core::types::{PurchaseDetails, RaffleInfo};
    use raffle_core::{EventKind, PurchaseRecord, UserId};

    fn record() -> PurchaseRecord {
        let raffle = RaffleInfo {
            id: 1,
            name: "Sticker Rueda y Gana".into(),
            icon: None,
        };
        let details = PurchaseDetails {
            item_count: 2,
            total_amount: 2000,
            items: Vec::new(),
            error: None,
        };
        PurchaseRecord::new_pending(UserId::new("3001234567"), "Ana", &raffle, &details, Utc::now())
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(PurchaseEvent::new(EventKind::NewPurchase, record()));

        let a = rx1.recv().await.unwrap();
        let b = rx2.recv().await.unwrap();
        assert_eq!(a.event.kind, EventKind::NewPurchase);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(4);
        bus.publish(PurchaseEvent::new(EventKind::PurchaseUpdated, record()));
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..3 {
            bus.publish(PurchaseEvent::new(EventKind::ReceiptReceived, record()));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn envelope_flattens_event_fields() {
        let envelope = Envelope {
            id: Uuid::nil(),
            event: PurchaseEvent::new(EventKind::PurchaseApproved, record())
                .with_detail("approved by admin"),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["kind"], "purchase_approved");
        assert_eq!(json["detail"], "approved by admin");
        assert_eq!(json["record"]["status"], "pending");
    }
}
