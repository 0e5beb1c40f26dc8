use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Handle for publishing domain events onto the in-process channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Best-effort send: event delivery must never fail a caller's request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Failed to publish event: {}", e);
        }
    }
}

/// Domain events emitted by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCompleted(Uuid),
    OrderCancelled(Uuid),

    // Payment events
    PaymentProofUploaded(Uuid),
    PaymentVerified(Uuid),
    PaymentRejected(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductArchived(Uuid),

    // Cart/wishlist events
    CartMerged {
        user_id: Uuid,
        merged_items: usize,
    },
    WishlistMerged {
        user_id: Uuid,
        merged_items: usize,
    },

    // Account events
    UserRegistered(Uuid),
    UserRoleChanged {
        user_id: Uuid,
        new_role: String,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

/// Consume events from the channel. The current consumer only traces them;
/// notification fan-out would hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    %order_id,
                    %old_status,
                    %new_status,
                    "order status changed"
                );
            }
            Event::PaymentVerified(order_id) => {
                info!(%order_id, "payment verified");
            }
            Event::PaymentRejected(order_id) => {
                info!(%order_id, "payment rejected");
            }
            other => {
                info!(event = ?other, "event received");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or error out.
        sender.send_or_log(Event::OrderCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: OrderStatus::AwaitingPayment,
                new_status: OrderStatus::ReadyForPickup,
            })
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Event::OrderStatusChanged {
                order_id: got,
                new_status,
                ..
            } => {
                assert_eq!(got, order_id);
                assert_eq!(new_status, OrderStatus::ReadyForPickup);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
