use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted after a write commits. Consumers must never be able to fail
/// the write itself; sends happen post-commit and failures are only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductArchived(Uuid),

    // Stock ledger events
    StockMovementRecorded {
        product_id: Uuid,
        movement_id: Uuid,
        qty: i32,
    },

    // Sale events
    TransactionCreated {
        transaction_id: Uuid,
        total: Decimal,
    },

    // Open order events
    OpenOrderCreated(Uuid),
    OpenOrderSent {
        open_order_id: Uuid,
        transaction_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
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
}

/// Creates an event channel with the given capacity
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Runs until all senders drop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::TransactionCreated {
                transaction_id,
                total,
            } => {
                info!(transaction_id = %transaction_id, %total, "Transaction recorded");
            }
            Event::OpenOrderSent {
                open_order_id,
                transaction_id,
            } => {
                info!(open_order_id = %open_order_id, transaction_id = %transaction_id, "Open order checked out");
            }
            other => {
                debug!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_sender_delivers() {
        let (tx, mut rx) = event_channel(8);
        tx.send(Event::ProductCreated(Uuid::new_v4())).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::ProductCreated(_)));
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (tx, rx) = event_channel(1);
        drop(rx);
        assert!(tx.send(Event::ProductUpdated(Uuid::new_v4())).await.is_err());
    }
}
