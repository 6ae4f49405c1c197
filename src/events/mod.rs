use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle used by services to publish events after a transaction
/// commits. Delivery failure is reported to the caller as a plain
/// string so it can be logged without rolling back the ledger write.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a connected sender/receiver pair with the given buffer.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

// Events emitted by the inventory core after committed state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockReserved {
        reservation_id: Uuid,
        organization_id: String,
        product_id: String,
        quantity: i32,
        task_id: String,
    },
    ReservationFulfilled {
        reservation_id: Uuid,
        quantity: i32,
        fully_fulfilled: bool,
    },
    ReservationCancelled {
        reservation_id: Uuid,
        released_quantity: i32,
    },
    ReservationExpired {
        reservation_id: Uuid,
        released_quantity: i32,
    },
    StockTransferred {
        movement_id: Uuid,
        organization_id: String,
        movement_type: String,
        product_id: String,
        quantity: i32,
    },
    MachineSaleRecorded {
        organization_id: String,
        machine_id: String,
        product_id: String,
        quantity: i32,
        remaining_quantity: i32,
    },
    /// A sale drove a machine balance negative; alert, not error.
    NegativeStockDetected {
        organization_id: String,
        machine_id: String,
        product_id: String,
        current_quantity: i32,
    },
    AdjustmentPosted {
        adjustment_id: Uuid,
        organization_id: String,
        product_id: String,
        difference: i32,
        applied: bool,
    },
    CountCompleted {
        count_id: Uuid,
        organization_id: String,
        adjustments_posted: usize,
        completed_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_the_channel() {
        let (sender, mut rx) = channel(4);
        sender
            .send(Event::ReservationExpired {
                reservation_id: Uuid::new_v4(),
                released_quantity: 5,
            })
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            Event::ReservationExpired {
                released_quantity, ..
            } => assert_eq!(released_quantity, 5),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        let err = sender
            .send(Event::NegativeStockDetected {
                organization_id: "org".into(),
                machine_id: "vm".into(),
                product_id: "p".into(),
                current_quantity: -1,
            })
            .await
            .unwrap_err();
        assert!(err.contains("Failed to send event"));
    }
}
