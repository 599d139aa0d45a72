use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after successful commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(Uuid),
    RoleAssigned {
        user_id: Uuid,
        role: String,
    },

    CategoryCreated(i32),
    ProductCreated(i32),
    RecipeCreated(i32),
    CouponCreated(i32),
    CouponDeleted(i32),

    CartUpdated {
        user_id: Uuid,
    },
    CartCleared {
        user_id: Uuid,
    },

    OrderCreated(i32),
    OrderStatusChanged {
        order_id: i32,
        old_status: String,
        new_status: String,
    },
    PaymentSessionCreated {
        order_id: i32,
        session_id: String,
    },
    OrderRefunded(i32),
}

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

    /// Send an event, logging instead of propagating a channel failure.
    /// Event delivery must never fail a committed request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Consumer task draining the event channel. Currently logs each event;
/// a broker integration would hang off this loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(?event, "Processing event");
    }
    info!("Event channel closed; consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or return an error path to the caller
        sender.send_or_log(Event::OrderCreated(1)).await;
    }

    #[tokio::test]
    async fn events_reach_consumer() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);
        sender
            .send(Event::CartUpdated {
                user_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert!(matches!(rx.recv().await, Some(Event::CartUpdated { .. })));
    }
}
