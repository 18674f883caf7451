//! Domain events emitted by the reservation engine.
//!
//! Events are emitted after the owning transaction commits, so consumers
//! only ever observe state that is durable. Delivery is best-effort; the
//! ledger and journal remain the source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Events describing reservation-engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockReserved {
        order_ref: String,
        sku: String,
        quantity: i32,
        expires_at: DateTime<Utc>,
    },
    ReservationCommitted {
        order_ref: String,
        sku: String,
        quantity: i32,
    },
    ReservationReleased {
        order_ref: String,
        sku: String,
        quantity: i32,
    },
    ReservationExpired {
        holder_ref: String,
        sku: String,
        quantity: i32,
    },
    CartStockReserved {
        cart_ref: String,
        sku: String,
        quantity: i32,
    },
    CartStockReleased {
        cart_ref: String,
        sku: String,
        quantity: i32,
    },
    InventoryAdjusted {
        sku: String,
        old_total: i32,
        new_total: i32,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is
    /// closed. Used after a transaction has already committed, where the
    /// mutation must not be reported as failed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropping event {:?}: {}", event, e);
        }
    }
}

/// Consumes events from the channel and logs them. Kept as a separate task
/// so emitters never block on downstream consumers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockReserved {
                order_ref,
                sku,
                quantity,
                expires_at,
            } => {
                info!(
                    order_ref = %order_ref,
                    sku = %sku,
                    quantity = quantity,
                    expires_at = %expires_at,
                    "Stock reserved"
                );
            }
            Event::ReservationCommitted {
                order_ref,
                sku,
                quantity,
            } => {
                info!(order_ref = %order_ref, sku = %sku, quantity = quantity, "Reservation committed");
            }
            Event::ReservationReleased {
                order_ref,
                sku,
                quantity,
            } => {
                info!(order_ref = %order_ref, sku = %sku, quantity = quantity, "Reservation released");
            }
            Event::ReservationExpired {
                holder_ref,
                sku,
                quantity,
            } => {
                info!(holder_ref = %holder_ref, sku = %sku, quantity = quantity, "Reservation expired");
            }
            Event::CartStockReserved {
                cart_ref,
                sku,
                quantity,
            } => {
                info!(cart_ref = %cart_ref, sku = %sku, quantity = quantity, "Cart stock reserved");
            }
            Event::CartStockReleased {
                cart_ref,
                sku,
                quantity,
            } => {
                info!(cart_ref = %cart_ref, sku = %sku, quantity = quantity, "Cart stock released");
            }
            Event::InventoryAdjusted {
                sku,
                old_total,
                new_total,
                reason,
            } => {
                info!(
                    sku = %sku,
                    old_total = old_total,
                    new_total = new_total,
                    reason = %reason,
                    "Inventory adjusted"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::ReservationCommitted {
                order_ref: "ORD-1".to_string(),
                sku: "A".to_string(),
                quantity: 2,
            })
            .await
            .unwrap();

        match rx.recv().await {
            Some(Event::ReservationCommitted { order_ref, .. }) => {
                assert_eq!(order_ref, "ORD-1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out.
        sender
            .send_or_log(Event::ReservationReleased {
                order_ref: "ORD-2".to_string(),
                sku: "B".to_string(),
                quantity: 1,
            })
            .await;
    }
}
