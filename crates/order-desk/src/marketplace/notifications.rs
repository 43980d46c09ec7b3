//! Post-commit order notifications.
//!
//! The engine only ever enqueues; delivery happens on a background worker so a slow or broken
//! mail transport cannot fail or stall the operation that triggered it. Delivery is at most
//! once: failed notices are logged and dropped.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Created,
    MarketplaceListed,
    Claimed,
    Completed,
    Cancelled,
    Refunded,
}

/// Who a notice is meant for; the dispatcher resolves actual addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Customer,
    VerifiedPartners,
}

impl OrderEventKind {
    pub const fn label(self) -> &'static str {
        match self {
            OrderEventKind::Created => "created",
            OrderEventKind::MarketplaceListed => "marketplace_listed",
            OrderEventKind::Claimed => "claimed",
            OrderEventKind::Completed => "completed",
            OrderEventKind::Cancelled => "cancelled",
            OrderEventKind::Refunded => "refunded",
        }
    }

    pub const fn audience(self) -> Audience {
        match self {
            OrderEventKind::MarketplaceListed => Audience::VerifiedPartners,
            _ => Audience::Customer,
        }
    }
}

/// Snapshot of a committed order plus the event that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderNotice {
    pub event: OrderEventKind,
    pub order: Order,
    pub service_name: String,
}

impl OrderNotice {
    pub fn subject(&self) -> String {
        let reference = self.order.short_reference();
        match self.event {
            OrderEventKind::Created => format!("Order Confirmed - {}", self.service_name),
            OrderEventKind::MarketplaceListed => {
                format!("New Job Available - {}", self.service_name)
            }
            OrderEventKind::Claimed => {
                format!("Order Update - Work in Progress - Order #{reference}")
            }
            OrderEventKind::Completed => format!("Order Completed! - Order #{reference}"),
            OrderEventKind::Cancelled => format!("Order Cancelled - Order #{reference}"),
            OrderEventKind::Refunded => format!("Order Status Update - Order #{reference}"),
        }
    }

    pub fn summary(&self) -> String {
        match self.event {
            OrderEventKind::Created => "Your order has been successfully placed.".to_string(),
            OrderEventKind::MarketplaceListed => {
                "A new job matching your expertise is now available.".to_string()
            }
            OrderEventKind::Claimed => {
                "A partner has started working on your order.".to_string()
            }
            OrderEventKind::Completed => "Your order has been completed successfully.".to_string(),
            OrderEventKind::Cancelled => "Your order has been cancelled.".to_string(),
            OrderEventKind::Refunded => format!(
                "Your order status has been updated to: {}",
                self.order.status
            ),
        }
    }
}

/// Outbound delivery hook (e-mail or similar).
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notice: &OrderNotice) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Non-blocking handle the engine uses to hand notices to the worker.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: Option<UnboundedSender<OrderNotice>>,
}

impl NotificationQueue {
    pub fn channel() -> (Self, UnboundedReceiver<OrderNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Queue that drops every notice.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn enqueue(&self, notice: OrderNotice) {
        let Some(sender) = &self.sender else {
            debug!(event = notice.event.label(), order_id = %notice.order.id, "notifications disabled");
            return;
        };

        if let Err(err) = sender.send(notice) {
            let notice = err.0;
            warn!(
                event = notice.event.label(),
                order_id = %notice.order.id,
                "notification worker stopped; dropping notice"
            );
        }
    }
}

/// Drains the queue on a blocking thread until every sender is gone.
pub fn spawn_dispatch_worker<D>(
    mut receiver: UnboundedReceiver<OrderNotice>,
    dispatcher: Arc<D>,
) -> JoinHandle<()>
where
    D: NotificationDispatcher + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || {
        while let Some(notice) = receiver.blocking_recv() {
            deliver(dispatcher.as_ref(), &notice);
        }
        debug!("notification queue closed");
    })
}

pub(crate) fn deliver<D>(dispatcher: &D, notice: &OrderNotice)
where
    D: NotificationDispatcher + ?Sized,
{
    match dispatcher.dispatch(notice) {
        Ok(()) => debug!(
            event = notice.event.label(),
            order_id = %notice.order.id,
            "notification dispatched"
        ),
        Err(err) => warn!(
            event = notice.event.label(),
            order_id = %notice.order.id,
            error = %err,
            "notification failed; dropping"
        ),
    }
}
