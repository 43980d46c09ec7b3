//! Order status graph.
//!
//! Every mutation the engine performs is planned against this module first; the store only
//! ever sees a [`Mutation`] whose precondition pins the status the plan was computed from.

use rust_decimal::Decimal;

use super::domain::{Order, OrderStatus, PaymentStatus, ProviderId};

impl OrderStatus {
    /// Statuses reachable in one step. Terminal statuses only ever lead to `Refunded`
    /// (from `Cancelled`).
    pub const fn successors(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Created => &[
                OrderStatus::PaymentPending,
                OrderStatus::PaymentCompleted,
                OrderStatus::Cancelled,
            ],
            OrderStatus::PaymentPending => {
                &[OrderStatus::PaymentCompleted, OrderStatus::Cancelled]
            }
            OrderStatus::PaymentCompleted => &[OrderStatus::Processing, OrderStatus::Cancelled],
            OrderStatus::Processing => &[OrderStatus::Completed, OrderStatus::Cancelled],
            OrderStatus::Cancelled => &[OrderStatus::Refunded],
            OrderStatus::Completed | OrderStatus::Refunded => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move order from {current} to {requested}")]
pub struct InvalidTransition {
    pub current: OrderStatus,
    pub requested: OrderStatus,
}

/// Checks a requested status change against the graph, including the refund precondition.
pub fn ensure_transition(order: &Order, requested: OrderStatus) -> Result<(), InvalidTransition> {
    let rejected = InvalidTransition {
        current: order.status,
        requested,
    };

    if !order.status.can_transition_to(requested) {
        return Err(rejected);
    }

    if requested == OrderStatus::Refunded && order.payment_status != PaymentStatus::Success {
        return Err(rejected);
    }

    Ok(())
}

/// Compare-and-set guard evaluated by the store under its write lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub status: OrderStatus,
    pub provider_unassigned: bool,
}

impl Precondition {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status,
            provider_unassigned: false,
        }
    }

    /// `provider_id IS NULL AND status = <status>`
    pub fn unclaimed(status: OrderStatus) -> Self {
        Self {
            status,
            provider_unassigned: true,
        }
    }

    pub fn holds_for(&self, order: &Order) -> bool {
        order.status == self.status && (!self.provider_unassigned || order.provider_id.is_none())
    }
}

/// Field updates applied atomically with `updated_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChange {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub provider_id: Option<ProviderId>,
    /// Releases the assignment; wins over `provider_id`.
    pub clear_provider: bool,
    pub final_price: Option<Decimal>,
}

impl OrderChange {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_payment(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    pub fn with_provider(mut self, provider_id: ProviderId) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    pub fn releasing_provider(mut self) -> Self {
        self.provider_id = None;
        self.clear_provider = true;
        self
    }

    pub fn price(final_price: Decimal) -> Self {
        Self {
            final_price: Some(final_price),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(payment_status) = self.payment_status {
            order.payment_status = payment_status;
        }
        if self.clear_provider {
            order.provider_id = None;
        } else if let Some(provider_id) = &self.provider_id {
            order.provider_id = Some(provider_id.clone());
        }
        if let Some(final_price) = self.final_price {
            order.final_price = Some(final_price);
        }
    }
}

/// A planned write: the guard it was computed under plus the fields to change.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub expect: Precondition,
    pub change: OrderChange,
}

impl Mutation {
    /// Plain status move, guarded on the status the plan was computed from.
    pub fn advance(order: &Order, change: OrderChange) -> Self {
        Self {
            expect: Precondition::status(order.status),
            change,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{CustomerId, OrderId, ServiceId};
    use chrono::Utc;

    fn order(status: OrderStatus, payment_status: PaymentStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::from("ord-1"),
            service_id: ServiceId::from("svc-1"),
            customer_id: CustomerId::from("cus-1"),
            provider_id: None,
            status,
            payment_status,
            final_price: None,
            remarks_by_user: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn terminal_statuses_only_allow_refund_after_cancel() {
        for status in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for next in OrderStatus::ALL {
                let allowed = status == OrderStatus::Cancelled && next == OrderStatus::Refunded;
                assert_eq!(status.can_transition_to(next), allowed, "{status} -> {next}");
            }
        }
    }

    #[test]
    fn processing_requires_payment_completed() {
        for status in OrderStatus::ALL {
            let allowed = status == OrderStatus::PaymentCompleted;
            assert_eq!(status.can_transition_to(OrderStatus::Processing), allowed);
        }
    }

    #[test]
    fn created_cannot_jump_to_completed() {
        let err = ensure_transition(
            &order(OrderStatus::Created, PaymentStatus::Pending),
            OrderStatus::Completed,
        )
        .expect_err("skip rejected");
        assert_eq!(err.current, OrderStatus::Created);
        assert_eq!(err.requested, OrderStatus::Completed);
    }

    #[test]
    fn refund_requires_successful_payment() {
        let unpaid = order(OrderStatus::Cancelled, PaymentStatus::Pending);
        assert!(ensure_transition(&unpaid, OrderStatus::Refunded).is_err());

        let paid = order(OrderStatus::Cancelled, PaymentStatus::Success);
        assert!(ensure_transition(&paid, OrderStatus::Refunded).is_ok());
    }

    #[test]
    fn unclaimed_precondition_checks_provider() {
        let mut listed = order(OrderStatus::PaymentCompleted, PaymentStatus::Success);
        let guard = Precondition::unclaimed(OrderStatus::PaymentCompleted);
        assert!(guard.holds_for(&listed));

        listed.provider_id = Some(ProviderId::from("prv-1"));
        assert!(!guard.holds_for(&listed));
        assert!(Precondition::status(OrderStatus::PaymentCompleted).holds_for(&listed));
    }

    #[test]
    fn change_only_touches_populated_fields() {
        let mut target = order(OrderStatus::PaymentCompleted, PaymentStatus::Success);
        OrderChange::status(OrderStatus::Processing)
            .with_provider(ProviderId::from("prv-9"))
            .apply_to(&mut target);

        assert_eq!(target.status, OrderStatus::Processing);
        assert_eq!(target.payment_status, PaymentStatus::Success);
        assert_eq!(target.provider_id, Some(ProviderId::from("prv-9")));
        assert_eq!(target.final_price, None);
    }

    #[test]
    fn releasing_provider_clears_assignment() {
        let mut target = order(OrderStatus::Processing, PaymentStatus::Success);
        target.provider_id = Some(ProviderId::from("prv-9"));
        OrderChange::status(OrderStatus::Cancelled)
            .releasing_provider()
            .apply_to(&mut target);

        assert_eq!(target.status, OrderStatus::Cancelled);
        assert_eq!(target.provider_id, None);
    }
}
