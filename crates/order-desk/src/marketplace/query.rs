use serde::Serialize;

use super::domain::{CustomerId, Order, OrderStatus, ProviderId};

/// One conjunct of an order listing query. Stores translate each into a filter clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderPredicate {
    CustomerIs(CustomerId),
    ProviderIs(ProviderId),
    ProviderUnassigned,
    StatusIs(OrderStatus),
}

impl OrderPredicate {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            OrderPredicate::CustomerIs(customer_id) => &order.customer_id == customer_id,
            OrderPredicate::ProviderIs(provider_id) => {
                order.provider_id.as_ref() == Some(provider_id)
            }
            OrderPredicate::ProviderUnassigned => order.provider_id.is_none(),
            OrderPredicate::StatusIs(status) => order.status == *status,
        }
    }
}

/// Conjunction of predicates; an empty query matches every order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    predicates: Vec<OrderPredicate>,
}

impl OrderQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: OrderPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_status(self, status: Option<OrderStatus>) -> Self {
        match status {
            Some(status) => self.and(OrderPredicate::StatusIs(status)),
            None => self,
        }
    }

    pub fn predicates(&self) -> &[OrderPredicate] {
        &self.predicates
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(order))
    }
}

/// What part of the order set a resolved principal may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    /// A client's own orders.
    Customer(CustomerId),
    /// Work a partner has claimed.
    AssignedTo(ProviderId),
    /// Unclaimed, paid orders.
    Marketplace,
    Unrestricted,
}

/// The single place role branching turns into query predicates. The caller's optional status
/// filter stays in `base`, so it always intersects with the role predicate.
pub fn apply_role_filter(scope: &RoleScope, base: OrderQuery) -> OrderQuery {
    match scope {
        RoleScope::Customer(customer_id) => {
            base.and(OrderPredicate::CustomerIs(customer_id.clone()))
        }
        RoleScope::AssignedTo(provider_id) => {
            base.and(OrderPredicate::ProviderIs(provider_id.clone()))
        }
        RoleScope::Marketplace => base
            .and(OrderPredicate::ProviderUnassigned)
            .and(OrderPredicate::StatusIs(OrderStatus::PaymentCompleted)),
        RoleScope::Unrestricted => base,
    }
}

/// Validated pagination window (1-based page).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32, max_limit: u32) -> Result<Self, String> {
        if page == 0 {
            return Err("page must be at least 1".to_string());
        }
        if limit == 0 {
            return Err("limit must be greater than 0".to_string());
        }
        if limit > max_limit {
            return Err(format!("limit must not exceed {max_limit}"));
        }
        Ok(Self { page, limit })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }
}

/// One page of a listing plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u64,
}

impl OrderPage {
    pub fn new(orders: Vec<Order>, total: u64, request: PageRequest) -> Self {
        Self {
            orders,
            total,
            page: request.page,
            total_pages: total.div_ceil(request.limit as u64),
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }
}
