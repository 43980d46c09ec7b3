use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use super::domain::{
    CustomerId, NewOrder, Order, OrderId, OrderStatus, PaymentStatus, Principal, ProviderId,
    ServiceProvider, ServiceReceiver, ServiceRef, UserId,
};
use super::gate::VerificationGate;
use super::lifecycle::{ensure_transition, InvalidTransition, Mutation, OrderChange, Precondition};
use super::notifications::{NotificationQueue, OrderEventKind, OrderNotice};
use super::query::{apply_role_filter, OrderPage, OrderQuery, PageRequest, RoleScope};
use super::repository::{
    OrderRepository, ProfileDirectory, RepositoryError, ServiceCatalog, VerificationRegistry,
};
use crate::config::MarketplaceConfig;

const MAX_REMARKS_CHARS: usize = 2_000;

/// Input for [`OrderEngine::create_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub service: ServiceRef,
    pub remarks: Option<String>,
}

/// Filters for [`OrderEngine::list_orders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOrdersRequest {
    pub status: Option<OrderStatus>,
    pub page: u32,
    pub limit: u32,
    pub available_only: bool,
}

/// Caller after profile resolution.
enum Actor {
    Client(Option<CustomerId>),
    Partner(ServiceProvider),
    Admin,
}

/// Owns order creation, role-scoped reads, and every status transition.
pub struct OrderEngine<S> {
    store: Arc<S>,
    catalog: Arc<dyn ServiceCatalog>,
    gate: VerificationGate,
    notifications: NotificationQueue,
    limits: MarketplaceConfig,
}

impl<S> OrderEngine<S>
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    pub fn new(
        store: Arc<S>,
        catalog: Arc<dyn ServiceCatalog>,
        registry: Arc<dyn VerificationRegistry>,
        notifications: NotificationQueue,
        limits: MarketplaceConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            gate: VerificationGate::new(registry),
            notifications,
            limits,
        }
    }

    pub fn limits(&self) -> &MarketplaceConfig {
        &self.limits
    }

    /// Place an order for an active catalog service, creating the client profile on first use.
    pub fn create_order(
        &self,
        principal: &Principal,
        request: CreateOrderRequest,
    ) -> Result<Order, OrderError> {
        if !matches!(principal, Principal::Client { .. }) {
            return Err(OrderError::Forbidden(
                "only clients can place orders".to_string(),
            ));
        }

        let service_ref = normalize_service_ref(request.service)?;
        let remarks = normalize_remarks(request.remarks)?;

        let service = self
            .catalog
            .find_service(&service_ref)
            .map_err(|err| self.storage_failure(&format!("service lookup {service_ref}"), err))?
            .ok_or_else(|| OrderError::ServiceNotFound(service_ref.to_string()))?;
        if !service.is_active {
            return Err(OrderError::ServiceInactive(service.document_type));
        }

        let receiver = self.receiver_or_create(principal)?;
        let order = self
            .store
            .insert(
                NewOrder {
                    service_id: service.id.clone(),
                    customer_id: receiver.id.clone(),
                    remarks_by_user: remarks,
                },
                Utc::now(),
            )
            .map_err(|err| {
                self.storage_failure(&format!("insert order for customer {}", receiver.id), err)
            })?;

        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            service = %service.document_type,
            "order created"
        );
        self.notify(OrderEventKind::Created, &order, Some(service.document_type));
        Ok(order)
    }

    /// One page of the orders visible to `principal`.
    pub fn list_orders(
        &self,
        principal: &Principal,
        request: ListOrdersRequest,
    ) -> Result<OrderPage, OrderError> {
        let page = PageRequest::new(request.page, request.limit, self.limits.max_page_size)
            .map_err(OrderError::Validation)?;

        let Some(scope) = self.resolve_scope(principal, request.available_only)? else {
            return Ok(OrderPage::empty(page));
        };

        let query = apply_role_filter(&scope, OrderQuery::all().with_status(request.status));
        let (orders, total) = self
            .store
            .list(&query, page)
            .map_err(|err| self.storage_failure("list orders", err))?;

        Ok(OrderPage::new(orders, total, page))
    }

    /// Single order lookup. Orders outside the caller's view are reported as missing.
    pub fn get_order(&self, principal: &Principal, order_id: &OrderId) -> Result<Order, OrderError> {
        let order = self.load(order_id)?;
        let visible = match principal {
            Principal::Admin { .. } => true,
            Principal::Client { user_id, .. } => self
                .receiver(user_id)?
                .is_some_and(|receiver| receiver.id == order.customer_id),
            Principal::Partner { user_id } => match self.provider(user_id)? {
                Some(provider) => {
                    order.provider_id.as_ref() == Some(&provider.id)
                        || (order.is_listed() && self.marketplace_allowed(&provider.id)?)
                }
                None => false,
            },
        };

        if visible {
            Ok(order)
        } else {
            Err(OrderError::NotFound(order_id.clone()))
        }
    }

    /// Checkout started: CREATED -> PAYMENT_PENDING.
    pub fn mark_payment_pending(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        self.transition(order_id, |order| {
            ensure_transition(order, OrderStatus::PaymentPending)?;
            Ok(Mutation::advance(
                order,
                OrderChange::status(OrderStatus::PaymentPending),
            ))
        })
    }

    /// Payment confirmed by the payment collaborator; the order enters the marketplace.
    pub fn mark_payment_completed(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        let order = self.transition(order_id, |order| {
            ensure_transition(order, OrderStatus::PaymentCompleted)?;
            Ok(Mutation::advance(
                order,
                OrderChange::status(OrderStatus::PaymentCompleted)
                    .with_payment(PaymentStatus::Success),
            ))
        })?;

        self.notify(OrderEventKind::MarketplaceListed, &order, None);
        Ok(order)
    }

    /// Payment attempt failed; the order waits in PAYMENT_PENDING for a retry.
    pub fn mark_payment_failed(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        self.transition(order_id, |order| {
            match order.status {
                OrderStatus::Created => ensure_transition(order, OrderStatus::PaymentPending)?,
                OrderStatus::PaymentPending => {}
                current => {
                    return Err(InvalidTransition {
                        current,
                        requested: OrderStatus::PaymentPending,
                    }
                    .into())
                }
            }
            Ok(Mutation::advance(
                order,
                OrderChange::status(OrderStatus::PaymentPending)
                    .with_payment(PaymentStatus::Failed),
            ))
        })
    }

    /// Exclusive acquisition of a marketplace order by a verified partner.
    pub fn claim_order(&self, principal: &Principal, order_id: &OrderId) -> Result<Order, OrderError> {
        let Actor::Partner(provider) = self.resolve_actor(principal)? else {
            return Err(OrderError::Forbidden(
                "only partners can claim orders".to_string(),
            ));
        };
        if !self.marketplace_allowed(&provider.id)? {
            return Err(OrderError::Forbidden(
                "partner must be verified to claim orders".to_string(),
            ));
        }

        let result = self.transition(order_id, |order| plan_claim(order, &provider.id));
        match &result {
            Ok(order) => self.notify(OrderEventKind::Claimed, order, None),
            Err(OrderError::AlreadyClaimed(_)) => warn!(
                order_id = %order_id,
                provider_id = %provider.id,
                "claim lost: order already claimed"
            ),
            Err(_) => {}
        }
        result
    }

    /// PROCESSING -> COMPLETED by the assigned partner or an admin.
    pub fn complete_order(
        &self,
        principal: &Principal,
        order_id: &OrderId,
    ) -> Result<Order, OrderError> {
        let actor = self.resolve_actor(principal)?;
        if matches!(actor, Actor::Client(_)) {
            return Err(OrderError::Forbidden(
                "clients cannot complete orders".to_string(),
            ));
        }

        let order = self.transition(order_id, |order| {
            if order.status.is_terminal() {
                return Err(InvalidTransition {
                    current: order.status,
                    requested: OrderStatus::Completed,
                }
                .into());
            }
            if let Actor::Partner(provider) = &actor {
                if order.provider_id.as_ref() != Some(&provider.id) {
                    return Err(OrderError::Forbidden(
                        "only the assigned partner can complete this order".to_string(),
                    ));
                }
            }
            ensure_transition(order, OrderStatus::Completed)?;
            Ok(Mutation::advance(
                order,
                OrderChange::status(OrderStatus::Completed),
            ))
        })?;

        self.notify(OrderEventKind::Completed, &order, None);
        Ok(order)
    }

    /// Admins cancel any non-terminal order; clients only their own, and only before payment.
    pub fn cancel_order(
        &self,
        principal: &Principal,
        order_id: &OrderId,
    ) -> Result<Order, OrderError> {
        let actor = self.resolve_actor(principal)?;
        if matches!(actor, Actor::Partner(_)) {
            return Err(OrderError::Forbidden(
                "partners cannot cancel orders".to_string(),
            ));
        }

        let order = self.transition(order_id, |order| {
            if order.status.is_terminal() {
                return Err(InvalidTransition {
                    current: order.status,
                    requested: OrderStatus::Cancelled,
                }
                .into());
            }
            if let Actor::Client(customer_id) = &actor {
                if customer_id.as_ref() != Some(&order.customer_id) {
                    return Err(OrderError::Forbidden(
                        "order belongs to another client".to_string(),
                    ));
                }
                if !matches!(
                    order.status,
                    OrderStatus::Created | OrderStatus::PaymentPending
                ) {
                    return Err(OrderError::Forbidden(
                        "clients can only cancel orders before payment completes".to_string(),
                    ));
                }
            }
            ensure_transition(order, OrderStatus::Cancelled)?;
            Ok(Mutation::advance(
                order,
                OrderChange::status(OrderStatus::Cancelled).releasing_provider(),
            ))
        })?;

        self.notify(OrderEventKind::Cancelled, &order, None);
        Ok(order)
    }

    /// CANCELLED -> REFUNDED, admin only, and only if the payment had succeeded.
    pub fn refund_order(
        &self,
        principal: &Principal,
        order_id: &OrderId,
    ) -> Result<Order, OrderError> {
        require_admin(principal, "only admins can refund orders")?;

        let order = self.transition(order_id, |order| {
            ensure_transition(order, OrderStatus::Refunded)?;
            Ok(Mutation::advance(
                order,
                OrderChange::status(OrderStatus::Refunded).with_payment(PaymentStatus::Refunded),
            ))
        })?;

        self.notify(OrderEventKind::Refunded, &order, None);
        Ok(order)
    }

    /// Record the final price while the order is still awaiting payment.
    pub fn quote_order(
        &self,
        principal: &Principal,
        order_id: &OrderId,
        final_price: Decimal,
    ) -> Result<Order, OrderError> {
        require_admin(principal, "only admins can set prices")?;
        if final_price < Decimal::ZERO {
            return Err(OrderError::Validation(
                "final price must not be negative".to_string(),
            ));
        }

        self.transition(order_id, |order| {
            if !matches!(
                order.status,
                OrderStatus::Created | OrderStatus::PaymentPending
            ) {
                return Err(OrderError::PriceLocked(order.status));
            }
            Ok(Mutation::advance(order, OrderChange::price(final_price)))
        })
    }

    /// Plan against the current row, then write with a compare-and-set on what was read.
    /// A lost race is re-planned against the winning row so the caller gets the precise reason.
    fn transition<F>(&self, order_id: &OrderId, plan: F) -> Result<Order, OrderError>
    where
        F: Fn(&Order) -> Result<Mutation, OrderError>,
    {
        let current = self.load(order_id)?;
        let mutation = plan(&current)?;

        match self
            .store
            .apply(order_id, &mutation.expect, &mutation.change, Utc::now())
        {
            Ok(updated) => {
                info!(
                    order_id = %updated.id,
                    from = %current.status,
                    to = %updated.status,
                    payment = %updated.payment_status,
                    "order updated"
                );
                Ok(updated)
            }
            Err(RepositoryError::PreconditionFailed(latest)) => {
                plan(&latest)?;
                warn!(order_id = %order_id, "order changed concurrently");
                Err(OrderError::Conflict(order_id.clone()))
            }
            Err(RepositoryError::NotFound) => Err(OrderError::NotFound(order_id.clone())),
            Err(err) => Err(self.storage_failure(&format!("update order {order_id}"), err)),
        }
    }

    fn load(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        self.store
            .fetch(order_id)
            .map_err(|err| self.storage_failure(&format!("fetch order {order_id}"), err))?
            .ok_or_else(|| OrderError::NotFound(order_id.clone()))
    }

    fn receiver(&self, user_id: &UserId) -> Result<Option<ServiceReceiver>, OrderError> {
        self.store
            .receiver_for_user(user_id)
            .map_err(|err| self.storage_failure(&format!("receiver lookup {user_id}"), err))
    }

    fn provider(&self, user_id: &UserId) -> Result<Option<ServiceProvider>, OrderError> {
        self.store
            .provider_for_user(user_id)
            .map_err(|err| self.storage_failure(&format!("provider lookup {user_id}"), err))
    }

    fn receiver_or_create(&self, principal: &Principal) -> Result<ServiceReceiver, OrderError> {
        let user_id = principal.user_id();
        if let Some(receiver) = self.receiver(user_id)? {
            return Ok(receiver);
        }

        match self
            .store
            .create_receiver(user_id, &principal.display_name(), Utc::now())
        {
            Ok(receiver) => {
                info!(customer_id = %receiver.id, user_id = %user_id, "client profile created");
                Ok(receiver)
            }
            // another request for the same user created it first
            Err(RepositoryError::Conflict) => self.receiver(user_id)?.ok_or_else(|| {
                self.storage_failure(
                    &format!("receiver for {user_id} vanished after conflict"),
                    RepositoryError::NotFound,
                )
            }),
            Err(err) => Err(self.storage_failure(&format!("create receiver {user_id}"), err)),
        }
    }

    fn resolve_actor(&self, principal: &Principal) -> Result<Actor, OrderError> {
        match principal {
            Principal::Client { user_id, .. } => Ok(Actor::Client(
                self.receiver(user_id)?.map(|receiver| receiver.id),
            )),
            Principal::Partner { user_id } => self
                .provider(user_id)?
                .map(Actor::Partner)
                .ok_or_else(|| OrderError::Forbidden("partner profile not found".to_string())),
            Principal::Admin { .. } => Ok(Actor::Admin),
        }
    }

    /// `None` when the caller has no backing profile and therefore sees nothing.
    fn resolve_scope(
        &self,
        principal: &Principal,
        available_only: bool,
    ) -> Result<Option<RoleScope>, OrderError> {
        match principal {
            Principal::Client { user_id, .. } => {
                if available_only {
                    return Err(OrderError::Forbidden(
                        "clients have no marketplace access".to_string(),
                    ));
                }
                Ok(self
                    .receiver(user_id)?
                    .map(|receiver| RoleScope::Customer(receiver.id)))
            }
            Principal::Partner { user_id } => {
                let Some(provider) = self.provider(user_id)? else {
                    return Ok(None);
                };
                if !available_only {
                    return Ok(Some(RoleScope::AssignedTo(provider.id)));
                }
                if !self.marketplace_allowed(&provider.id)? {
                    return Err(OrderError::Forbidden(
                        "partner must be verified to view available orders".to_string(),
                    ));
                }
                Ok(Some(RoleScope::Marketplace))
            }
            Principal::Admin { .. } => Ok(Some(if available_only {
                RoleScope::Marketplace
            } else {
                RoleScope::Unrestricted
            })),
        }
    }

    fn marketplace_allowed(&self, provider_id: &ProviderId) -> Result<bool, OrderError> {
        self.gate
            .can_access_marketplace(provider_id)
            .map_err(|err| self.storage_failure(&format!("verification lookup {provider_id}"), err))
    }

    fn notify(&self, event: OrderEventKind, order: &Order, service_name: Option<String>) {
        let service_name = service_name.unwrap_or_else(|| {
            self.catalog
                .find_service(&ServiceRef::Id(order.service_id.clone()))
                .ok()
                .flatten()
                .map(|service| service.document_type)
                .unwrap_or_else(|| order.service_id.to_string())
        });

        self.notifications.enqueue(OrderNotice {
            event,
            order: order.clone(),
            service_name,
        });
    }

    fn storage_failure(&self, context: &str, err: RepositoryError) -> OrderError {
        error!(context, error = %err, "order store failure");
        OrderError::Internal
    }
}

fn plan_claim(order: &Order, provider_id: &ProviderId) -> Result<Mutation, OrderError> {
    if order.status.is_terminal() {
        return Err(InvalidTransition {
            current: order.status,
            requested: OrderStatus::Processing,
        }
        .into());
    }
    if order.provider_id.is_some() {
        return Err(OrderError::AlreadyClaimed(order.id.clone()));
    }
    ensure_transition(order, OrderStatus::Processing)?;

    Ok(Mutation {
        expect: Precondition::unclaimed(OrderStatus::PaymentCompleted),
        change: OrderChange::status(OrderStatus::Processing).with_provider(provider_id.clone()),
    })
}

fn require_admin(principal: &Principal, message: &str) -> Result<(), OrderError> {
    match principal {
        Principal::Admin { .. } => Ok(()),
        _ => Err(OrderError::Forbidden(message.to_string())),
    }
}

fn normalize_service_ref(service: ServiceRef) -> Result<ServiceRef, OrderError> {
    let missing = || OrderError::Validation("service id or name is required".to_string());
    match service {
        ServiceRef::Id(id) if id.as_str().trim().is_empty() => Err(missing()),
        ServiceRef::Name(name) if name.trim().is_empty() => Err(missing()),
        ServiceRef::Name(name) => Ok(ServiceRef::Name(name.trim().to_string())),
        other => Ok(other),
    }
}

fn normalize_remarks(remarks: Option<String>) -> Result<Option<String>, OrderError> {
    let remarks = remarks
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    if let Some(value) = &remarks {
        if value.chars().count() > MAX_REMARKS_CHARS {
            return Err(OrderError::Validation(format!(
                "remarks must be at most {MAX_REMARKS_CHARS} characters"
            )));
        }
    }
    Ok(remarks)
}

/// Error raised by the order engine. Storage detail never leaves [`OrderError::Internal`].
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    #[error("service is not active: {0}")]
    ServiceInactive(String),
    #[error("order not found: {0}")]
    NotFound(OrderId),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("order {0} has already been claimed")]
    AlreadyClaimed(OrderId),
    #[error("order {0} was modified concurrently")]
    Conflict(OrderId),
    #[error("final price is locked once an order is {0}")]
    PriceLocked(OrderStatus),
    #[error("internal error")]
    Internal,
}

impl OrderError {
    /// Stable machine-readable kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation_error",
            OrderError::ServiceNotFound(_) => "service_not_found",
            OrderError::ServiceInactive(_) => "service_inactive",
            OrderError::NotFound(_) => "not_found",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::InvalidTransition(_) | OrderError::PriceLocked(_) => "invalid_transition",
            OrderError::AlreadyClaimed(_) => "already_claimed",
            OrderError::Conflict(_) => "conflict",
            OrderError::Internal => "internal_error",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::ServiceNotFound(_)
            | OrderError::ServiceInactive(_)
            | OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Forbidden(_) => StatusCode::FORBIDDEN,
            OrderError::InvalidTransition(_)
            | OrderError::PriceLocked(_)
            | OrderError::AlreadyClaimed(_)
            | OrderError::Conflict(_) => StatusCode::CONFLICT,
            OrderError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
