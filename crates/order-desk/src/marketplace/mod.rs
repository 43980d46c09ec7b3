//! Order marketplace: placement, role-scoped listing, payment hooks, and exclusive claiming.
//!
//! Every status change goes through [`OrderRepository::apply`], a compare-and-set on the
//! fields the change was planned against. Concurrent claims on one order therefore resolve to a
//! single winner no matter how many requests race.

pub mod domain;
pub mod gate;
pub mod lifecycle;
pub mod memory;
pub mod notifications;
pub mod query;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    CatalogService, CustomerId, NewOrder, Order, OrderId, OrderStatus, PaymentStatus, Principal,
    ProviderId, Role, ServiceId, ServiceProvider, ServiceReceiver, ServiceRef, UserId,
    VerificationStatus,
};
pub use gate::VerificationGate;
pub use lifecycle::{ensure_transition, InvalidTransition, Mutation, OrderChange, Precondition};
pub use memory::MemoryMarketplace;
pub use notifications::{
    spawn_dispatch_worker, Audience, NotificationDispatcher, NotificationError, NotificationQueue,
    OrderEventKind, OrderNotice,
};
pub use query::{apply_role_filter, OrderPage, OrderPredicate, OrderQuery, PageRequest, RoleScope};
pub use repository::{
    OrderRepository, ProfileDirectory, RepositoryError, ServiceCatalog, VerificationRegistry,
};
pub use router::{marketplace_router, principal_from_headers, IdentityError};
pub use service::{CreateOrderRequest, ListOrdersRequest, OrderEngine, OrderError};
