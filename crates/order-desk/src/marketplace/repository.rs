use chrono::{DateTime, Utc};

use super::domain::{
    CatalogService, NewOrder, Order, OrderId, ProviderId, ServiceProvider, ServiceReceiver,
    ServiceRef, UserId, VerificationStatus,
};
use super::lifecycle::{OrderChange, Precondition};
use super::query::{OrderQuery, PageRequest};

/// Order storage. `apply` is the only mutation path and must evaluate the precondition and
/// write the change as one atomic step.
pub trait OrderRepository: Send + Sync {
    fn insert(&self, order: NewOrder, at: DateTime<Utc>) -> Result<Order, RepositoryError>;
    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    /// Matching orders, newest first (`created_at` desc, then `id` desc), plus the total count.
    fn list(
        &self,
        query: &OrderQuery,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError>;
    fn apply(
        &self,
        id: &OrderId,
        expect: &Precondition,
        change: &OrderChange,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;
}

/// Client and partner profiles keyed by account.
pub trait ProfileDirectory: Send + Sync {
    fn receiver_for_user(&self, user_id: &UserId)
        -> Result<Option<ServiceReceiver>, RepositoryError>;
    /// Fails with `Conflict` when the user already has a receiver profile.
    fn create_receiver(
        &self,
        user_id: &UserId,
        full_name: &str,
        at: DateTime<Utc>,
    ) -> Result<ServiceReceiver, RepositoryError>;
    fn provider_for_user(&self, user_id: &UserId)
        -> Result<Option<ServiceProvider>, RepositoryError>;
}

/// Read side of the external service catalog.
pub trait ServiceCatalog: Send + Sync {
    fn find_service(&self, reference: &ServiceRef)
        -> Result<Option<CatalogService>, RepositoryError>;
}

/// Read side of the external partner verification registry. `None` means unknown provider.
pub trait VerificationRegistry: Send + Sync {
    fn verification_status(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Option<VerificationStatus>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("precondition no longer holds for order {}", .0.id)]
    PreconditionFailed(Box<Order>),
    #[error("dangling reference: {0}")]
    MissingReference(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
