use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    CatalogService, CustomerId, NewOrder, Order, OrderId, OrderStatus, PaymentStatus, ProviderId,
    ServiceId, ServiceProvider, ServiceReceiver, ServiceRef, UserId, VerificationStatus,
};
use super::lifecycle::{OrderChange, Precondition};
use super::query::{OrderQuery, PageRequest};
use super::repository::{
    OrderRepository, ProfileDirectory, RepositoryError, ServiceCatalog, VerificationRegistry,
};

/// Process-local store backing orders, profiles, the service catalog, and the verification
/// registry. Every write holds the single state lock, which is what makes `apply` a true
/// compare-and-set.
#[derive(Debug, Default)]
pub struct MemoryMarketplace {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<OrderId, Order>,
    receivers: HashMap<CustomerId, ServiceReceiver>,
    providers: HashMap<ProviderId, ServiceProvider>,
    services: BTreeMap<ServiceId, CatalogService>,
    order_seq: u64,
    receiver_seq: u64,
    provider_seq: u64,
    service_seq: u64,
}

fn next_id(seq: &mut u64, prefix: &str) -> String {
    *seq += 1;
    format!("{prefix}-{:06}", *seq)
}

/// Ids only grow in width once the sequence passes the padding, so shorter sorts first.
fn sequence_key(id: &OrderId) -> (usize, &str) {
    (id.as_str().len(), id.as_str())
}

impl MemoryMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("marketplace state lock poisoned".to_string()))
    }

    pub fn add_service(
        &self,
        document_type: &str,
        region: &str,
        is_active: bool,
    ) -> Result<CatalogService, RepositoryError> {
        let mut state = self.lock()?;
        let id = ServiceId(next_id(&mut state.service_seq, "svc"));
        let service = CatalogService {
            id: id.clone(),
            document_type: document_type.to_string(),
            region: region.to_string(),
            is_active,
        };
        state.services.insert(id, service.clone());
        Ok(service)
    }

    pub fn set_service_active(&self, id: &ServiceId, is_active: bool) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let service = state.services.get_mut(id).ok_or(RepositoryError::NotFound)?;
        service.is_active = is_active;
        Ok(())
    }

    pub fn add_provider(
        &self,
        user_id: &UserId,
        full_name: &str,
        verification_status: VerificationStatus,
    ) -> Result<ServiceProvider, RepositoryError> {
        let mut state = self.lock()?;
        if state.providers.values().any(|p| &p.user_id == user_id) {
            return Err(RepositoryError::Conflict);
        }
        let id = ProviderId(next_id(&mut state.provider_seq, "prv"));
        let provider = ServiceProvider {
            id: id.clone(),
            user_id: user_id.clone(),
            full_name: full_name.to_string(),
            verification_status,
        };
        state.providers.insert(id, provider.clone());
        Ok(provider)
    }

    pub fn set_verification_status(
        &self,
        provider_id: &ProviderId,
        status: VerificationStatus,
    ) -> Result<ServiceProvider, RepositoryError> {
        let mut state = self.lock()?;
        let provider = state
            .providers
            .get_mut(provider_id)
            .ok_or(RepositoryError::NotFound)?;
        provider.verification_status = status;
        Ok(provider.clone())
    }

    pub fn services(&self) -> Result<Vec<CatalogService>, RepositoryError> {
        Ok(self.lock()?.services.values().cloned().collect())
    }
}

impl OrderRepository for MemoryMarketplace {
    fn insert(&self, order: NewOrder, at: DateTime<Utc>) -> Result<Order, RepositoryError> {
        let mut state = self.lock()?;
        if !state.receivers.contains_key(&order.customer_id) {
            return Err(RepositoryError::MissingReference(format!(
                "customer {}",
                order.customer_id
            )));
        }
        if !state.services.contains_key(&order.service_id) {
            return Err(RepositoryError::MissingReference(format!(
                "service {}",
                order.service_id
            )));
        }

        let id = OrderId(next_id(&mut state.order_seq, "ord"));
        let stored = Order {
            id: id.clone(),
            service_id: order.service_id,
            customer_id: order.customer_id,
            provider_id: None,
            status: OrderStatus::Created,
            payment_status: PaymentStatus::Pending,
            final_price: None,
            remarks_by_user: order.remarks_by_user,
            created_at: at,
            updated_at: at,
        };
        state.orders.insert(id, stored.clone());
        Ok(stored)
    }

    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.lock()?.orders.get(id).cloned())
    }

    fn list(
        &self,
        query: &OrderQuery,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let state = self.lock()?;
        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| query.matches(order))
            .collect();
        matching.sort_by(|a, b| {
            (b.created_at, sequence_key(&b.id)).cmp(&(a.created_at, sequence_key(&a.id)))
        });

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok((orders, total))
    }

    fn apply(
        &self,
        id: &OrderId,
        expect: &Precondition,
        change: &OrderChange,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut state = self.lock()?;
        let order = state.orders.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if !expect.holds_for(order) {
            return Err(RepositoryError::PreconditionFailed(Box::new(order.clone())));
        }
        change.apply_to(order);
        order.updated_at = at;
        Ok(order.clone())
    }
}

impl ProfileDirectory for MemoryMarketplace {
    fn receiver_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ServiceReceiver>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .receivers
            .values()
            .find(|receiver| &receiver.user_id == user_id)
            .cloned())
    }

    fn create_receiver(
        &self,
        user_id: &UserId,
        full_name: &str,
        at: DateTime<Utc>,
    ) -> Result<ServiceReceiver, RepositoryError> {
        let mut state = self.lock()?;
        if state.receivers.values().any(|r| &r.user_id == user_id) {
            return Err(RepositoryError::Conflict);
        }
        let id = CustomerId(next_id(&mut state.receiver_seq, "cus"));
        let receiver = ServiceReceiver {
            id: id.clone(),
            user_id: user_id.clone(),
            full_name: full_name.to_string(),
            created_at: at,
        };
        state.receivers.insert(id, receiver.clone());
        Ok(receiver)
    }

    fn provider_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ServiceProvider>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .providers
            .values()
            .find(|provider| &provider.user_id == user_id)
            .cloned())
    }
}

impl ServiceCatalog for MemoryMarketplace {
    fn find_service(
        &self,
        reference: &ServiceRef,
    ) -> Result<Option<CatalogService>, RepositoryError> {
        let state = self.lock()?;
        let found = match reference {
            ServiceRef::Id(id) => state.services.get(id),
            ServiceRef::Name(name) => state
                .services
                .values()
                .find(|service| service.document_type.eq_ignore_ascii_case(name.trim())),
        };
        Ok(found.cloned())
    }
}

impl VerificationRegistry for MemoryMarketplace {
    fn verification_status(
        &self,
        provider_id: &ProviderId,
    ) -> Result<Option<VerificationStatus>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .providers
            .get(provider_id)
            .map(|provider| provider.verification_status))
    }
}
