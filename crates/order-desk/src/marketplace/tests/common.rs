use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::MarketplaceConfig;
use crate::marketplace::domain::{
    CatalogService, NewOrder, Order, OrderId, Principal, ServiceProvider, ServiceReceiver,
    ServiceRef, UserId, VerificationStatus,
};
use crate::marketplace::lifecycle::{OrderChange, Precondition};
use crate::marketplace::memory::MemoryMarketplace;
use crate::marketplace::notifications::{NotificationQueue, OrderEventKind, OrderNotice};
use crate::marketplace::query::{OrderQuery, PageRequest};
use crate::marketplace::repository::{OrderRepository, ProfileDirectory, RepositoryError};
use crate::marketplace::router::{
    marketplace_router, USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER,
};
use crate::marketplace::service::{CreateOrderRequest, ListOrdersRequest, OrderEngine};

pub(super) struct Fixture {
    pub store: Arc<MemoryMarketplace>,
    pub engine: Arc<OrderEngine<MemoryMarketplace>>,
    pub gst: CatalogService,
    pub retired: CatalogService,
}

pub(super) fn fixture() -> Fixture {
    build(NotificationQueue::disabled(), MarketplaceConfig::default())
}

pub(super) fn fixture_with_notices() -> (Fixture, UnboundedReceiver<OrderNotice>) {
    let (queue, receiver) = NotificationQueue::channel();
    (build(queue, MarketplaceConfig::default()), receiver)
}

pub(super) fn fixture_with_limits(limits: MarketplaceConfig) -> Fixture {
    build(NotificationQueue::disabled(), limits)
}

fn build(queue: NotificationQueue, limits: MarketplaceConfig) -> Fixture {
    let store = Arc::new(MemoryMarketplace::new());
    let gst = store
        .add_service("GST Registration", "All India", true)
        .expect("seed service");
    let retired = store
        .add_service("Trademark Filing", "All India", false)
        .expect("seed inactive service");
    let engine = Arc::new(OrderEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        queue,
        limits,
    ));

    Fixture {
        store,
        engine,
        gst,
        retired,
    }
}

pub(super) fn client(user_id: &str) -> Principal {
    Principal::Client {
        user_id: UserId::from(user_id),
        name: Some(format!("Client {user_id}")),
        email: Some(format!("{user_id}@example.com")),
    }
}

pub(super) fn admin() -> Principal {
    Principal::admin("admin-1")
}

pub(super) fn partner(
    fixture: &Fixture,
    user_id: &str,
    status: VerificationStatus,
) -> (Principal, ServiceProvider) {
    let provider = fixture
        .store
        .add_provider(&UserId::from(user_id), &format!("Partner {user_id}"), status)
        .expect("seed provider");
    (Principal::partner(user_id), provider)
}

pub(super) fn verified_partner(fixture: &Fixture, user_id: &str) -> (Principal, ServiceProvider) {
    partner(fixture, user_id, VerificationStatus::Verified)
}

pub(super) fn order_request(service: &CatalogService) -> CreateOrderRequest {
    CreateOrderRequest {
        service: ServiceRef::Id(service.id.clone()),
        remarks: None,
    }
}

pub(super) fn place_order(fixture: &Fixture, principal: &Principal) -> Order {
    fixture
        .engine
        .create_order(principal, order_request(&fixture.gst))
        .expect("order created")
}

pub(super) fn paid_order(fixture: &Fixture, principal: &Principal) -> Order {
    let order = place_order(fixture, principal);
    fixture
        .engine
        .mark_payment_completed(&order.id)
        .expect("payment completes")
}

pub(super) fn list(page: u32, limit: u32) -> ListOrdersRequest {
    ListOrdersRequest {
        status: None,
        page,
        limit,
        available_only: false,
    }
}

pub(super) fn available() -> ListOrdersRequest {
    ListOrdersRequest {
        available_only: true,
        ..list(1, 50)
    }
}

pub(super) fn ids(orders: &[Order]) -> Vec<OrderId> {
    orders.iter().map(|order| order.id.clone()).collect()
}

pub(super) fn drain_events(receiver: &mut UnboundedReceiver<OrderNotice>) -> Vec<OrderEventKind> {
    let mut events = Vec::new();
    while let Ok(notice) = receiver.try_recv() {
        events.push(notice.event);
    }
    events
}

pub(super) fn router(fixture: &Fixture) -> axum::Router {
    marketplace_router(fixture.engine.clone())
}

pub(super) fn request(
    method: Method,
    uri: &str,
    principal: Option<&Principal>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(principal) = principal {
        builder = builder
            .header(USER_ID_HEADER, principal.user_id().as_str())
            .header(USER_ROLE_HEADER, principal.role().label());
        if let Principal::Client { name, email, .. } = principal {
            if let Some(name) = name {
                builder = builder.header(USER_NAME_HEADER, name.as_str());
            }
            if let Some(email) = email {
                builder = builder.header(USER_EMAIL_HEADER, email.as_str());
            }
        }
    }

    match body {
        Some(payload) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&payload).expect("encode body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store whose every call fails, for exercising the internal-error path.
pub(super) struct UnavailableStore;

fn down() -> RepositoryError {
    RepositoryError::Unavailable("connection refused".to_string())
}

impl OrderRepository for UnavailableStore {
    fn insert(&self, _order: NewOrder, _at: DateTime<Utc>) -> Result<Order, RepositoryError> {
        Err(down())
    }

    fn fetch(&self, _id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Err(down())
    }

    fn list(
        &self,
        _query: &OrderQuery,
        _page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        Err(down())
    }

    fn apply(
        &self,
        _id: &OrderId,
        _expect: &Precondition,
        _change: &OrderChange,
        _at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        Err(down())
    }
}

impl ProfileDirectory for UnavailableStore {
    fn receiver_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<ServiceReceiver>, RepositoryError> {
        Err(down())
    }

    fn create_receiver(
        &self,
        _user_id: &UserId,
        _full_name: &str,
        _at: DateTime<Utc>,
    ) -> Result<ServiceReceiver, RepositoryError> {
        Err(down())
    }

    fn provider_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<ServiceProvider>, RepositoryError> {
        Err(down())
    }
}

pub(super) fn unavailable_engine(fixture: &Fixture) -> OrderEngine<UnavailableStore> {
    OrderEngine::new(
        Arc::new(UnavailableStore),
        fixture.store.clone(),
        fixture.store.clone(),
        NotificationQueue::disabled(),
        MarketplaceConfig::default(),
    )
}

type Interloper = Box<dyn FnOnce(&MemoryMarketplace) + Send>;

/// Delegates to the shared store but commits one competing write right before the engine's
/// first compare-and-set, as if another request got there between read and write.
pub(super) struct RacingStore {
    inner: Arc<MemoryMarketplace>,
    interloper: Mutex<Option<Interloper>>,
}

impl RacingStore {
    pub(super) fn new(
        inner: Arc<MemoryMarketplace>,
        interloper: impl FnOnce(&MemoryMarketplace) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            interloper: Mutex::new(Some(Box::new(interloper))),
        }
    }
}

impl OrderRepository for RacingStore {
    fn insert(&self, order: NewOrder, at: DateTime<Utc>) -> Result<Order, RepositoryError> {
        self.inner.insert(order, at)
    }

    fn fetch(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(
        &self,
        query: &OrderQuery,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        self.inner.list(query, page)
    }

    fn apply(
        &self,
        id: &OrderId,
        expect: &Precondition,
        change: &OrderChange,
        at: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let pending = self.interloper.lock().expect("interloper lock").take();
        if let Some(interloper) = pending {
            interloper(&self.inner);
        }
        self.inner.apply(id, expect, change, at)
    }
}

impl ProfileDirectory for RacingStore {
    fn receiver_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ServiceReceiver>, RepositoryError> {
        self.inner.receiver_for_user(user_id)
    }

    fn create_receiver(
        &self,
        user_id: &UserId,
        full_name: &str,
        at: DateTime<Utc>,
    ) -> Result<ServiceReceiver, RepositoryError> {
        self.inner.create_receiver(user_id, full_name, at)
    }

    fn provider_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ServiceProvider>, RepositoryError> {
        self.inner.provider_for_user(user_id)
    }
}

pub(super) fn racing_engine(
    fixture: &Fixture,
    interloper: impl FnOnce(&MemoryMarketplace) + Send + 'static,
) -> OrderEngine<RacingStore> {
    OrderEngine::new(
        Arc::new(RacingStore::new(fixture.store.clone(), interloper)),
        fixture.store.clone(),
        fixture.store.clone(),
        NotificationQueue::disabled(),
        MarketplaceConfig::default(),
    )
}
