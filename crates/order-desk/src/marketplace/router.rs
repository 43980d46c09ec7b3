use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{OrderId, OrderStatus, Principal, Role, ServiceId, ServiceRef, UserId};
use super::repository::{OrderRepository, ProfileDirectory};
use super::service::{CreateOrderRequest, ListOrdersRequest, OrderEngine, OrderError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

type Engine<S> = State<Arc<OrderEngine<S>>>;

/// HTTP surface for clients, partners, and the admin/payment side.
pub fn marketplace_router<S>(engine: Arc<OrderEngine<S>>) -> Router
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/orders",
            post(create_handler::<S>).get(list_handler::<S>),
        )
        .route("/api/v1/orders/:order_id", get(get_handler::<S>))
        .route(
            "/api/v1/orders/:order_id/payment/pending",
            post(payment_pending_handler::<S>),
        )
        .route(
            "/api/v1/orders/:order_id/payment/completed",
            post(payment_completed_handler::<S>),
        )
        .route(
            "/api/v1/orders/:order_id/payment/failed",
            post(payment_failed_handler::<S>),
        )
        .route("/api/v1/orders/:order_id/claim", post(claim_handler::<S>))
        .route(
            "/api/v1/orders/:order_id/complete",
            post(complete_handler::<S>),
        )
        .route("/api/v1/orders/:order_id/cancel", post(cancel_handler::<S>))
        .route("/api/v1/orders/:order_id/refund", post(refund_handler::<S>))
        .route("/api/v1/orders/:order_id/price", put(price_handler::<S>))
        .with_state(engine)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub remarks: Option<String>,
}

impl CreateOrderBody {
    fn into_request(self) -> Result<CreateOrderRequest, OrderError> {
        let service = match (self.service_id, self.service_name) {
            (Some(id), _) if !id.trim().is_empty() => ServiceRef::Id(ServiceId(id.trim().to_string())),
            (_, Some(name)) => ServiceRef::Name(name),
            _ => {
                return Err(OrderError::Validation(
                    "service id or name is required".to_string(),
                ))
            }
        };
        Ok(CreateOrderRequest {
            service,
            remarks: self.remarks,
        })
    }
}

/// Raw list filters; parsed by hand so bad values come back in the usual error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub available: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBody {
    pub final_price: Decimal,
}

/// Caller identity could not be established from request headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("missing {0} header")]
    Missing(&'static str),
    #[error("{0}")]
    InvalidRole(String),
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        error_body(StatusCode::UNAUTHORIZED, "unauthenticated", self.to_string())
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        error_body(self.status_code(), self.kind(), self.to_string())
    }
}

enum RouteError {
    Identity(IdentityError),
    Order(OrderError),
}

impl From<IdentityError> for RouteError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

impl From<OrderError> for RouteError {
    fn from(value: OrderError) -> Self {
        Self::Order(value)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        match self {
            RouteError::Identity(err) => err.into_response(),
            RouteError::Order(err) => err.into_response(),
        }
    }
}

fn error_body(status: StatusCode, kind: &str, message: String) -> Response {
    (status, Json(json!({ "error": message, "kind": kind }))).into_response()
}

fn header_value(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolves the caller from identity headers set by the upstream auth layer.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, IdentityError> {
    let user_id = header_value(headers, USER_ID_HEADER)
        .map(UserId)
        .ok_or(IdentityError::Missing(USER_ID_HEADER))?;
    let role = header_value(headers, USER_ROLE_HEADER)
        .ok_or(IdentityError::Missing(USER_ROLE_HEADER))?
        .parse::<Role>()
        .map_err(IdentityError::InvalidRole)?;

    Ok(match role {
        Role::Client => Principal::Client {
            user_id,
            name: header_value(headers, USER_NAME_HEADER),
            email: header_value(headers, USER_EMAIL_HEADER),
        },
        Role::Partner => Principal::Partner { user_id },
        Role::Admin => Principal::Admin { user_id },
    })
}

fn parse_number(field: &str, value: Option<String>, default: u32) -> Result<u32, OrderError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| OrderError::Validation(format!("{field} must be a positive integer"))),
    }
}

fn parse_flag(value: Option<String>) -> Result<bool, OrderError> {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(OrderError::Validation(format!(
            "available must be true or false, got '{other}'"
        ))),
    }
}

fn list_request(
    params: ListOrdersParams,
    default_limit: u32,
) -> Result<ListOrdersRequest, OrderError> {
    let status = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(OrderError::Validation)?;

    Ok(ListOrdersRequest {
        status,
        page: parse_number("page", params.page, 1)?,
        limit: parse_number("limit", params.limit, default_limit)?,
        available_only: parse_flag(params.available)?,
    })
}

pub(crate) async fn create_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    let result = (|| -> Result<_, RouteError> {
        let principal = principal_from_headers(&headers)?;
        let Json(body) = body.map_err(|rejection| OrderError::Validation(rejection.body_text()))?;
        Ok(engine.create_order(&principal, body.into_request()?)?)
    })();

    match result {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    let result = (|| -> Result<_, RouteError> {
        let principal = principal_from_headers(&headers)?;
        let Query(params) =
            params.map_err(|rejection| OrderError::Validation(rejection.body_text()))?;
        let request = list_request(params, engine.limits().default_page_size)?;
        Ok(engine.list_orders(&principal, request)?)
    })();

    match result {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    order_action(&headers, |principal| {
        engine.get_order(principal, &OrderId(order_id))
    })
}

pub(crate) async fn payment_pending_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    admin_action(&headers, || engine.mark_payment_pending(&OrderId(order_id)))
}

pub(crate) async fn payment_completed_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    admin_action(&headers, || engine.mark_payment_completed(&OrderId(order_id)))
}

pub(crate) async fn payment_failed_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    admin_action(&headers, || engine.mark_payment_failed(&OrderId(order_id)))
}

pub(crate) async fn claim_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    order_action(&headers, |principal| {
        engine.claim_order(principal, &OrderId(order_id))
    })
}

pub(crate) async fn complete_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    order_action(&headers, |principal| {
        engine.complete_order(principal, &OrderId(order_id))
    })
}

pub(crate) async fn cancel_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    order_action(&headers, |principal| {
        engine.cancel_order(principal, &OrderId(order_id))
    })
}

pub(crate) async fn refund_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    order_action(&headers, |principal| {
        engine.refund_order(principal, &OrderId(order_id))
    })
}

pub(crate) async fn price_handler<S>(
    State(engine): Engine<S>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    body: Result<Json<PriceBody>, JsonRejection>,
) -> Response
where
    S: OrderRepository + ProfileDirectory + 'static,
{
    order_action(&headers, |principal| {
        let Json(body) = body.map_err(|rejection| OrderError::Validation(rejection.body_text()))?;
        engine.quote_order(principal, &OrderId(order_id), body.final_price)
    })
}

fn order_action<T, F>(headers: &HeaderMap, action: F) -> Response
where
    T: Serialize,
    F: FnOnce(&Principal) -> Result<T, OrderError>,
{
    let principal = match principal_from_headers(headers) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    match action(&principal) {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Payment hooks are driven by the admin/payment collaborator only.
fn admin_action<T, F>(headers: &HeaderMap, action: F) -> Response
where
    T: Serialize,
    F: FnOnce() -> Result<T, OrderError>,
{
    order_action(headers, |principal| match principal {
        Principal::Admin { .. } => action(),
        _ => Err(OrderError::Forbidden(
            "payment updates require the admin role".to_string(),
        )),
    })
}
