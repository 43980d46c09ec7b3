use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::marketplace::domain::Principal;

#[tokio::test]
async fn create_route_returns_created_order() {
    let fixture = fixture();
    let response = router(&fixture)
        .oneshot(request(
            Method::POST,
            "/api/v1/orders",
            Some(&client("c-1")),
            Some(json!({ "serviceName": "GST Registration", "remarks": "need by Friday" })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "CREATED");
    assert_eq!(payload["paymentStatus"], "PENDING");
    assert_eq!(payload["providerId"], serde_json::Value::Null);
    assert_eq!(payload["serviceId"], fixture.gst.id.as_str());
    assert_eq!(payload["remarksByUser"], "need by Friday");
}

#[tokio::test]
async fn missing_identity_is_unauthenticated() {
    let fixture = fixture();
    let response = router(&fixture)
        .oneshot(request(Method::GET, "/api/v1/orders", None, None))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "unauthenticated");
}

#[tokio::test]
async fn create_route_maps_catalog_errors() {
    let fixture = fixture();
    let response = router(&fixture)
        .oneshot(request(
            Method::POST,
            "/api/v1/orders",
            Some(&client("c-1")),
            Some(json!({ "serviceId": fixture.retired.id.as_str() })),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json_body(response).await["kind"], "service_inactive");

    let response = router(&fixture)
        .oneshot(request(
            Method::POST,
            "/api/v1/orders",
            Some(&client("c-1")),
            Some(json!({ "remarks": "no service" })),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(response).await["kind"], "validation_error");
}

#[tokio::test]
async fn list_route_applies_query_and_role() {
    let fixture = fixture();
    let customer = client("c-1");
    place_order(&fixture, &customer);
    paid_order(&fixture, &customer);
    place_order(&fixture, &customer);

    let response = router(&fixture)
        .oneshot(request(
            Method::GET,
            "/api/v1/orders?status=CREATED&page=1&limit=1",
            Some(&customer),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 2);
    assert_eq!(payload["page"], 1);
    assert_eq!(payload["totalPages"], 2);
    assert_eq!(payload["orders"].as_array().map(Vec::len), Some(1));

    let response = router(&fixture)
        .oneshot(request(
            Method::GET,
            "/api/v1/orders?available=true",
            Some(&customer),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router(&fixture)
        .oneshot(request(
            Method::GET,
            "/api/v1/orders?limit=500",
            Some(&admin()),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_route_reports_malformed_query_as_json() {
    let fixture = fixture();
    let response = router(&fixture)
        .oneshot(request(
            Method::GET,
            "/api/v1/orders?page=1&page=2",
            Some(&admin()),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "validation_error");
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.contains("page")));
}

#[tokio::test]
async fn payment_hooks_require_admin() {
    let fixture = fixture();
    let customer = client("c-1");
    let order = place_order(&fixture, &customer);
    let uri = format!("/api/v1/orders/{}/payment/completed", order.id);

    let response = router(&fixture)
        .oneshot(request(Method::POST, &uri, Some(&customer), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router(&fixture)
        .oneshot(request(Method::POST, &uri, Some(&admin()), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "PAYMENT_COMPLETED");
    assert_eq!(payload["paymentStatus"], "SUCCESS");

    let response = router(&fixture)
        .oneshot(request(Method::POST, &uri, Some(&admin()), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(response).await["kind"], "invalid_transition");
}

#[tokio::test]
async fn claim_route_reports_lost_claims() {
    let fixture = fixture();
    let order = paid_order(&fixture, &client("c-1"));
    let (winner, _) = verified_partner(&fixture, "p-1");
    let (loser, _) = verified_partner(&fixture, "p-2");
    let uri = format!("/api/v1/orders/{}/claim", order.id);

    let response = router(&fixture)
        .oneshot(request(Method::POST, &uri, Some(&winner), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["status"], "PROCESSING");

    let response = router(&fixture)
        .oneshot(request(Method::POST, &uri, Some(&loser), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["kind"], "already_claimed");
    assert!(payload["error"]
        .as_str()
        .is_some_and(|message| message.contains(order.id.as_str())));
}

#[tokio::test]
async fn get_route_hides_foreign_orders() {
    let fixture = fixture();
    let order = place_order(&fixture, &client("c-1"));
    let uri = format!("/api/v1/orders/{}", order.id);

    let response = router(&fixture)
        .oneshot(request(Method::GET, &uri, Some(&client("c-2")), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router(&fixture)
        .oneshot(request(Method::GET, &uri, Some(&Principal::admin("ops")), None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["id"], order.id.as_str());
}

#[tokio::test]
async fn price_route_accepts_decimal_strings() {
    let fixture = fixture();
    let order = place_order(&fixture, &client("c-1"));
    let uri = format!("/api/v1/orders/{}/price", order.id);

    let response = router(&fixture)
        .oneshot(request(
            Method::PUT,
            &uri,
            Some(&admin()),
            Some(json!({ "finalPrice": "1499.00" })),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["finalPrice"], "1499.00");

    let response = router(&fixture)
        .oneshot(request(
            Method::PUT,
            &uri,
            Some(&admin()),
            Some(json!({ "price": 10 })),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_and_refund_routes_close_an_order() {
    let fixture = fixture();
    let order = paid_order(&fixture, &client("c-1"));

    let response = router(&fixture)
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order.id),
            Some(&admin()),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router(&fixture)
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/orders/{}/refund", order.id),
            Some(&admin()),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "REFUNDED");
    assert_eq!(payload["paymentStatus"], "REFUNDED");
}
