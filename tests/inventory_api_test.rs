mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use common::TestApp;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;

    let (status, body) = send(app.router(), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn upsert_reserve_availability_roundtrip() {
    let app = TestApp::new().await;

    let (status, body) = send(
        app.router(),
        post_json(
            "/inventory/admin/upsert",
            json!({ "sku": "A", "product_name": "Apples", "quantity_delta": 50 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sku"], "A");
    assert_eq!(body["total_quantity"], 50);
    assert_eq!(body["available_quantity"], 50);
    assert_eq!(body["reorder_threshold"], 20);

    let (status, body) = send(
        app.router(),
        post_json(
            "/inventory/reserve",
            json!({
                "order_ref": "ORD-1",
                "items": [{ "sku": "A", "quantity": 8 }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reserved");

    let (status, body) = send(
        app.router(),
        get("/inventory/availability?skus=A,GHOST"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["A"], 42);
    assert_eq!(body["GHOST"], 0);
}

#[tokio::test]
async fn insufficient_stock_returns_unprocessable_entity_body() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 3, 20).await;

    let (status, body) = send(
        app.router(),
        post_json(
            "/inventory/reserve",
            json!({
                "order_ref": "ORD-1",
                "items": [{ "sku": "A", "quantity": 4 }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Unprocessable Entity");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Insufficient stock"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn reserving_an_unknown_sku_returns_not_found() {
    let app = TestApp::new().await;

    let (status, body) = send(
        app.router(),
        post_json(
            "/inventory/reserve",
            json!({
                "order_ref": "ORD-1",
                "items": [{ "sku": "GHOST", "quantity": 1 }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("No inventory for SKU GHOST"));
}

#[tokio::test]
async fn blank_order_ref_fails_validation() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 10, 20).await;

    let (status, _) = send(
        app.router(),
        post_json(
            "/inventory/reserve",
            json!({
                "order_ref": "",
                "items": [{ "sku": "A", "quantity": 1 }]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_batch_fails_validation() {
    let app = TestApp::new().await;

    let (status, _) = send(
        app.router(),
        post_json(
            "/inventory/reserve",
            json!({ "order_ref": "ORD-1", "items": [] }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn commit_and_release_return_no_content() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 10, 20).await;

    let (status, _) = send(
        app.router(),
        post_json(
            "/inventory/reserve",
            json!({
                "order_ref": "ORD-1",
                "items": [{ "sku": "A", "quantity": 4 }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app.router(),
        post_json("/inventory/commit/ORD-1", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Unknown order refs are idempotent no-ops, not errors.
    let (status, _) = send(
        app.router(),
        post_json("/inventory/release/NO-SUCH", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(app.router(), get("/inventory/availability?skus=A")).await;
    assert_eq!(body["A"], 6);
}

#[tokio::test]
async fn cart_endpoints_round_trip() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 10, 20).await;

    let (status, _) = send(
        app.router(),
        post_json(
            "/inventory/cart/reserve",
            json!({ "user_email": "u@x.com", "sku": "A", "quantity": 3 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(app.router(), get("/inventory/availability?skus=A")).await;
    assert_eq!(body["A"], 7);

    let (status, _) = send(
        app.router(),
        post_json(
            "/inventory/cart/release",
            json!({ "user_email": "u@x.com", "sku": "A", "quantity": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(app.router(), get("/inventory/availability?skus=A")).await;
    assert_eq!(body["A"], 8);
}

#[tokio::test]
async fn cart_reserve_rejects_non_positive_quantities() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 10, 20).await;

    let (status, _) = send(
        app.router(),
        post_json(
            "/inventory/cart/reserve",
            json!({ "user_email": "u@x.com", "sku": "A", "quantity": 0 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn availability_requires_at_least_one_sku() {
    let app = TestApp::new().await;

    let (status, _) = send(app.router(), get("/inventory/availability?skus=")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn adjust_below_reserved_is_rejected_over_http() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 10, 20).await;
    app.service
        .reserve(
            "ORD-1",
            &[stockhold_api::services::reservation::ReservationLine {
                sku: "A".to_string(),
                quantity: 8,
            }],
            Some(15),
        )
        .await
        .unwrap();

    let (status, body) = send(
        app.router(),
        post_json(
            "/inventory/admin/adjust",
            json!({ "sku": "A", "quantity_delta": -5, "reason": "audit" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid adjustment"));
}

#[tokio::test]
async fn low_stock_report_lists_depleted_skus() {
    let app = TestApp::new().await;
    app.seed_item("A", "Apples", 50, 20).await;
    app.seed_item("C", "Cherries", 5, 20).await;

    let (status, body) = send(app.router(), get("/inventory/admin/low-stock")).await;

    assert_eq!(status, StatusCode::OK);
    let report = body.as_array().unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0]["sku"], "C");
    assert_eq!(report[0]["available_quantity"], 5);
    assert_eq!(report[0]["reorder_threshold"], 20);
}

#[tokio::test]
async fn items_endpoint_paginates_the_ledger() {
    let app = TestApp::new().await;
    for i in 0..3 {
        app.seed_item(&format!("SKU-{}", i), "Widget", 10, 2).await;
    }

    let (status, body) = send(app.router(), get("/inventory/items?page=1&limit=2")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let (status, _) = send(app.router(), get("/inventory/items?page=0&limit=2")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
