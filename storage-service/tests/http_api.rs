use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use storage_service::api::{create_router, AppState};
use storage_service::ledger::memory::MemoryStore;
use tower::ServiceExt;

fn app(store: &MemoryStore) -> Router {
    create_router(AppState::new(store.clone(), Duration::from_secs(5)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn define(app: &Router) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/storages/schema",
        Some(json!([
            {"is_available": true, "products": [{"vendor": "BOLT-M8", "name": "Bolt", "size": "M8", "amount": 5}]},
            {"is_available": true, "products": [{"vendor": "BOLT-M10", "name": "Bolt", "size": "M10", "amount": 3}]}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn health_check_responds() {
    let store = MemoryStore::new();
    let response = app(&store)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn reserve_release_round_trip_over_http() {
    let store = MemoryStore::new();
    let app = app(&store);
    let schema = define(&app).await;
    let storage_id = schema[0]["id"].as_i64().unwrap();
    let product_id = schema[0]["products"][0]["id"].as_i64().unwrap();

    let (status, _) = send(&app, "POST", "/reservations", Some(json!([{"id": product_id, "amount": 4}]))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, view) = send(&app, "GET", &format!("/storages/{storage_id}/unreserved"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["products"][0]["amount"], json!(1));

    let (status, _) = send(&app, "POST", "/reservations/release", Some(json!([{"id": product_id, "amount": 4}]))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(store.snapshot().await.reservations.is_empty());
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let store = MemoryStore::new();
    let app = app(&store);
    let schema = define(&app).await;
    let product_id = schema[1]["products"][0]["id"].as_i64().unwrap();

    let (status, body) = send(&app, "POST", "/reservations", Some(json!([{"id": product_id, "amount": 0}]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("must be positive"));

    let (status, _) = send(&app, "POST", "/reservations", Some(json!([{"id": product_id, "amount": 4}]))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/reservations/release", Some(json!([{"id": product_id, "amount": 1}]))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/reservations", Some(json!([{"id": 9999, "amount": 1}]))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/storages/9999/unreserved", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_request_timeout_still_serves() {
    let store = MemoryStore::new();
    let app = create_router(AppState::new(store.clone(), Duration::MAX));
    let schema = define(&app).await;
    let product_id = schema[0]["products"][0]["id"].as_i64().unwrap();

    let (status, _) = send(&app, "POST", "/reservations", Some(json!([{"id": product_id, "amount": 2}]))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(store.snapshot().await.total_reserved(product_id), 2);
}
