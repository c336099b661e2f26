mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{seed_product, seed_user, setup, ProductSeed};
use kasir_api::config::AppConfig;
use kasir_api::{app_router, events, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "info".into(),
        log_json: false,
        auto_migrate: false,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        event_channel_capacity: 16,
    }
}

async fn test_app() -> (Arc<kasir_api::db::DbPool>, axum::Router) {
    let (db, services) = setup().await;
    let (event_sender, _rx) = events::event_channel(16);
    let state = Arc::new(AppState {
        db: db.clone(),
        config: test_config(),
        event_sender,
        services,
    });
    (db, app_router().with_state(state))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn stock_in_endpoint_adds_stock() {
    let (db, app) = test_app().await;
    let user = seed_user(&db, "fajar", "Fajar").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            ..Default::default()
        },
    )
    .await;

    let response = app
        .oneshot(post_json(
            "/api/v1/stock/in",
            json!({
                "product_id": product.id,
                "qty": 4,
                "description": "Kulakan pagi",
                "user_id": user.id,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let movement = body_json(response).await;
    assert_eq!(movement["direction"], "in");
    assert_eq!(movement["qty"], 4);
    assert_eq!(movement["stock_after"], 14);
}

#[tokio::test]
async fn stock_out_endpoint_removes_stock() {
    let (db, app) = test_app().await;
    let user = seed_user(&db, "gita", "Gita").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            ..Default::default()
        },
    )
    .await;

    let response = app
        .oneshot(post_json(
            "/api/v1/stock/out",
            json!({
                "product_id": product.id,
                "qty": 3,
                "description": null,
                "user_id": user.id,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let movement = body_json(response).await;
    assert_eq!(movement["direction"], "out");
    assert_eq!(movement["stock_after"], 7);
    // Unset description falls back to the ledger default.
    assert_eq!(movement["description"], "Stok keluar");
}

#[tokio::test]
async fn overdrawn_stock_out_returns_bad_request() {
    let (db, app) = test_app().await;
    let user = seed_user(&db, "hana", "Hana").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 2,
            ..Default::default()
        },
    )
    .await;

    let response = app
        .oneshot(post_json(
            "/api/v1/stock/out",
            json!({
                "product_id": product.id,
                "qty": 5,
                "description": null,
                "user_id": user.id,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Insufficient stock"));
}

#[tokio::test]
async fn movements_endpoint_still_accepts_explicit_direction() {
    let (db, app) = test_app().await;
    let user = seed_user(&db, "indra", "Indra").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            ..Default::default()
        },
    )
    .await;

    let response = app
        .oneshot(post_json(
            "/api/v1/stock/movements",
            json!({
                "product_id": product.id,
                "direction": "in",
                "qty": 2,
                "description": null,
                "user_id": user.id,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let movement = body_json(response).await;
    assert_eq!(movement["stock_after"], 12);
}
