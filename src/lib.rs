pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
}

/// Common response wrapper for non-resource endpoints (health, status).
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// All v1 resource routers merged under one router.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", handlers::product_routes())
        .nest("/transactions", handlers::transaction_routes())
        .nest("/stock", handlers::stock_routes())
        .nest("/reports", handlers::report_routes())
        .nest("/open-orders", handlers::open_order_routes())
}

/// Builds the full application router, including health/status endpoints.
pub fn app_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { "kasir-api up" }))
        .route("/health", get(health))
        .route("/status", get(api_status))
        .nest("/api/v1", api_routes())
}

async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    db::check_connection(&state.db).await?;
    Ok(Json(ApiResponse::ok(json!({"database": "up"}))))
}

async fn api_status() -> Json<ApiResponse<Value>> {
    let status_data = json!({
        "status": "ok",
        "service": "kasir-api",
        "version": env!("CARGO_PKG_VERSION"),
    });
    Json(ApiResponse::ok(status_data))
}
