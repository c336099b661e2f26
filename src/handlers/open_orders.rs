use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response, validate_input,
    },
    services::open_orders::{CreateOpenOrderRequest, SendOpenOrderRequest},
    AppState,
};

async fn create_open_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOpenOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .open_orders
        .create_open_order(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(order))
}

async fn update_open_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateOpenOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let order = state
        .services
        .open_orders
        .update_open_order(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(order))
}

async fn get_open_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .open_orders
        .get_open_order(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Open order {} not found", id)))?;
    Ok(success_response(order))
}

async fn list_open(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .services
        .open_orders
        .list_open()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(orders))
}

async fn delete_open_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .open_orders
        .delete_open_order(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn send_open_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendOpenOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .open_orders
        .send_open_order(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(result))
}

pub fn open_order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_open_order).get(list_open))
        .route(
            "/:id",
            get(get_open_order)
                .put(update_open_order)
                .delete(delete_open_order),
        )
        .route("/:id/send", post(send_open_order))
}
