use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    entities::stock_movement::MovementDirection,
    errors::ApiError,
    handlers::common::{created_response, map_service_error, success_response},
    services::stock::PostMovementRequest,
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementListParams {
    pub product_id: Option<Uuid>,
    pub limit: Option<u64>,
}

/// Body for the direction-specific `/stock/in` and `/stock/out` endpoints;
/// the route itself carries the direction.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StockAdjustmentRequest {
    pub product_id: Uuid,
    pub qty: i32,
    pub description: Option<String>,
    pub user_id: Uuid,
}

fn adjustment_to_movement(
    direction: MovementDirection,
    body: StockAdjustmentRequest,
) -> PostMovementRequest {
    PostMovementRequest {
        product_id: body.product_id,
        direction,
        qty: body.qty,
        description: body.description,
        user_id: body.user_id,
    }
}

async fn post_movement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PostMovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movement = state
        .services
        .stock
        .post_movement(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(movement))
}

async fn stock_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StockAdjustmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movement = state
        .services
        .stock
        .post_movement(adjustment_to_movement(MovementDirection::In, payload))
        .await
        .map_err(map_service_error)?;
    Ok(created_response(movement))
}

async fn stock_out(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StockAdjustmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let movement = state
        .services
        .stock
        .post_movement(adjustment_to_movement(MovementDirection::Out, payload))
        .await
        .map_err(map_service_error)?;
    Ok(created_response(movement))
}

async fn list_movements(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MovementListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let movements = state
        .services
        .stock
        .list_movements(params.product_id, params.limit)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(movements))
}

pub fn stock_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/movements", post(post_movement).get(list_movements))
        .route("/in", post(stock_in))
        .route("/out", post(stock_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_carries_route_direction() {
        let body = StockAdjustmentRequest {
            product_id: Uuid::new_v4(),
            qty: 5,
            description: Some("Kulakan pagi".into()),
            user_id: Uuid::new_v4(),
        };
        let movement = adjustment_to_movement(MovementDirection::In, body);
        assert_eq!(movement.direction, MovementDirection::In);
        assert_eq!(movement.qty, 5);
        assert_eq!(movement.description.as_deref(), Some("Kulakan pagi"));
    }
}
