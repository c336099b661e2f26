use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, no_content_response, success_response, validate_input,
        PaginationParams,
    },
    services::products::{CreateProductRequest, UpdateProductRequest},
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListParams {
    pub search: Option<String>,
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .products
        .create_product(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(product))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .products
        .update_product(id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(product))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .products
        .get_product(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Product {} not found", id)))?;
    Ok(success_response(product))
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(params): Query<ProductListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.clamped();
    let products = state
        .services
        .products
        .list_products(page, per_page, params.search)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(products))
}

async fn archive_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .products
        .archive_product(id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

pub fn product_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(archive_product),
        )
}
