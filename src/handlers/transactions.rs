use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, success_response, validate_input, PaginationParams,
    },
    services::transactions::CreateTransactionRequest,
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransactionListParams {
    /// First local calendar day to include (inclusive)
    pub start: Option<NaiveDate>,
    /// Last local calendar day to include (inclusive)
    pub end: Option<NaiveDate>,
}

async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let transaction = state
        .services
        .transactions
        .create_transaction(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(transaction))
}

async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(params): Query<TransactionListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = pagination.clamped();
    let transactions = state
        .services
        .transactions
        .list_transactions(params.start, params.end, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(transactions))
}

async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction = state
        .services
        .transactions
        .get_transaction(id)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {} not found", id)))?;
    Ok(success_response(transaction))
}

async fn today_summary(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .services
        .transactions
        .today_summary()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(summary))
}

pub fn transaction_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_transaction).get(list_transactions))
        .route("/today", get(today_summary))
        .route("/:id", get(get_transaction))
}
