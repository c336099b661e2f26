use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    errors::ApiError,
    handlers::common::{map_service_error, success_response},
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SalesReportParams {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductReportParams {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .services
        .reports
        .dashboard_stats()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(stats))
}

async fn sales_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SalesReportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .reports
        .sales_report(params.start, params.end)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(report))
}

async fn product_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProductReportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .reports
        .product_report(params.start, params.end)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(report))
}

async fn stock_report(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .reports
        .stock_report()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(report))
}

pub fn report_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dashboard", get(dashboard_stats))
        .route("/sales", get(sales_report))
        .route("/products", get(product_report))
        .route("/stock", get(stock_report))
}
