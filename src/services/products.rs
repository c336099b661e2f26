use crate::{
    db::DbPool,
    entities::product::{self, ActiveModel as ProductActiveModel, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    pub category: Option<String>,
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[validate(range(min = 0, message = "Minimum stock cannot be negative"))]
    pub min_stock: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    pub category: Option<String>,
    #[validate(length(min = 1, message = "Unit is required"))]
    pub unit: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    #[validate(range(min = 0, message = "Minimum stock cannot be negative"))]
    pub min_stock: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
    pub is_low_stock: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Catalog service. Products are never hard-deleted; archiving flips
/// `is_active` so sale history keeps its references.
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_prices(&request.buy_price, &request.sell_price)?;

        let db = &*self.db_pool;

        let existing = ProductEntity::find()
            .filter(product::Column::Sku.eq(request.sku.clone()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to check for duplicate SKU");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "SKU '{}' already exists",
                request.sku
            )));
        }

        let product_id = Uuid::new_v4();
        let model = ProductActiveModel {
            id: Set(product_id),
            sku: Set(request.sku),
            name: Set(request.name),
            category: Set(request.category),
            unit: Set(request.unit),
            buy_price: Set(request.buy_price),
            sell_price: Set(request.sell_price),
            stock: Set(request.stock),
            min_stock: Set(request.min_stock),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let product = model.insert(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, sku = %product.sku, "Product created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ProductCreated(product_id)).await {
                warn!(error = %e, product_id = %product_id, "Failed to send product created event");
            }
        }

        Ok(model_to_response(product))
    }

    #[instrument(skip(self, request), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_prices(&request.buy_price, &request.sell_price)?;

        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if product.sku != request.sku {
            let clash = ProductEntity::find()
                .filter(product::Column::Sku.eq(request.sku.clone()))
                .filter(product::Column::Id.ne(product_id))
                .one(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to check for duplicate SKU");
                    ServiceError::DatabaseError(e)
                })?;
            if clash.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "SKU '{}' already exists",
                    request.sku
                )));
            }
        }

        let mut active: ProductActiveModel = product.into();
        active.sku = Set(request.sku);
        active.name = Set(request.name);
        active.category = Set(request.category);
        active.unit = Set(request.unit);
        active.buy_price = Set(request.buy_price);
        active.sell_price = Set(request.sell_price);
        active.min_stock = Set(request.min_stock);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to update product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product updated");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ProductUpdated(product_id)).await {
                warn!(error = %e, product_id = %product_id, "Failed to send product updated event");
            }
        }

        Ok(model_to_response(updated))
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductResponse>, ServiceError> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?;

        Ok(product.map(model_to_response))
    }

    /// Lists active products, newest first, with optional name/SKU search.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
    ) -> Result<ProductListResponse, ServiceError> {
        let db = &*self.db_pool;

        let mut query = ProductEntity::find().filter(product::Column::IsActive.eq(true));

        if let Some(term) = search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(term))
                    .add(product::Column::Sku.contains(term)),
            );
        }

        let paginator = query
            .order_by_desc(product::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count products");
            ServiceError::DatabaseError(e)
        })?;

        let products = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page = page, per_page = per_page, "Failed to fetch products page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(ProductListResponse {
            products: products.into_iter().map(model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Soft-deletes a product so historical sale lines keep resolving.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn archive_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut active: ProductActiveModel = product.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));

        active.update(db).await.map_err(|e| {
            error!(error = %e, product_id = %product_id, "Failed to archive product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %product_id, "Product archived");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::ProductArchived(product_id)).await {
                warn!(error = %e, product_id = %product_id, "Failed to send product archived event");
            }
        }

        Ok(())
    }
}

fn validate_prices(buy_price: &Decimal, sell_price: &Decimal) -> Result<(), ServiceError> {
    if buy_price.is_sign_negative() {
        return Err(ServiceError::ValidationError(
            "Buy price cannot be negative".into(),
        ));
    }
    if sell_price.is_sign_negative() {
        return Err(ServiceError::ValidationError(
            "Sell price cannot be negative".into(),
        ));
    }
    Ok(())
}

pub(crate) fn model_to_response(model: product::Model) -> ProductResponse {
    let is_low_stock = model.is_low_stock();
    ProductResponse {
        id: model.id,
        sku: model.sku,
        name: model.name,
        category: model.category,
        unit: model.unit,
        buy_price: model.buy_price,
        sell_price: model.sell_price,
        stock: model.stock,
        min_stock: model.min_stock,
        is_low_stock,
        is_active: model.is_active,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
