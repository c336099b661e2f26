use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as ProductEntity},
        stock_movement::{self, Entity as StockMovementEntity, MovementDirection},
        user::{self, Entity as UserEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const MAX_MOVEMENT_LIMIT: u64 = 100;
const DEFAULT_MOVEMENT_LIMIT: u64 = 50;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PostMovementRequest {
    pub product_id: Uuid,
    pub direction: MovementDirection,
    pub qty: i32,
    pub description: Option<String>,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MovementResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_sku: Option<String>,
    pub product_name: Option<String>,
    pub direction: MovementDirection,
    pub qty: i32,
    pub description: String,
    pub user_id: Uuid,
    pub user_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Product stock after this movement was applied. Only populated on
    /// `post_movement`; listings leave it unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_after: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MovementListResponse {
    pub movements: Vec<MovementResponse>,
}

/// Manual stock adjustments. Every adjustment both updates the product counter
/// and appends a ledger row, in one database transaction; corrections are
/// posted as offsetting movements rather than edits.
#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, qty = request.qty))]
    pub async fn post_movement(
        &self,
        request: PostMovementRequest,
    ) -> Result<MovementResponse, ServiceError> {
        if request.qty <= 0 {
            return Err(ServiceError::ValidationError(
                "Movement quantity must be greater than zero".into(),
            ));
        }

        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for stock movement");
            ServiceError::DatabaseError(e)
        })?;

        let product = ProductEntity::find_by_id(request.product_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %request.product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        let user = UserEntity::find_by_id(request.user_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %request.user_id, "Failed to fetch user");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", request.user_id)))?;

        let expr = match request.direction {
            MovementDirection::In => Expr::col(product::Column::Stock).add(request.qty),
            MovementDirection::Out => Expr::col(product::Column::Stock).sub(request.qty),
        };
        let mut update = ProductEntity::update_many()
            .col_expr(product::Column::Stock, expr)
            .filter(product::Column::Id.eq(request.product_id));
        if request.direction == MovementDirection::Out {
            // Same guard the sale path uses: stock never goes negative.
            update = update.filter(product::Column::Stock.gte(request.qty));
        }

        let result = update.exec(&txn).await.map_err(|e| {
            error!(error = %e, product_id = %request.product_id, "Failed to apply stock movement");
            ServiceError::DatabaseError(e)
        })?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "{}: stock {}, requested {}",
                product.name, product.stock, request.qty
            )));
        }

        let description = request
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| match request.direction {
                MovementDirection::In => "Stok masuk".to_string(),
                MovementDirection::Out => "Stok keluar".to_string(),
            });

        let movement = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(request.product_id),
            direction: Set(request.direction),
            qty: Set(request.qty),
            description: Set(description),
            user_id: Set(request.user_id),
            created_at: Set(Utc::now()),
        };

        let movement = movement.insert(&txn).await.map_err(|e| {
            error!(error = %e, product_id = %request.product_id, "Failed to insert stock movement");
            ServiceError::DatabaseError(e)
        })?;

        // Re-read inside the transaction for the authoritative counter.
        let stock_after = ProductEntity::find_by_id(request.product_id)
            .one(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to re-read product stock");
                ServiceError::DatabaseError(e)
            })?
            .map(|p| p.stock);

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit stock movement");
            ServiceError::DatabaseError(e)
        })?;

        info!(movement_id = %movement.id, product_id = %request.product_id, qty = request.qty, "Stock movement recorded");

        if let Some(event_sender) = &self.event_sender {
            let event = Event::StockMovementRecorded {
                product_id: request.product_id,
                movement_id: movement.id,
                qty: movement.qty,
            };
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, movement_id = %movement.id, "Failed to send stock movement event");
            }
        }

        Ok(MovementResponse {
            id: movement.id,
            product_id: movement.product_id,
            product_sku: Some(product.sku),
            product_name: Some(product.name),
            direction: movement.direction,
            qty: movement.qty,
            description: movement.description,
            user_id: movement.user_id,
            user_name: Some(user.full_name),
            created_at: movement.created_at,
            stock_after,
        })
    }

    /// Lists ledger rows newest first. `limit` is capped at 100.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        product_id: Option<Uuid>,
        limit: Option<u64>,
    ) -> Result<MovementListResponse, ServiceError> {
        let db = &*self.db_pool;

        let limit = limit
            .unwrap_or(DEFAULT_MOVEMENT_LIMIT)
            .min(MAX_MOVEMENT_LIMIT);

        let mut query = StockMovementEntity::find();
        if let Some(product_id) = product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }

        let movements = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(limit)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch stock movements");
                ServiceError::DatabaseError(e)
            })?;

        let movements = self.attach_names(movements).await?;

        Ok(MovementListResponse { movements })
    }

    /// Resolves product and user display names for ledger rows.
    pub(crate) async fn attach_names(
        &self,
        movements: Vec<stock_movement::Model>,
    ) -> Result<Vec<MovementResponse>, ServiceError> {
        let db = &*self.db_pool;

        if movements.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = movements.iter().map(|m| m.product_id).collect();
        let products: HashMap<Uuid, (String, String)> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch products for movements");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|p| (p.id, (p.sku, p.name)))
            .collect();

        let user_ids: Vec<Uuid> = movements.iter().map(|m| m.user_id).collect();
        let users: HashMap<Uuid, String> = UserEntity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch users for movements");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|u| (u.id, u.full_name))
            .collect();

        Ok(movements
            .into_iter()
            .map(|m| {
                let (sku, name) = products
                    .get(&m.product_id)
                    .map(|(s, n)| (Some(s.clone()), Some(n.clone())))
                    .unwrap_or((None, None));
                MovementResponse {
                    id: m.id,
                    product_id: m.product_id,
                    product_sku: sku,
                    product_name: name,
                    direction: m.direction,
                    qty: m.qty,
                    description: m.description,
                    user_id: m.user_id,
                    user_name: users.get(&m.user_id).cloned(),
                    created_at: m.created_at,
                    stock_after: None,
                }
            })
            .collect())
    }
}
