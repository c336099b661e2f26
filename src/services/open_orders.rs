use crate::{
    db::DbPool,
    entities::{
        open_order::{self, ActiveModel as OpenOrderActiveModel, Entity as OpenOrderEntity,
            OpenOrderStatus},
        product::Entity as ProductEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::transactions::{
        CreateTransactionRequest, TransactionItemRequest, TransactionResponse, TransactionService,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenOrderItemRequest {
    pub product_id: Uuid,
    pub qty: i32,
    /// Optional price override; defaults to the product's current sell price.
    pub price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOpenOrderRequest {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<OpenOrderItemRequest>,
    pub discount: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendOpenOrderRequest {
    pub cashier_id: Uuid,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// Cart line as persisted in the open order's JSON items column.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenOrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub qty: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenOrderResponse {
    pub id: Uuid,
    pub customer_name: String,
    pub items: Vec<OpenOrderLine>,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: OpenOrderStatus,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendOpenOrderResponse {
    pub open_order: OpenOrderResponse,
    pub transaction: TransactionResponse,
}

/// Staged orders ("nota gantung"): carts parked under a customer name before
/// payment. Staging never touches stock; stock is only decremented when the
/// order is sent to the sale engine.
#[derive(Clone)]
pub struct OpenOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OpenOrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(customer = %request.customer_name))]
    pub async fn create_open_order(
        &self,
        request: CreateOpenOrderRequest,
    ) -> Result<OpenOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let (lines, discount, total) =
            resolve_lines(db, &request.items, request.discount).await?;

        let order_id = Uuid::new_v4();
        let model = OpenOrderActiveModel {
            id: Set(order_id),
            customer_name: Set(request.customer_name),
            items: Set(lines_to_json(&lines)?),
            discount: Set(discount),
            total: Set(total),
            status: Set(OpenOrderStatus::Open),
            transaction_id: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };

        let order = model.insert(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create open order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, total = %total, "Open order created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OpenOrderCreated(order_id)).await {
                warn!(error = %e, order_id = %order_id, "Failed to send open order created event");
            }
        }

        model_to_response(order)
    }

    /// Replaces the cart of an order that is still `open`.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn update_open_order(
        &self,
        order_id: Uuid,
        request: CreateOpenOrderRequest,
    ) -> Result<OpenOrderResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let order = find_order(db, order_id).await?;
        if order.status != OpenOrderStatus::Open {
            return Err(ServiceError::InvalidOperation(
                "Open order has already been sent".into(),
            ));
        }

        let (lines, discount, total) =
            resolve_lines(db, &request.items, request.discount).await?;

        let mut active: OpenOrderActiveModel = order.into();
        active.customer_name = Set(request.customer_name);
        active.items = Set(lines_to_json(&lines)?);
        active.discount = Set(discount);
        active.total = Set(total);
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to update open order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Open order updated");

        model_to_response(updated)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_open_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<OpenOrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let order = OpenOrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch open order");
                ServiceError::DatabaseError(e)
            })?;

        order.map(model_to_response).transpose()
    }

    /// Lists orders still awaiting checkout, newest first. Sent orders drop
    /// out of this listing but remain retrievable by id.
    #[instrument(skip(self))]
    pub async fn list_open(&self) -> Result<Vec<OpenOrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let orders = OpenOrderEntity::find()
            .filter(open_order::Column::Status.eq(OpenOrderStatus::Open))
            .order_by_desc(open_order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list open orders");
                ServiceError::DatabaseError(e)
            })?;

        orders.into_iter().map(model_to_response).collect()
    }

    /// Hard-deletes an order that is still `open`. Sent orders are history
    /// and cannot be removed.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_open_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let order = find_order(db, order_id).await?;
        if order.status != OpenOrderStatus::Open {
            return Err(ServiceError::InvalidOperation(
                "Sent orders cannot be deleted".into(),
            ));
        }

        order.delete(db).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to delete open order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Open order deleted");
        Ok(())
    }

    /// Checks an open order out through the sale engine. The status flip, the
    /// sale header/items, the stock decrements and the ledger rows commit as
    /// one unit; on any failure the order stays `open` and untouched. The flip
    /// is a guarded update so a racing send can only succeed once.
    #[instrument(skip(self, request), fields(order_id = %order_id, cashier_id = %request.cashier_id))]
    pub async fn send_open_order(
        &self,
        order_id: Uuid,
        request: SendOpenOrderRequest,
    ) -> Result<SendOpenOrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for open order send");
            ServiceError::DatabaseError(e)
        })?;

        let order = find_order(&txn, order_id).await?;
        if order.status != OpenOrderStatus::Open {
            return Err(ServiceError::InvalidOperation(
                "Open order has already been sent".into(),
            ));
        }

        let flipped = OpenOrderEntity::update_many()
            .col_expr(
                open_order::Column::Status,
                sea_orm::sea_query::Expr::value(OpenOrderStatus::Sent),
            )
            .filter(open_order::Column::Id.eq(order_id))
            .filter(open_order::Column::Status.eq(OpenOrderStatus::Open))
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to flip open order status");
                ServiceError::DatabaseError(e)
            })?;

        if flipped.rows_affected == 0 {
            // Lost the race to another send.
            return Err(ServiceError::InvalidOperation(
                "Open order has already been sent".into(),
            ));
        }

        let lines = lines_from_json(&order.items)?;
        let sale_request = CreateTransactionRequest {
            items: lines
                .iter()
                .map(|line| TransactionItemRequest {
                    product_id: line.product_id,
                    qty: line.qty,
                    price: Some(line.price),
                })
                .collect(),
            discount: Some(order.discount),
            payment_method: request.payment_method,
            notes: request.notes,
            cashier_id: request.cashier_id,
        };

        let transaction = TransactionService::create_transaction_on(&txn, sale_request).await?;

        let mut active: OpenOrderActiveModel = order.into();
        active.status = Set(OpenOrderStatus::Sent);
        active.transaction_id = Set(Some(transaction.id));
        active.updated_at = Set(Some(Utc::now()));
        let order = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to link open order to transaction");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit open order send");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, transaction_id = %transaction.id, "Open order sent");

        if let Some(event_sender) = &self.event_sender {
            let event = Event::OpenOrderSent {
                open_order_id: order_id,
                transaction_id: transaction.id,
            };
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, order_id = %order_id, "Failed to send open order sent event");
            }
        }

        Ok(SendOpenOrderResponse {
            open_order: model_to_response(order)?,
            transaction,
        })
    }
}

async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<open_order::Model, ServiceError> {
    OpenOrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to fetch open order");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("Open order {} not found", order_id)))
}

/// Resolves cart lines against the catalog: snapshots names and prices and
/// computes subtotals/total. Staging intentionally does not check stock; that
/// happens when the order is sent.
async fn resolve_lines<C: ConnectionTrait>(
    conn: &C,
    items: &[OpenOrderItemRequest],
    discount: Option<Decimal>,
) -> Result<(Vec<OpenOrderLine>, Decimal, Decimal), ServiceError> {
    let discount = discount.unwrap_or(Decimal::ZERO);
    if discount.is_sign_negative() {
        return Err(ServiceError::ValidationError(
            "Discount cannot be negative".into(),
        ));
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut subtotal_sum = Decimal::ZERO;

    for item in items {
        if item.qty <= 0 {
            return Err(ServiceError::ValidationError(
                "Item quantity must be greater than zero".into(),
            ));
        }
        if let Some(price) = item.price {
            if price.is_sign_negative() {
                return Err(ServiceError::ValidationError(
                    "Item price cannot be negative".into(),
                ));
            }
        }

        let product = ProductEntity::find_by_id(item.product_id)
            .one(conn)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %item.product_id, "Failed to fetch product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product '{}' is archived",
                product.name
            )));
        }

        let price = item.price.unwrap_or(product.sell_price);
        let subtotal = price * Decimal::from(item.qty);
        subtotal_sum += subtotal;

        lines.push(OpenOrderLine {
            product_id: product.id,
            product_name: product.name,
            qty: item.qty,
            price,
            subtotal,
        });
    }

    if discount > subtotal_sum {
        return Err(ServiceError::ValidationError(format!(
            "Discount {} exceeds subtotal {}",
            discount, subtotal_sum
        )));
    }

    Ok((lines, discount, subtotal_sum - discount))
}

fn lines_to_json(lines: &[OpenOrderLine]) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(lines)
        .map_err(|e| ServiceError::InternalError(format!("Failed to serialize cart lines: {}", e)))
}

fn lines_from_json(value: &serde_json::Value) -> Result<Vec<OpenOrderLine>, ServiceError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ServiceError::InternalError(format!("Corrupt cart lines: {}", e)))
}

fn model_to_response(model: open_order::Model) -> Result<OpenOrderResponse, ServiceError> {
    let items = lines_from_json(&model.items)?;
    Ok(OpenOrderResponse {
        id: model.id,
        customer_name: model.customer_name,
        items,
        discount: model.discount,
        total: model.total,
        status: model.status,
        transaction_id: model.transaction_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn cart_lines_round_trip_through_json() {
        let lines = vec![OpenOrderLine {
            product_id: Uuid::new_v4(),
            product_name: "Kopi Susu".into(),
            qty: 2,
            price: dec!(12000),
            subtotal: dec!(24000),
        }];
        let json = lines_to_json(&lines).unwrap();
        let parsed = lines_from_json(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].subtotal, dec!(24000));
    }

    #[test]
    fn corrupt_cart_lines_are_an_internal_error() {
        let bad = serde_json::json!({"not": "an array"});
        assert!(lines_from_json(&bad).is_err());
    }
}
