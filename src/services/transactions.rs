use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as ProductEntity},
        stock_movement::{self, MovementDirection},
        transaction::{self, ActiveModel as TransactionActiveModel, Entity as TransactionEntity},
        transaction_item::{self, Entity as TransactionItemEntity},
        user::{self, Entity as UserEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionItemRequest {
    pub product_id: Uuid,
    pub qty: i32,
    /// Optional per-line price override; defaults to the product's sell price.
    pub price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionRequest {
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<TransactionItemRequest>,
    pub discount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub cashier_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub qty: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub transaction_no: String,
    pub total: Decimal,
    pub discount: Decimal,
    pub payment_method: String,
    pub notes: Option<String>,
    pub cashier_id: Uuid,
    pub cashier_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TransactionItemResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TodaySummaryResponse {
    pub transactions: Vec<TransactionResponse>,
    pub count: u64,
    pub total: Decimal,
}

const DEFAULT_PAYMENT_METHOD: &str = "tunai";

/// Sale engine. A sale is all-or-nothing: stock decrements, the header, its
/// line items and the ledger rows land in one database transaction or not at
/// all. Stock decrements are guarded (`stock >= qty`) so stock can never go
/// negative under concurrent sales.
#[derive(Clone)]
pub struct TransactionService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl TransactionService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(cashier_id = %request.cashier_id, item_count = request.items.len()))]
    pub async fn create_transaction(
        &self,
        request: CreateTransactionRequest,
    ) -> Result<TransactionResponse, ServiceError> {
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for sale creation");
            ServiceError::DatabaseError(e)
        })?;

        let response = Self::create_transaction_on(&txn, request).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit sale creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(transaction_id = %response.id, transaction_no = %response.transaction_no, total = %response.total, "Transaction created");

        if let Some(event_sender) = &self.event_sender {
            let event = Event::TransactionCreated {
                transaction_id: response.id,
                total: response.total,
            };
            if let Err(e) = event_sender.send(event).await {
                warn!(error = %e, transaction_id = %response.id, "Failed to send transaction created event");
            }
        }

        Ok(response)
    }

    /// Creates the sale on an existing connection so callers (notably the
    /// open-order checkout) can compose it with their own writes in a single
    /// database transaction.
    pub(crate) async fn create_transaction_on<C: ConnectionTrait>(
        conn: &C,
        request: CreateTransactionRequest,
    ) -> Result<TransactionResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        for item in &request.items {
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
        }

        let discount = request.discount.unwrap_or(Decimal::ZERO);
        if discount.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Discount cannot be negative".into(),
            ));
        }

        let cashier = UserEntity::find_by_id(request.cashier_id)
            .one(conn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch cashier");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cashier {} not found", request.cashier_id))
            })?;

        let now = Utc::now();
        let transaction_id = Uuid::new_v4();
        let transaction_no = generate_transaction_no();

        let mut line_items: Vec<transaction_item::Model> = Vec::with_capacity(request.items.len());
        let mut subtotal_sum = Decimal::ZERO;

        for item in &request.items {
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

            // Guarded decrement: the filter on stock >= qty makes overselling
            // impossible even when two sales race on the same product.
            let update = ProductEntity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(item.qty),
                )
                .filter(product::Column::Id.eq(item.product_id))
                .filter(product::Column::Stock.gte(item.qty))
                .exec(conn)
                .await
                .map_err(|e| {
                    error!(error = %e, product_id = %item.product_id, "Failed to decrement stock");
                    ServiceError::DatabaseError(e)
                })?;

            if update.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "{}: stock {}, requested {}",
                    product.name, product.stock, item.qty
                )));
            }

            let price = item.price.unwrap_or(product.sell_price);
            let subtotal = price * Decimal::from(item.qty);
            subtotal_sum += subtotal;

            line_items.push(transaction_item::Model {
                id: Uuid::new_v4(),
                transaction_id,
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
        let total = subtotal_sum - discount;

        let payment_method = request
            .payment_method
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());

        let header = TransactionActiveModel {
            id: Set(transaction_id),
            transaction_no: Set(transaction_no.clone()),
            total: Set(total),
            discount: Set(discount),
            payment_method: Set(payment_method),
            notes: Set(request.notes),
            cashier_id: Set(request.cashier_id),
            created_at: Set(now),
        };

        let header = header.insert(conn).await.map_err(|e| {
            error!(error = %e, transaction_id = %transaction_id, "Failed to insert transaction header");
            ServiceError::DatabaseError(e)
        })?;

        for line in &line_items {
            let item_model = transaction_item::ActiveModel {
                id: Set(line.id),
                transaction_id: Set(line.transaction_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                qty: Set(line.qty),
                price: Set(line.price),
                subtotal: Set(line.subtotal),
            };
            item_model.insert(conn).await.map_err(|e| {
                error!(error = %e, transaction_id = %transaction_id, "Failed to insert transaction item");
                ServiceError::DatabaseError(e)
            })?;

            let movement = stock_movement::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(line.product_id),
                direction: Set(MovementDirection::Out),
                qty: Set(line.qty),
                description: Set(format!("Penjualan {}", transaction_no)),
                user_id: Set(request.cashier_id),
                created_at: Set(now),
            };
            movement.insert(conn).await.map_err(|e| {
                error!(error = %e, transaction_id = %transaction_id, "Failed to insert stock movement");
                ServiceError::DatabaseError(e)
            })?;
        }

        Ok(TransactionResponse {
            id: header.id,
            transaction_no: header.transaction_no,
            total: header.total,
            discount: header.discount,
            payment_method: header.payment_method,
            notes: header.notes,
            cashier_id: header.cashier_id,
            cashier_name: Some(cashier.full_name),
            created_at: header.created_at,
            items: line_items
                .into_iter()
                .map(|line| TransactionItemResponse {
                    id: line.id,
                    product_id: line.product_id,
                    product_name: line.product_name,
                    qty: line.qty,
                    price: line.price,
                    subtotal: line.subtotal,
                })
                .collect(),
        })
    }

    /// Lists transactions newest first with their items and cashier names.
    /// `start`/`end` bound the window by local calendar day, end inclusive.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        page: u64,
        per_page: u64,
    ) -> Result<TransactionListResponse, ServiceError> {
        let db = &*self.db_pool;

        let mut query = TransactionEntity::find();
        if let Some(start) = start {
            let (from, _) = local_day_bounds(start)?;
            query = query.filter(transaction::Column::CreatedAt.gte(from));
        }
        if let Some(end) = end {
            let (_, to) = local_day_bounds(end)?;
            query = query.filter(transaction::Column::CreatedAt.lt(to));
        }

        let paginator = query
            .order_by_desc(transaction::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count transactions");
            ServiceError::DatabaseError(e)
        })?;

        let headers = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, page = page, "Failed to fetch transactions page");
            ServiceError::DatabaseError(e)
        })?;

        let transactions = self.attach_details(headers).await?;

        Ok(TransactionListResponse {
            transactions,
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    pub async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<TransactionResponse>, ServiceError> {
        let db = &*self.db_pool;

        let header = TransactionEntity::find_by_id(transaction_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, transaction_id = %transaction_id, "Failed to fetch transaction");
                ServiceError::DatabaseError(e)
            })?;

        match header {
            Some(header) => {
                let mut detailed = self.attach_details(vec![header]).await?;
                Ok(detailed.pop())
            }
            None => Ok(None),
        }
    }

    /// Today's sales: local-midnight-to-midnight window, plus count and sum.
    #[instrument(skip(self))]
    pub async fn today_summary(&self) -> Result<TodaySummaryResponse, ServiceError> {
        let db = &*self.db_pool;

        let today = Local::now().date_naive();
        let (from, to) = local_day_bounds(today)?;

        let headers = TransactionEntity::find()
            .filter(transaction::Column::CreatedAt.gte(from))
            .filter(transaction::Column::CreatedAt.lt(to))
            .order_by_desc(transaction::Column::CreatedAt)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch today's transactions");
                ServiceError::DatabaseError(e)
            })?;

        let total: Decimal = headers.iter().map(|t| t.total).sum();
        let count = headers.len() as u64;
        let transactions = self.attach_details(headers).await?;

        Ok(TodaySummaryResponse {
            transactions,
            count,
            total,
        })
    }

    /// Resolves items and cashier display names for a page of headers.
    async fn attach_details(
        &self,
        headers: Vec<transaction::Model>,
    ) -> Result<Vec<TransactionResponse>, ServiceError> {
        let db = &*self.db_pool;

        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = headers.iter().map(|t| t.id).collect();
        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.is_in(ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch transaction items");
                ServiceError::DatabaseError(e)
            })?;

        let mut items_by_transaction: HashMap<Uuid, Vec<transaction_item::Model>> = HashMap::new();
        for item in items {
            items_by_transaction
                .entry(item.transaction_id)
                .or_default()
                .push(item);
        }

        let cashier_ids: Vec<Uuid> = headers.iter().map(|t| t.cashier_id).collect();
        let cashiers: HashMap<Uuid, String> = UserEntity::find()
            .filter(user::Column::Id.is_in(cashier_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch cashiers");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|u| (u.id, u.full_name))
            .collect();

        Ok(headers
            .into_iter()
            .map(|header| {
                let items = items_by_transaction
                    .remove(&header.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|line| TransactionItemResponse {
                        id: line.id,
                        product_id: line.product_id,
                        product_name: line.product_name,
                        qty: line.qty,
                        price: line.price,
                        subtotal: line.subtotal,
                    })
                    .collect();
                TransactionResponse {
                    id: header.id,
                    transaction_no: header.transaction_no,
                    total: header.total,
                    discount: header.discount,
                    payment_method: header.payment_method,
                    notes: header.notes,
                    cashier_id: header.cashier_id,
                    cashier_name: cashiers.get(&header.cashier_id).cloned(),
                    created_at: header.created_at,
                    items,
                }
            })
            .collect())
    }
}

/// Generates a `TRX-YYYYMMDD-<token>` number. Uniqueness is enforced by the
/// unique index on transaction_no; the random suffix makes collisions
/// vanishingly rare.
fn generate_transaction_no() -> String {
    let date = Local::now().format("%Y%m%d");
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("TRX-{}-{}", date, token)
}

/// UTC bounds `[start, end)` of a local calendar day. Fails on local times
/// that do not exist (DST transitions).
pub(crate) fn local_day_bounds(
    date: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let next = date
        .succ_opt()
        .ok_or_else(|| ServiceError::InvalidOperation("Date out of range".into()))?;

    let start = to_utc_midnight(date)?;
    let end = to_utc_midnight(next)?;
    Ok((start, end))
}

fn to_utc_midnight(date: NaiveDate) -> Result<DateTime<Utc>, ServiceError> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ServiceError::InternalError("Invalid midnight timestamp".into()))?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            ServiceError::InvalidOperation(format!("Local midnight does not exist on {}", date))
        })
}

/// UTC bounds `[start, end)` of the local calendar month containing `date`.
pub(crate) fn local_month_bounds(
    date: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .ok_or_else(|| ServiceError::InternalError("Invalid month start".into()))?;
    let next_first = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
    .ok_or_else(|| ServiceError::InternalError("Invalid month end".into()))?;

    Ok((to_utc_midnight(first)?, to_utc_midnight(next_first)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transaction_no_shape() {
        let no = generate_transaction_no();
        assert!(no.starts_with("TRX-"));
        let parts: Vec<&str> = no.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn day_bounds_cover_exactly_one_day() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let (start, end) = local_day_bounds(date).unwrap();
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    #[test]
    fn month_bounds_handle_december() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 15).unwrap();
        let (start, end) = local_month_bounds(date).unwrap();
        assert!(start < end);
        assert_eq!(end - start, chrono::Duration::days(31));
    }

    #[test]
    fn empty_items_fail_validation() {
        let request = CreateTransactionRequest {
            items: vec![],
            discount: None,
            payment_method: None,
            notes: None,
            cashier_id: Uuid::new_v4(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn subtotal_arithmetic_is_exact() {
        let price = dec!(1500.50);
        let subtotal = price * Decimal::from(3);
        assert_eq!(subtotal, dec!(4501.50));
    }
}
