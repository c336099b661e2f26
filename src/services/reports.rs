use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as ProductEntity},
        stock_movement::{self, Entity as StockMovementEntity},
        transaction::{self, Entity as TransactionEntity},
        transaction_item::{self, Entity as TransactionItemEntity},
    },
    errors::ServiceError,
    services::transactions::{local_day_bounds, local_month_bounds},
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const TOP_PRODUCT_COUNT: usize = 5;
const RECENT_MOVEMENT_COUNT: usize = 10;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub product_name: String,
    pub qty_sold: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub today_revenue: Decimal,
    pub today_transaction_count: u64,
    pub month_revenue: Decimal,
    pub month_transaction_count: u64,
    pub active_product_count: u64,
    pub low_stock_count: u64,
    pub top_products: Vec<TopProduct>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub transaction_count: u64,
    pub items_sold: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SalesReport {
    pub days: Vec<DailySales>,
    pub total_revenue: Decimal,
    pub transaction_count: u64,
    pub average_transaction: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductSales {
    pub product_id: Uuid,
    pub product_name: String,
    pub qty_sold: i64,
    pub revenue: Decimal,
    pub transaction_count: u64,
    /// Margin at *current* catalog prices, not the snapshot at sale time.
    pub profit: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductReport {
    pub products: Vec<ProductSales>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecentMovement {
    pub id: Uuid,
    pub direction: stock_movement::MovementDirection,
    pub qty: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StockReportRow {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub stock: i32,
    pub min_stock: i32,
    pub value: Decimal,
    pub status: String,
    /// This product's 10 most recent ledger rows, newest first.
    pub recent_movements: Vec<RecentMovement>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StockReport {
    pub rows: Vec<StockReportRow>,
    pub total_value: Decimal,
}

/// Read-only aggregation over committed data. Reports never write and are
/// free to lag a concurrent sale by a moment.
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Today/month revenue and counts, catalog health, and the month's top
    /// sellers by quantity (ties broken by product id for determinism).
    #[instrument(skip(self))]
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ServiceError> {
        let db = &*self.db_pool;

        let today = Local::now().date_naive();
        let (day_from, day_to) = local_day_bounds(today)?;
        let (month_from, month_to) = local_month_bounds(today)?;

        let month_transactions = TransactionEntity::find()
            .filter(transaction::Column::CreatedAt.gte(month_from))
            .filter(transaction::Column::CreatedAt.lt(month_to))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch month transactions");
                ServiceError::DatabaseError(e)
            })?;

        let month_revenue: Decimal = month_transactions.iter().map(|t| t.total).sum();
        let month_count = month_transactions.len() as u64;

        let today_transactions: Vec<&transaction::Model> = month_transactions
            .iter()
            .filter(|t| t.created_at >= day_from && t.created_at < day_to)
            .collect();
        let today_revenue: Decimal = today_transactions.iter().map(|t| t.total).sum();
        let today_count = today_transactions.len() as u64;

        let products = ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch products");
                ServiceError::DatabaseError(e)
            })?;

        let active_product_count = products.len() as u64;
        let low_stock_count = products.iter().filter(|p| p.is_low_stock()).count() as u64;

        let month_ids: Vec<Uuid> = month_transactions.iter().map(|t| t.id).collect();
        let top_products = self.top_products_for(month_ids).await?;

        Ok(DashboardStats {
            today_revenue,
            today_transaction_count: today_count,
            month_revenue,
            month_transaction_count: month_count,
            active_product_count,
            low_stock_count,
            top_products,
        })
    }

    /// Revenue/count/items-sold per local calendar day over `[start, end]`.
    #[instrument(skip(self))]
    pub async fn sales_report(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SalesReport, ServiceError> {
        if end < start {
            return Err(ServiceError::ValidationError(
                "Report end date precedes start date".into(),
            ));
        }

        let db = &*self.db_pool;

        let (from, _) = local_day_bounds(start)?;
        let (_, to) = local_day_bounds(end)?;

        let transactions = TransactionEntity::find()
            .filter(transaction::Column::CreatedAt.gte(from))
            .filter(transaction::Column::CreatedAt.lt(to))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch transactions for sales report");
                ServiceError::DatabaseError(e)
            })?;

        let ids: Vec<Uuid> = transactions.iter().map(|t| t.id).collect();
        let items = if ids.is_empty() {
            Vec::new()
        } else {
            TransactionItemEntity::find()
                .filter(transaction_item::Column::TransactionId.is_in(ids))
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch items for sales report");
                    ServiceError::DatabaseError(e)
                })?
        };

        let mut qty_by_transaction: HashMap<Uuid, i64> = HashMap::new();
        for item in &items {
            *qty_by_transaction.entry(item.transaction_id).or_default() += item.qty as i64;
        }

        let mut buckets: HashMap<NaiveDate, DailySales> = HashMap::new();
        let mut total_revenue = Decimal::ZERO;
        for t in &transactions {
            let day = t.created_at.with_timezone(&Local).date_naive();
            let bucket = buckets.entry(day).or_insert_with(|| DailySales {
                date: day,
                revenue: Decimal::ZERO,
                transaction_count: 0,
                items_sold: 0,
            });
            bucket.revenue += t.total;
            bucket.transaction_count += 1;
            bucket.items_sold += qty_by_transaction.get(&t.id).copied().unwrap_or(0);
            total_revenue += t.total;
        }

        let mut days: Vec<DailySales> = buckets.into_values().collect();
        days.sort_by_key(|d| d.date);

        let transaction_count = transactions.len() as u64;
        let average_transaction = if transaction_count == 0 {
            Decimal::ZERO
        } else {
            total_revenue / Decimal::from(transaction_count)
        };

        Ok(SalesReport {
            days,
            total_revenue,
            transaction_count,
            average_transaction,
        })
    }

    /// Per-product sales over an optional day range. Profit uses the
    /// product's current buy/sell prices rather than historic snapshots.
    #[instrument(skip(self))]
    pub async fn product_report(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<ProductReport, ServiceError> {
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

        let transactions = query.all(db).await.map_err(|e| {
            error!(error = %e, "Failed to fetch transactions for product report");
            ServiceError::DatabaseError(e)
        })?;

        let ids: Vec<Uuid> = transactions.iter().map(|t| t.id).collect();
        if ids.is_empty() {
            return Ok(ProductReport {
                products: Vec::new(),
            });
        }

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.is_in(ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch items for product report");
                ServiceError::DatabaseError(e)
            })?;

        struct Acc {
            name: String,
            qty: i64,
            revenue: Decimal,
            transactions: HashSet<Uuid>,
        }

        let mut by_product: HashMap<Uuid, Acc> = HashMap::new();
        for item in items {
            let acc = by_product.entry(item.product_id).or_insert_with(|| Acc {
                name: item.product_name.clone(),
                qty: 0,
                revenue: Decimal::ZERO,
                transactions: HashSet::new(),
            });
            acc.qty += item.qty as i64;
            acc.revenue += item.subtotal;
            acc.transactions.insert(item.transaction_id);
        }

        let product_ids: Vec<Uuid> = by_product.keys().copied().collect();
        let margins: HashMap<Uuid, Decimal> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch products for product report");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|p| (p.id, p.sell_price - p.buy_price))
            .collect();

        let mut products: Vec<ProductSales> = by_product
            .into_iter()
            .map(|(product_id, acc)| {
                let margin = margins.get(&product_id).copied().unwrap_or(Decimal::ZERO);
                ProductSales {
                    product_id,
                    product_name: acc.name,
                    qty_sold: acc.qty,
                    revenue: acc.revenue,
                    transaction_count: acc.transactions.len() as u64,
                    profit: margin * Decimal::from(acc.qty),
                }
            })
            .collect();

        products.sort_by(|a, b| {
            b.qty_sold
                .cmp(&a.qty_sold)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });

        Ok(ProductReport { products })
    }

    /// Inventory valuation: stock, reorder status, value and the 10 most
    /// recent ledger rows per active product.
    #[instrument(skip(self))]
    pub async fn stock_report(&self) -> Result<StockReport, ServiceError> {
        let db = &*self.db_pool;

        let products = ProductEntity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch products for stock report");
                ServiceError::DatabaseError(e)
            })?;

        let product_ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let movements = if product_ids.is_empty() {
            Vec::new()
        } else {
            StockMovementEntity::find()
                .filter(stock_movement::Column::ProductId.is_in(product_ids))
                .order_by_desc(stock_movement::Column::CreatedAt)
                .all(db)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to fetch recent movements");
                    ServiceError::DatabaseError(e)
                })?
        };

        let mut recent_by_product: HashMap<Uuid, Vec<RecentMovement>> = HashMap::new();
        for m in movements {
            let bucket = recent_by_product.entry(m.product_id).or_default();
            if bucket.len() < RECENT_MOVEMENT_COUNT {
                bucket.push(RecentMovement {
                    id: m.id,
                    direction: m.direction,
                    qty: m.qty,
                    description: m.description,
                    created_at: m.created_at,
                });
            }
        }

        let mut total_value = Decimal::ZERO;
        let rows: Vec<StockReportRow> = products
            .into_iter()
            .map(|p| {
                let value = p.buy_price * Decimal::from(p.stock);
                total_value += value;
                let status = if p.is_low_stock() { "low" } else { "normal" };
                StockReportRow {
                    product_id: p.id,
                    sku: p.sku,
                    name: p.name,
                    stock: p.stock,
                    min_stock: p.min_stock,
                    value,
                    status: status.to_string(),
                    recent_movements: recent_by_product.remove(&p.id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(StockReport { rows, total_value })
    }

    /// Top sellers by quantity within the given set of transactions.
    async fn top_products_for(
        &self,
        transaction_ids: Vec<Uuid>,
    ) -> Result<Vec<TopProduct>, ServiceError> {
        let db = &*self.db_pool;

        if transaction_ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = TransactionItemEntity::find()
            .filter(transaction_item::Column::TransactionId.is_in(transaction_ids))
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch items for top products");
                ServiceError::DatabaseError(e)
            })?;

        let mut by_product: HashMap<Uuid, (String, i64)> = HashMap::new();
        for item in items {
            let entry = by_product
                .entry(item.product_id)
                .or_insert_with(|| (item.product_name.clone(), 0));
            entry.1 += item.qty as i64;
        }

        let mut ranked: Vec<TopProduct> = by_product
            .into_iter()
            .map(|(product_id, (product_name, qty_sold))| TopProduct {
                product_id,
                product_name,
                qty_sold,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.qty_sold
                .cmp(&a.qty_sold)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked.truncate(TOP_PRODUCT_COUNT);

        Ok(ranked)
    }
}
