use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub sku: String,

    pub name: String,
    pub category: Option<String>,
    /// Unit of measure, e.g. "pcs", "cup", "kg"
    pub unit: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
    /// Soft-delete flag; products referenced by ledger rows are never hard-deleted
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_item::Entity")]
    TransactionItem,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovement,
}

impl Related<super::transaction_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionItem.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovement.def()
    }
}

impl Model {
    /// Low-stock boundary is inclusive: a product sitting exactly at its
    /// minimum threshold already needs restocking.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

impl ActiveModelBehavior for ActiveModel {}
