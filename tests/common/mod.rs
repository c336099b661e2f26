#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kasir_api::db::{self, DbConfig, DbPool};
use kasir_api::entities::{product, user};
use kasir_api::services::AppServices;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

/// Fresh in-memory database with the real migrations applied. A single
/// connection is used so every query sees the same sqlite memory store.
pub async fn setup() -> (Arc<DbPool>, AppServices) {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(60),
        acquire_timeout: Duration::from_secs(5),
    };
    let pool = db::establish_connection_with_config(&config)
        .await
        .expect("failed to open in-memory database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let pool = Arc::new(pool);
    let services = AppServices::new(pool.clone(), None);
    (pool, services)
}

pub async fn seed_user(db: &DbPool, username: &str, full_name: &str) -> user::Model {
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        full_name: Set(full_name.to_string()),
        role: Set("kasir".to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed user")
}

pub struct ProductSeed {
    pub sku: String,
    pub name: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
}

impl Default for ProductSeed {
    fn default() -> Self {
        Self {
            sku: format!("SKU-{}", &Uuid::new_v4().to_string()[..8]),
            name: "Es Teh".to_string(),
            buy_price: Decimal::new(1000, 0),
            sell_price: Decimal::new(1500, 0),
            stock: 10,
            min_stock: 2,
        }
    }
}

pub async fn seed_product(db: &DbPool, seed: ProductSeed) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        sku: Set(seed.sku),
        name: Set(seed.name),
        category: Set(Some("minuman".to_string())),
        unit: Set("pcs".to_string()),
        buy_price: Set(seed.buy_price),
        sell_price: Set(seed.sell_price),
        stock: Set(seed.stock),
        min_stock: Set(seed.min_stock),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("failed to seed product")
}
