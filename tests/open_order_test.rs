mod common;

use assert_matches::assert_matches;
use common::{seed_product, seed_user, setup, ProductSeed};
use kasir_api::entities::{
    open_order::OpenOrderStatus, product::Entity as ProductEntity,
    transaction::Entity as TransactionEntity,
};
use kasir_api::errors::ServiceError;
use kasir_api::services::open_orders::{
    CreateOpenOrderRequest, OpenOrderItemRequest, SendOpenOrderRequest,
};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn order_for(product_id: Uuid, qty: i32) -> CreateOpenOrderRequest {
    CreateOpenOrderRequest {
        customer_name: "Meja 4".into(),
        items: vec![OpenOrderItemRequest {
            product_id,
            qty,
            price: None,
        }],
        discount: None,
    }
}

fn send_by(cashier_id: Uuid) -> SendOpenOrderRequest {
    SendOpenOrderRequest {
        cashier_id,
        payment_method: None,
        notes: None,
    }
}

#[tokio::test]
async fn staging_snapshots_prices_without_touching_stock() {
    let (db, services) = setup().await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            sell_price: dec!(1500),
            ..Default::default()
        },
    )
    .await;

    let order = services
        .open_orders
        .create_open_order(order_for(product.id, 4))
        .await
        .unwrap();

    assert_eq!(order.status, OpenOrderStatus::Open);
    assert_eq!(order.total, dec!(6000));
    assert_eq!(order.items[0].product_name, "Es Teh");
    assert_eq!(order.items[0].price, dec!(1500));

    // Parking the cart must not reserve or decrement stock.
    let stored = ProductEntity::find_by_id(product.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 10);

    let open = services.open_orders.list_open().await.unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn update_recomputes_totals_while_open() {
    let (db, services) = setup().await;
    let product = seed_product(
        &db,
        ProductSeed {
            sell_price: dec!(2000),
            ..Default::default()
        },
    )
    .await;

    let order = services
        .open_orders
        .create_open_order(order_for(product.id, 1))
        .await
        .unwrap();

    let updated = services
        .open_orders
        .update_open_order(
            order.id,
            CreateOpenOrderRequest {
                customer_name: "Meja 7".into(),
                items: vec![OpenOrderItemRequest {
                    product_id: product.id,
                    qty: 3,
                    price: None,
                }],
                discount: Some(dec!(1000)),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.customer_name, "Meja 7");
    assert_eq!(updated.total, dec!(5000));
    assert_eq!(updated.discount, dec!(1000));
}

#[tokio::test]
async fn send_creates_sale_and_flips_status_exactly_once() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "ani", "Ani").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            sell_price: dec!(1500),
            ..Default::default()
        },
    )
    .await;

    let order = services
        .open_orders
        .create_open_order(order_for(product.id, 4))
        .await
        .unwrap();

    let sent = services
        .open_orders
        .send_open_order(order.id, send_by(cashier.id))
        .await
        .unwrap();

    assert_eq!(sent.open_order.status, OpenOrderStatus::Sent);
    assert_eq!(sent.open_order.transaction_id, Some(sent.transaction.id));
    assert_eq!(sent.transaction.total, dec!(6000));

    let stored = ProductEntity::find_by_id(product.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 6);

    // Sent orders leave the open listing but stay retrievable by id.
    assert!(services.open_orders.list_open().await.unwrap().is_empty());
    let fetched = services
        .open_orders
        .get_open_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.status, OpenOrderStatus::Sent);

    // A second send must not create a second sale.
    let again = services
        .open_orders
        .send_open_order(order.id, send_by(cashier.id))
        .await;
    assert_matches!(again, Err(ServiceError::InvalidOperation(_)));
    assert_eq!(TransactionEntity::find().all(&*db).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_send_leaves_order_open_and_stock_intact() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "budi", "Budi").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 2,
            ..Default::default()
        },
    )
    .await;

    let order = services
        .open_orders
        .create_open_order(order_for(product.id, 5))
        .await
        .unwrap();

    let result = services
        .open_orders
        .send_open_order(order.id, send_by(cashier.id))
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let fetched = services
        .open_orders
        .get_open_order(order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.status, OpenOrderStatus::Open);
    assert_eq!(fetched.transaction_id, None);

    let stored = ProductEntity::find_by_id(product.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 2);
    assert!(TransactionEntity::find().all(&*db).await.unwrap().is_empty());
}

#[tokio::test]
async fn sent_orders_cannot_be_edited_or_deleted() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "citra", "Citra").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            ..Default::default()
        },
    )
    .await;

    let order = services
        .open_orders
        .create_open_order(order_for(product.id, 1))
        .await
        .unwrap();
    services
        .open_orders
        .send_open_order(order.id, send_by(cashier.id))
        .await
        .unwrap();

    let update = services
        .open_orders
        .update_open_order(order.id, order_for(product.id, 2))
        .await;
    assert_matches!(update, Err(ServiceError::InvalidOperation(_)));

    let delete = services.open_orders.delete_open_order(order.id).await;
    assert_matches!(delete, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn open_orders_can_be_deleted() {
    let (db, services) = setup().await;
    let product = seed_product(&db, ProductSeed::default()).await;

    let order = services
        .open_orders
        .create_open_order(order_for(product.id, 1))
        .await
        .unwrap();

    services
        .open_orders
        .delete_open_order(order.id)
        .await
        .unwrap();

    assert!(services
        .open_orders
        .get_open_order(order.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn missing_order_is_not_found() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "dewi", "Dewi").await;
    let _ = db;

    let result = services
        .open_orders
        .send_open_order(Uuid::new_v4(), send_by(cashier.id))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}
