mod common;

use assert_matches::assert_matches;
use common::{seed_product, seed_user, setup, ProductSeed};
use kasir_api::entities::{
    product::Entity as ProductEntity,
    stock_movement::{Entity as StockMovementEntity, MovementDirection},
    transaction::Entity as TransactionEntity,
    transaction_item::Entity as TransactionItemEntity,
};
use kasir_api::errors::ServiceError;
use kasir_api::services::transactions::{CreateTransactionRequest, TransactionItemRequest};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

fn sale_of(
    product_id: Uuid,
    qty: i32,
    cashier_id: Uuid,
    discount: Option<rust_decimal::Decimal>,
) -> CreateTransactionRequest {
    CreateTransactionRequest {
        items: vec![TransactionItemRequest {
            product_id,
            qty,
            price: None,
        }],
        discount,
        payment_method: None,
        notes: None,
        cashier_id,
    }
}

#[tokio::test]
async fn successful_sale_decrements_stock_and_appends_ledger() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "ani", "Ani Kasir").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            sell_price: dec!(1500),
            ..Default::default()
        },
    )
    .await;

    let response = services
        .transactions
        .create_transaction(sale_of(product.id, 3, cashier.id, None))
        .await
        .unwrap();

    assert_eq!(response.total, dec!(4500));
    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].subtotal, dec!(4500));
    assert_eq!(response.cashier_name.as_deref(), Some("Ani Kasir"));
    assert!(response.transaction_no.starts_with("TRX-"));
    assert_eq!(response.payment_method, "tunai");

    let stored = ProductEntity::find_by_id(product.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 7);

    let movements = StockMovementEntity::find().all(&*db).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].direction, MovementDirection::Out);
    assert_eq!(movements[0].qty, 3);
    assert_eq!(movements[0].product_id, product.id);
}

#[tokio::test]
async fn insufficient_stock_rejects_atomically() {
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

    let result = services
        .transactions
        .create_transaction(sale_of(product.id, 5, cashier.id, None))
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let stored = ProductEntity::find_by_id(product.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 2);
    assert!(TransactionEntity::find().all(&*db).await.unwrap().is_empty());
    assert!(TransactionItemEntity::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
    assert!(StockMovementEntity::find()
        .all(&*db)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn multi_item_failure_rolls_back_earlier_decrements() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "citra", "Citra").await;
    let plenty = seed_product(
        &db,
        ProductSeed {
            sku: "SKU-PLENTY".into(),
            stock: 10,
            ..Default::default()
        },
    )
    .await;
    let scarce = seed_product(
        &db,
        ProductSeed {
            sku: "SKU-SCARCE".into(),
            stock: 1,
            ..Default::default()
        },
    )
    .await;

    let request = CreateTransactionRequest {
        items: vec![
            TransactionItemRequest {
                product_id: plenty.id,
                qty: 2,
                price: None,
            },
            TransactionItemRequest {
                product_id: scarce.id,
                qty: 5,
                price: None,
            },
        ],
        discount: None,
        payment_method: None,
        notes: None,
        cashier_id: cashier.id,
    };

    let result = services.transactions.create_transaction(request).await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    // The decrement that already succeeded for the first item must be undone.
    let stored = ProductEntity::find_by_id(plenty.id)
        .one(&*db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 10);
}

#[tokio::test]
async fn discount_is_subtracted_and_bounded() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "dewi", "Dewi").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 10,
            sell_price: dec!(2000),
            ..Default::default()
        },
    )
    .await;

    let response = services
        .transactions
        .create_transaction(sale_of(product.id, 2, cashier.id, Some(dec!(500))))
        .await
        .unwrap();
    assert_eq!(response.total, dec!(3500));
    assert_eq!(response.discount, dec!(500));

    let result = services
        .transactions
        .create_transaction(sale_of(product.id, 1, cashier.id, Some(dec!(99999))))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn price_override_snapshots_into_items() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "eka", "Eka").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 5,
            sell_price: dec!(1500),
            ..Default::default()
        },
    )
    .await;

    let request = CreateTransactionRequest {
        items: vec![TransactionItemRequest {
            product_id: product.id,
            qty: 2,
            price: Some(dec!(1200)),
        }],
        discount: None,
        payment_method: Some("qris".into()),
        notes: Some("harga member".into()),
        cashier_id: cashier.id,
    };

    let response = services.transactions.create_transaction(request).await.unwrap();
    assert_eq!(response.items[0].price, dec!(1200));
    assert_eq!(response.total, dec!(2400));
    assert_eq!(response.payment_method, "qris");
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "fitri", "Fitri").await;
    let product = seed_product(&db, ProductSeed::default()).await;

    let result = services
        .transactions
        .create_transaction(sale_of(product.id, 0, cashier.id, None))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "gita", "Gita").await;

    let result = services
        .transactions
        .create_transaction(sale_of(Uuid::new_v4(), 1, cashier.id, None))
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn archived_product_cannot_be_sold() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "hana", "Hana").await;
    let product = seed_product(&db, ProductSeed::default()).await;
    services.products.archive_product(product.id).await.unwrap();

    let result = services
        .transactions
        .create_transaction(sale_of(product.id, 1, cashier.id, None))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn today_summary_reflects_todays_sales() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "indra", "Indra").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 20,
            sell_price: dec!(1000),
            ..Default::default()
        },
    )
    .await;

    services
        .transactions
        .create_transaction(sale_of(product.id, 2, cashier.id, None))
        .await
        .unwrap();
    services
        .transactions
        .create_transaction(sale_of(product.id, 3, cashier.id, None))
        .await
        .unwrap();

    let summary = services.transactions.today_summary().await.unwrap();
    assert_eq!(summary.count, 2);
    assert_eq!(summary.total, dec!(5000));
    assert_eq!(summary.transactions.len(), 2);
}

#[tokio::test]
async fn list_transactions_is_repeatable_and_detailed() {
    let (db, services) = setup().await;
    let cashier = seed_user(&db, "joko", "Joko").await;
    let product = seed_product(
        &db,
        ProductSeed {
            stock: 20,
            ..Default::default()
        },
    )
    .await;

    services
        .transactions
        .create_transaction(sale_of(product.id, 1, cashier.id, None))
        .await
        .unwrap();

    let first = services
        .transactions
        .list_transactions(None, None, 1, 20)
        .await
        .unwrap();
    let second = services
        .transactions
        .list_transactions(None, None, 1, 20)
        .await
        .unwrap();

    assert_eq!(first.total, 1);
    assert_eq!(second.total, 1);
    assert_eq!(first.transactions[0].id, second.transactions[0].id);
    assert_eq!(first.transactions[0].items.len(), 1);
    assert_eq!(first.transactions[0].cashier_name.as_deref(), Some("Joko"));
}
