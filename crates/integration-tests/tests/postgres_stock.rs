//! Stock ledger against a real database.
//!
//! These tests require:
//! - A `PostgreSQL` database migrated with `bazaar migrate`
//! - `STOREFRONT_DATABASE_URL` pointing at it
//!
//! Run with: `cargo test -p bazaar-integration-tests -- --ignored`

#![allow(clippy::unwrap_used, clippy::expect_used)]

use secrecy::SecretString;
use sqlx::PgPool;
use uuid::Uuid;

use bazaar_core::ProductId;
use bazaar_storefront::db::{PgStore, StockError, StockLedger, create_pool};

async fn pool() -> PgPool {
    let url = std::env::var("STOREFRONT_DATABASE_URL")
        .expect("STOREFRONT_DATABASE_URL must point at a migrated database");
    create_pool(&SecretString::from(url)).await.unwrap()
}

/// Insert a vendor, a store and one product with `stock` units.
async fn seed_product(pool: &PgPool, stock: i32) -> ProductId {
    let suffix = Uuid::new_v4();
    let vendor_id: i32 = sqlx::query_scalar(
        "INSERT INTO storefront.users (email, name) VALUES ($1, 'Vendor') RETURNING id",
    )
    .bind(format!("vendor-{suffix}@example.com"))
    .fetch_one(pool)
    .await
    .unwrap();
    let store_id: i32 = sqlx::query_scalar(
        "INSERT INTO storefront.stores (vendor_id, name) VALUES ($1, 'Test Store') RETURNING id",
    )
    .bind(vendor_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let product_id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO storefront.products (store_id, name, price, available_quantity)
        VALUES ($1, 'Lamp', 45.00, $2)
        RETURNING id
        ",
    )
    .bind(store_id)
    .bind(stock)
    .fetch_one(pool)
    .await
    .unwrap();
    ProductId::new(product_id)
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_concurrent_reservations_never_oversell() {
    let pool = pool().await;
    let lamp = seed_product(&pool, 3).await;
    let store = PgStore::new(pool);

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.reserve_and_decrement(lamp, 1).await }));
    }

    let mut granted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => granted += 1,
            Err(StockError::Insufficient(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(granted, 3);

    let remaining: i32 =
        sqlx::query_scalar("SELECT available_quantity FROM storefront.products WHERE id = $1")
            .bind(lamp.as_i32())
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
#[ignore = "requires a migrated PostgreSQL database"]
async fn test_restock_returns_units() {
    let pool = pool().await;
    let lamp = seed_product(&pool, 0).await;
    let store = PgStore::new(pool);

    assert!(matches!(
        store.reserve_and_decrement(lamp, 1).await,
        Err(StockError::Insufficient(_))
    ));
    assert_eq!(store.restock(lamp, 4).await.unwrap(), 4);
    assert_eq!(store.reserve_and_decrement(lamp, 4).await.unwrap(), 0);
}
