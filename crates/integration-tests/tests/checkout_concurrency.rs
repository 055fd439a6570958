//! Racing checkouts and reservations against one stock ledger.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tower_sessions::{MemoryStore as SessionMemoryStore, Session};

use bazaar_core::{ProductId, TaxRate};
use bazaar_integration_tests::product;
use bazaar_storefront::db::{CatalogStore, MemoryStore, StockError, StockLedger};
use bazaar_storefront::services::{
    AddMode, CheckoutAbort, CheckoutOutcome, CheckoutRequest, CheckoutService, Notifier,
    SessionCart,
};

fn new_session() -> Session {
    Session::new(None, Arc::new(SessionMemoryStore::default()), None)
}

fn guest(n: usize) -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: format!("{n} Loop Rd"),
        name: Some(format!("Shopper {n}")),
        email: Some(format!("shopper{n}@example.com")),
        payment_method: None,
    }
}

async fn cart_in(session: Session, store: &MemoryStore, lines: &[(ProductId, u32)]) -> SessionCart {
    let mut cart = SessionCart::load(session).await.unwrap();
    for (id, quantity) in lines {
        let product = store.product(*id).await.unwrap().unwrap();
        cart.add(&product, *quantity, AddMode::Increment).await.unwrap();
    }
    cart
}

async fn checkout(
    store: &MemoryStore,
    cart: &mut SessionCart,
    request: CheckoutRequest,
) -> Result<CheckoutOutcome, CheckoutAbort> {
    let notifier = Notifier::Disabled;
    CheckoutService::new(store, &notifier, TaxRate::default(), Duration::from_secs(1))
        .checkout(cart, None, request)
        .await
}

#[tokio::test]
async fn test_last_unit_goes_to_exactly_one_checkout() {
    let store = MemoryStore::new();
    let lamp = product(&store, "Lamp", 4500, 1).await;

    let mut tasks = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut cart = cart_in(new_session(), &store, &[(lamp, 1)]).await;
            checkout(&store, &mut cart, guest(n)).await
        }));
    }

    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(CheckoutAbort::InsufficientStock { available, .. }) => assert_eq!(available, 0),
            Err(other) => panic!("unexpected abort: {other:?}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(store.available_quantity(lamp).await, 0);
    assert_eq!(store.order_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let store = MemoryStore::new();
    let mug = product(&store, "Mug", 1000, 3).await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.reserve_and_decrement(mug, 1).await }));
    }

    let mut granted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => granted += 1,
            Err(StockError::Insufficient(short)) => assert_eq!(short.requested, 1),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(granted, 3);
    assert_eq!(store.available_quantity(mug).await, 0);
}

#[tokio::test]
async fn test_short_line_leaves_every_quantity_untouched() {
    let store = MemoryStore::new();
    let mug = product(&store, "Mug", 1000, 5).await;
    let bowl = product(&store, "Bowl", 500, 2).await;
    let mut cart = cart_in(new_session(), &store, &[(mug, 2), (bowl, 2)]).await;

    // Someone else takes one bowl after it went into this cart.
    store.reserve_and_decrement(bowl, 1).await.unwrap();

    let abort = checkout(&store, &mut cart, guest(1)).await.unwrap_err();
    assert!(
        matches!(
            abort,
            CheckoutAbort::InsufficientStock { product_id, requested: 2, available: 1, .. } if product_id == bowl
        ),
        "{abort:?}"
    );
    assert_eq!(store.available_quantity(mug).await, 5);
    assert_eq!(store.available_quantity(bowl).await, 1);
    assert_eq!(store.order_count().await, 0);
    assert_eq!(cart.cart().total_quantity(), 4);
}

#[tokio::test]
async fn test_double_submit_places_one_order() {
    let store = MemoryStore::new();
    let mug = product(&store, "Mug", 1000, 5).await;
    let session = new_session();
    cart_in(session.clone(), &store, &[(mug, 2)]).await;

    // Two tabs submitting the same session's cart.
    let mut first = SessionCart::load(session.clone()).await.unwrap();
    let mut second = SessionCart::load(session).await.unwrap();
    let (a, b) = tokio::join!(
        checkout(&store, &mut first, guest(1)),
        checkout(&store, &mut second, guest(1)),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(CheckoutAbort::EmptyCart))),
        "the losing submit sees an empty cart"
    );
    assert_eq!(store.order_count().await, 1);
    assert_eq!(store.available_quantity(mug).await, 3);
}

#[tokio::test]
async fn test_persistence_failure_releases_reservations() {
    let store = MemoryStore::new();
    let mug = product(&store, "Mug", 1000, 5).await;
    let mut cart = cart_in(new_session(), &store, &[(mug, 2)]).await;
    store.fail_next_order().await;

    let abort = checkout(&store, &mut cart, guest(1)).await.unwrap_err();
    assert!(matches!(abort, CheckoutAbort::PersistenceFailure));
    assert_eq!(
        abort.user_message(),
        "Error processing your order. Please try again."
    );
    assert_eq!(store.available_quantity(mug).await, 5);
    assert!(!cart.cart().is_empty());

    // The same cart goes through once the store recovers.
    let outcome = checkout(&store, &mut cart, guest(1)).await.unwrap();
    assert_eq!(outcome.order.items.len(), 1);
    assert_eq!(store.available_quantity(mug).await, 3);
}
