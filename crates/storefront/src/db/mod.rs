//! Persistence for the storefront.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `stores` - Vendor stores
//! - `products` - Catalog with live `available_quantity` (never negative)
//! - `users` / `profiles` - Registered accounts and their roles
//! - `orders` / `order_items` - Placed orders; `cart_token` is unique
//! - `reviews` - One per `(product_id, user_id)`
//! - `tower_sessions.session` - Session records (created by the session store)
//!
//! # Stores
//!
//! Services talk to persistence through the [`CatalogStore`], [`StockLedger`],
//! [`OrderStore`] and [`ReviewStore`] traits. [`PgStore`] is the production
//! implementation; [`MemoryStore`] keeps everything behind one async mutex and
//! serves tests and local experiments.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p bazaar-cli -- migrate
//! ```

pub mod memory;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod users;

use std::future::Future;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bazaar_core::{Email, OrderId, OrderNumber, OrderStatus, ProductId, ReviewId, UserId};

use crate::models::{
    InsufficientStock, NewReview, Order, OrderDraft, OrderSummary, Product, Review, ReviewCandidate,
};

pub use memory::MemoryStore;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use reviews::ReviewRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A value does not fit the column it is written to.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// The backing store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why an order could not be placed.
///
/// Every variant leaves stock and orders exactly as they were before the
/// attempt.
#[derive(Debug, Error)]
pub enum PlaceOrderError {
    /// A line could not be reserved; earlier reservations were rolled back.
    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),

    /// An order was already placed from this cart.
    #[error("cart was already checked out")]
    DuplicateCart,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Why a standalone stock reservation failed.
#[derive(Debug, Error)]
pub enum StockError {
    #[error(transparent)]
    Insufficient(#[from] InsufficientStock),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Read access to the product catalog.
pub trait CatalogStore: Send + Sync {
    /// Look up one product, active or not.
    fn product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, RepositoryError>> + Send;

    /// Look up several products. Unknown ids are skipped; order is unspecified.
    fn products(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<Product>, RepositoryError>> + Send;
}

/// Authoritative available quantities.
///
/// `reserve_and_decrement` is a single atomic check-and-decrement: concurrent
/// callers can never drive a quantity below zero, and two callers racing for
/// the last unit see exactly one success.
pub trait StockLedger: Send + Sync {
    /// Take `quantity` units of an active product, or fail without change.
    fn reserve_and_decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<u32, StockError>> + Send;

    /// Return `quantity` units to a product, yielding the new available count.
    fn restock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<u32, RepositoryError>> + Send;
}

/// Order persistence.
pub trait OrderStore: Send + Sync {
    /// Reserve stock for every draft line and insert the order with its items,
    /// all in one transaction.
    fn place_order(
        &self,
        draft: &OrderDraft,
    ) -> impl Future<Output = Result<Order, PlaceOrderError>> + Send;

    fn order_by_number(
        &self,
        number: &OrderNumber,
    ) -> impl Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// Orders placed under `buyer_id`, newest first. Skips `offset` orders and
    /// returns at most `limit`.
    fn orders_for_buyer(
        &self,
        buyer_id: UserId,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<OrderSummary>, RepositoryError>> + Send;

    /// Compare-and-set the status: only succeeds while the stored status is
    /// still `from`. Returns `false` when another writer got there first.
    fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Review persistence and the purchase lookup used to verify them.
pub trait ReviewStore: Send + Sync {
    fn review_exists(
        &self,
        product_id: ProductId,
        user_id: UserId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Whether any order containing `product_id` was placed by `user_id`, or
    /// as a guest under an email matching `email` case-insensitively.
    fn has_purchased(
        &self,
        product_id: ProductId,
        user_id: UserId,
        email: Option<&Email>,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Insert a review. A second review for the same product and user is a
    /// [`RepositoryError::Conflict`].
    fn insert_review(
        &self,
        review: &NewReview,
    ) -> impl Future<Output = Result<Review, RepositoryError>> + Send;

    fn reviews_for_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<Review>, RepositoryError>> + Send;

    /// Unverified reviews with id greater than `after`, ascending by id.
    fn unverified_reviews(
        &self,
        after: Option<ReviewId>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ReviewCandidate>, RepositoryError>> + Send;

    /// Set the verified flag. Returns `false` if the review was already
    /// verified (or no longer exists).
    fn mark_verified(
        &self,
        id: ReviewId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Everything the HTTP layer needs from persistence.
pub trait Backend:
    CatalogStore + StockLedger + OrderStore + ReviewStore + Clone + 'static
{
    /// Cheap connectivity probe for readiness checks.
    fn ping(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// `PostgreSQL`-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CatalogStore for PgStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get(id).await
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get_many(ids).await
    }
}

impl StockLedger for PgStore {
    async fn reserve_and_decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32, StockError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(products::reserve_and_decrement(&mut conn, product_id, quantity).await?)
    }

    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<u32, RepositoryError> {
        ProductRepository::new(&self.pool)
            .restock(product_id, quantity)
            .await
    }
}

impl OrderStore for PgStore {
    async fn place_order(&self, draft: &OrderDraft) -> Result<Order, PlaceOrderError> {
        OrderRepository::new(&self.pool).place(draft).await
    }

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get_by_number(number).await
    }

    async fn orders_for_buyer(
        &self,
        buyer_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .for_buyer(buyer_id, limit, offset)
            .await
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        OrderRepository::new(&self.pool)
            .update_status(id, from, to)
            .await
    }
}

impl ReviewStore for PgStore {
    async fn review_exists(
        &self,
        product_id: ProductId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        ReviewRepository::new(&self.pool)
            .exists(product_id, user_id)
            .await
    }

    async fn has_purchased(
        &self,
        product_id: ProductId,
        user_id: UserId,
        email: Option<&Email>,
    ) -> Result<bool, RepositoryError> {
        ReviewRepository::new(&self.pool)
            .has_purchased(product_id, user_id, email)
            .await
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        ReviewRepository::new(&self.pool).insert(review).await
    }

    async fn reviews_for_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        ReviewRepository::new(&self.pool)
            .for_product(product_id)
            .await
    }

    async fn unverified_reviews(
        &self,
        after: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<ReviewCandidate>, RepositoryError> {
        ReviewRepository::new(&self.pool)
            .unverified(after, limit)
            .await
    }

    async fn mark_verified(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        ReviewRepository::new(&self.pool).mark_verified(id).await
    }
}

impl Backend for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a domain quantity to the `INTEGER` column type.
pub(crate) fn quantity_to_db(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::OutOfRange(format!("quantity {quantity} exceeds column range")))
}

/// Convert an `INTEGER` column back to a domain quantity.
pub(crate) fn quantity_from_db(column: &str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Convert a `NUMERIC` column to a price.
pub(crate) fn price_from_db(
    column: &str,
    value: rust_decimal::Decimal,
) -> Result<bazaar_core::Price, RepositoryError> {
    bazaar_core::Price::new(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {column}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_conversions() {
        assert_eq!(quantity_to_db(5).ok(), Some(5));
        assert!(matches!(
            quantity_to_db(u32::MAX),
            Err(RepositoryError::OutOfRange(_))
        ));
        assert!(matches!(
            quantity_from_db("available_quantity", -1),
            Err(RepositoryError::DataCorruption(_))
        ));
    }
}
