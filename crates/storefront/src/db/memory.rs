//! In-process store.
//!
//! All state lives behind a single `tokio::sync::Mutex`. Holding the lock for
//! the whole of [`OrderStore::place_order`] gives the same guarantee as the
//! row locks of the `PostgreSQL` transaction: reservations and the order insert
//! either all land or none do, and racing checkouts are serialized.
//!
//! Fault injection hooks are only compiled for tests and under the
//! `test-support` feature.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use bazaar_core::{
    Email, OrderId, OrderItemId, OrderNumber, OrderStatus, ProductId, ReviewId, StoreId, UserId,
};

use super::reviews::author_email;
use super::{
    Backend, CatalogStore, OrderStore, PlaceOrderError, RepositoryError, ReviewStore, StockError,
    StockLedger,
};
use crate::models::{
    Buyer, InsufficientStock, NewReview, Order, OrderDraft, OrderItem, OrderSummary, Product,
    Review, ReviewCandidate,
};

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    /// Emails as stored, unparsed, like the `users.email` column.
    users: HashMap<UserId, String>,
    orders: Vec<Order>,
    cart_tokens: HashSet<Uuid>,
    reviews: BTreeMap<ReviewId, Review>,
    next_id: i32,
    fail_next_order: bool,
    failing_purchase_lookups: HashSet<UserId>,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn available(&self, product_id: ProductId) -> u32 {
        self.products
            .get(&product_id)
            .map_or(0, Product::sellable_quantity)
    }

    fn reserve(&mut self, product_id: ProductId, quantity: u32) -> Result<u32, InsufficientStock> {
        let available = self.available(product_id);
        let short = InsufficientStock {
            product_id,
            requested: quantity,
            available,
        };
        let product = self.products.get_mut(&product_id).ok_or_else(|| short.clone())?;
        if !product.can_supply(quantity) {
            return Err(short);
        }
        product.available_quantity -= quantity;
        Ok(product.available_quantity)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product listing and return its id.
    pub async fn add_product(
        &self,
        store_id: StoreId,
        name: &str,
        price: bazaar_core::Price,
        available_quantity: u32,
    ) -> ProductId {
        let mut state = self.inner.lock().await;
        let id = ProductId::new(state.next_id());
        state.products.insert(
            id,
            Product {
                id,
                store_id,
                name: name.to_owned(),
                description: String::new(),
                price,
                available_quantity,
                is_active: true,
            },
        );
        id
    }

    /// Activate or deactivate a listing.
    pub async fn set_active(&self, product_id: ProductId, is_active: bool) {
        if let Some(product) = self.inner.lock().await.products.get_mut(&product_id) {
            product.is_active = is_active;
        }
    }

    /// Change the list price of a product.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn set_price(&self, product_id: ProductId, price: bazaar_core::Price) {
        if let Some(product) = self.inner.lock().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    /// Register a user email and return the new user id.
    pub async fn add_user(&self, email: Email) -> UserId {
        self.insert_user(email.as_str().to_owned()).await
    }

    /// Register a user whose stored email is `raw`, valid or not.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn add_user_with_raw_email(&self, raw: &str) -> UserId {
        self.insert_user(raw.to_owned()).await
    }

    async fn insert_user(&self, email: String) -> UserId {
        let mut state = self.inner.lock().await;
        let id = UserId::new(state.next_id());
        state.users.insert(id, email);
        id
    }

    /// Current available quantity of a product (zero if unknown).
    pub async fn available_quantity(&self, product_id: ProductId) -> u32 {
        self.inner
            .lock()
            .await
            .products
            .get(&product_id)
            .map_or(0, |p| p.available_quantity)
    }

    /// Number of orders placed so far.
    pub async fn order_count(&self) -> usize {
        self.inner.lock().await.orders.len()
    }

    /// Make the next `place_order` fail after its reservations, as a lost
    /// database connection would.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn fail_next_order(&self) {
        self.inner.lock().await.fail_next_order = true;
    }

    /// Make every purchase lookup for `user_id` fail.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn fail_purchase_lookups_for(&self, user_id: UserId) {
        self.inner
            .lock()
            .await
            .failing_purchase_lookups
            .insert(user_id);
    }
}

impl CatalogStore for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.lock().await.products.get(&id).cloned())
    }

    async fn products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }
}

impl StockLedger for MemoryStore {
    async fn reserve_and_decrement(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32, StockError> {
        Ok(self.inner.lock().await.reserve(product_id, quantity)?)
    }

    async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<u32, RepositoryError> {
        let mut state = self.inner.lock().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(RepositoryError::NotFound)?;
        product.available_quantity = product
            .available_quantity
            .checked_add(quantity)
            .filter(|q| i32::try_from(*q).is_ok())
            .ok_or_else(|| RepositoryError::OutOfRange(format!("restocking product {product_id}")))?;
        Ok(product.available_quantity)
    }
}

impl OrderStore for MemoryStore {
    async fn place_order(&self, draft: &OrderDraft) -> Result<Order, PlaceOrderError> {
        let mut state = self.inner.lock().await;
        let snapshot: Vec<(ProductId, u32)> = draft
            .lines
            .iter()
            .filter_map(|line| {
                state
                    .products
                    .get(&line.product_id)
                    .map(|p| (p.id, p.available_quantity))
            })
            .collect();
        let rollback = |state: &mut State| {
            for (product_id, available) in &snapshot {
                if let Some(product) = state.products.get_mut(product_id) {
                    product.available_quantity = *available;
                }
            }
        };

        for line in &draft.lines {
            if let Err(short) = state.reserve(line.product_id, line.quantity) {
                rollback(&mut state);
                return Err(short.into());
            }
        }

        if std::mem::take(&mut state.fail_next_order) {
            rollback(&mut state);
            return Err(RepositoryError::Unavailable(
                "connection reset during order insert".to_owned(),
            )
            .into());
        }

        if !state.cart_tokens.insert(draft.cart_token) {
            rollback(&mut state);
            return Err(PlaceOrderError::DuplicateCart);
        }

        let now = Utc::now();
        let order_id = OrderId::new(state.next_id());
        let items = draft
            .lines
            .iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(state.next_id()),
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.unit_price,
            })
            .collect();
        let (guest_name, guest_email) = match &draft.buyer {
            Buyer::Guest { name, email } => (Some(name.clone()), Some(email.clone())),
            Buyer::Customer { .. } => (None, None),
        };

        let order = Order {
            id: order_id,
            number: draft.number.clone(),
            buyer_id: draft.buyer.user_id(),
            guest_name,
            guest_email,
            contact_email: draft.buyer.email().clone(),
            status: OrderStatus::Pending,
            subtotal: draft.subtotal,
            tax: draft.tax,
            total_amount: draft.total,
            shipping_address: draft.shipping_address.clone(),
            payment_method: draft.payment_method.clone(),
            created_at: now,
            updated_at: now,
            items,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .iter()
            .find(|order| &order.number == number)
            .cloned())
    }

    async fn orders_for_buyer(
        &self,
        buyer_id: UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let state = self.inner.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|order| order.buyer_id == Some(buyer_id))
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|order| OrderSummary {
                number: order.number.clone(),
                status: order.status,
                total_amount: order.total_amount,
                item_count: order.items.iter().map(|item| u64::from(item.quantity)).sum(),
                created_at: order.created_at,
            })
            .collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.inner.lock().await;
        let order = state
            .orders
            .iter_mut()
            .find(|order| order.id == id)
            .ok_or(RepositoryError::NotFound)?;
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();
        Ok(true)
    }
}

impl ReviewStore for MemoryStore {
    async fn review_exists(
        &self,
        product_id: ProductId,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .reviews
            .values()
            .any(|r| r.product_id == product_id && r.user_id == user_id))
    }

    async fn has_purchased(
        &self,
        product_id: ProductId,
        user_id: UserId,
        email: Option<&Email>,
    ) -> Result<bool, RepositoryError> {
        let state = self.inner.lock().await;
        if state.failing_purchase_lookups.contains(&user_id) {
            return Err(RepositoryError::Unavailable(format!(
                "purchase lookup for user {user_id}"
            )));
        }
        Ok(state.orders.iter().any(|order| {
            let placed_by_user = order.buyer_id == Some(user_id)
                || order
                    .guest_email
                    .as_ref()
                    .zip(email)
                    .is_some_and(|(guest, email)| guest.same_mailbox(email));
            placed_by_user && order.items.iter().any(|item| item.product_id == product_id)
        }))
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let mut state = self.inner.lock().await;
        if state
            .reviews
            .values()
            .any(|r| r.product_id == review.product_id && r.user_id == review.user_id)
        {
            return Err(RepositoryError::Conflict(
                "product already reviewed by user".to_owned(),
            ));
        }
        let id = ReviewId::new(state.next_id());
        let stored = Review {
            id,
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating,
            comment: review.comment.clone(),
            is_verified: review.is_verified,
            created_at: Utc::now(),
        };
        state.reviews.insert(id, stored.clone());
        Ok(stored)
    }

    async fn reviews_for_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .await
            .reviews
            .values()
            .rev()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn unverified_reviews(
        &self,
        after: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<ReviewCandidate>, RepositoryError> {
        let state = self.inner.lock().await;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(state
            .reviews
            .values()
            .filter(|r| !r.is_verified && after.is_none_or(|after| r.id > after))
            .take(limit)
            .map(|r| ReviewCandidate {
                review_id: r.id,
                product_id: r.product_id,
                user_id: r.user_id,
                user_email: state
                    .users
                    .get(&r.user_id)
                    .and_then(|raw| author_email(r.user_id, raw)),
            })
            .collect())
    }

    async fn mark_verified(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let mut state = self.inner.lock().await;
        match state.reviews.get_mut(&id) {
            Some(review) if !review.is_verified => {
                review.is_verified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Backend for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
