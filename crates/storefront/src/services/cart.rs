//! Session-backed shopping cart.
//!
//! The cart lives in the visitor's session as a small versioned JSON document:
//!
//! ```json
//! {"v":1,"token":"6f1c…","items":{"42":{"quantity":2,"price":"10.00"}}}
//! ```
//!
//! The unit price is captured the first time a product enters the cart and is
//! what checkout charges. The token identifies this particular cart; checkout
//! stores it on the order so a cart can only ever become one order.
//!
//! A document that fails to parse or validate is logged and replaced by an
//! empty cart rather than failing the request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_sessions::Session;
use uuid::Uuid;

use bazaar_core::{Price, PriceError, ProductId};

use crate::db::{CatalogStore, RepositoryError};
use crate::models::{Product, session_keys};

/// Version written into every cart document.
pub const CART_FORMAT_VERSION: u8 = 1;

/// How [`SessionCart::add`] combines the new quantity with an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Add to whatever is already in the cart.
    Increment,
    /// Replace the line's quantity.
    Replace,
}

/// Errors that can occur when changing a cart.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantities must be at least one; use remove to drop a line.
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// The resulting line quantity does not fit.
    #[error("quantity overflow")]
    QuantityOverflow,

    /// The product is not listed for sale.
    #[error("product {0} is not available")]
    Unavailable(ProductId),

    /// Not enough stock for the requested line quantity.
    #[error("only {remaining} more of product {product_id} can be added")]
    NotEnoughStock {
        product_id: ProductId,
        /// Units that could still be added on top of the current line.
        remaining: u32,
    },

    /// The cart could not be encoded for storage.
    #[error("cart encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Session store failure.
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Why a stored cart document was rejected.
#[derive(Debug, Error)]
pub enum CartDocumentError {
    #[error("malformed cart document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported cart format version {0}")]
    Version(u8),

    #[error("invalid product id {0}")]
    ProductId(i32),

    #[error("zero quantity for product {0}")]
    ZeroQuantity(ProductId),
}

/// One product line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CartLine {
    pub quantity: u32,
    /// Unit price captured when the product was first added.
    #[serde(rename = "price")]
    pub unit_price: Price,
}

impl CartLine {
    /// Unit price times quantity.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the amount does not fit.
    pub fn line_total(&self) -> Result<Price, PriceError> {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CartDocument {
    v: u8,
    token: Uuid,
    items: BTreeMap<i32, CartLine>,
}

/// A shopping cart, independent of where it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    token: Uuid,
    lines: BTreeMap<ProductId, CartLine>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    /// An empty cart with a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: Uuid::new_v4(),
            lines: BTreeMap::new(),
        }
    }

    /// Identifier of this cart; becomes the order's idempotency key.
    #[must_use]
    pub const fn token(&self) -> Uuid {
        self.token
    }

    /// Add a product line or change its quantity. Returns the new line quantity.
    ///
    /// The unit price is only recorded when the line is created.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::ZeroQuantity`] for a zero quantity and
    /// [`CartError::QuantityOverflow`] if incrementing overflows.
    pub fn add(
        &mut self,
        product_id: ProductId,
        unit_price: Price,
        quantity: u32,
        mode: AddMode,
    ) -> Result<u32, CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }
        let line = self.lines.entry(product_id).or_insert(CartLine {
            quantity: 0,
            unit_price,
        });
        let updated = match mode {
            AddMode::Increment => line.quantity.checked_add(quantity),
            AddMode::Replace => Some(quantity),
        };
        let Some(updated) = updated else {
            if line.quantity == 0 {
                self.lines.remove(&product_id);
            }
            return Err(CartError::QuantityOverflow);
        };
        line.quantity = updated;
        Ok(updated)
    }

    /// Drop a product line. Returns whether it was present.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        self.lines.remove(&product_id).is_some()
    }

    /// Quantity of a product in the cart, zero if absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.lines.get(&product_id).map_or(0, |line| line.quantity)
    }

    /// Lines in ascending product id order.
    pub fn lines(&self) -> impl Iterator<Item = (ProductId, &CartLine)> + '_ {
        self.lines.iter().map(|(id, line)| (*id, line))
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.lines.values().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of all line totals at the captured prices.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if any amount does not fit.
    pub fn total_price(&self) -> Result<Price, PriceError> {
        self.lines
            .values()
            .try_fold(Price::ZERO, |total, line| total.checked_add(line.line_total()?))
    }

    /// Decode a stored cart document.
    ///
    /// # Errors
    ///
    /// Returns [`CartDocumentError`] for unknown versions, unknown fields,
    /// non-positive product ids or zero quantities.
    pub fn from_document(value: serde_json::Value) -> Result<Self, CartDocumentError> {
        let document: CartDocument = serde_json::from_value(value)?;
        if document.v != CART_FORMAT_VERSION {
            return Err(CartDocumentError::Version(document.v));
        }
        let mut lines = BTreeMap::new();
        for (raw_id, line) in document.items {
            if raw_id <= 0 {
                return Err(CartDocumentError::ProductId(raw_id));
            }
            let product_id = ProductId::new(raw_id);
            if line.quantity == 0 {
                return Err(CartDocumentError::ZeroQuantity(product_id));
            }
            lines.insert(product_id, line);
        }
        Ok(Self {
            token: document.token,
            lines,
        })
    }

    /// Encode as a versioned cart document.
    ///
    /// # Errors
    ///
    /// Returns an error only if serialization fails, which it does not for
    /// well-formed carts.
    pub fn to_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(CartDocument {
            v: CART_FORMAT_VERSION,
            token: self.token,
            items: self
                .lines
                .iter()
                .map(|(id, line)| (id.as_i32(), *line))
                .collect(),
        })
    }
}

/// A cart line resolved against the current catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    /// `None` when the product no longer exists.
    pub product: Option<Product>,
    pub quantity: u32,
    pub unit_price: Price,
    pub line_total: Price,
    /// False for deleted or deactivated products; checkout refuses such lines.
    pub available: bool,
}

/// The cart bound to one visitor's session.
///
/// Every mutation is written back to the session before returning.
pub struct SessionCart {
    session: Session,
    cart: Cart,
}

impl SessionCart {
    /// Load the cart from the session, starting empty when there is none or
    /// the stored document is unusable.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Session`] if the session store cannot be read.
    pub async fn load(session: Session) -> Result<Self, CartError> {
        let cart = match session.get_value(session_keys::CART).await? {
            None => Cart::new(),
            Some(value) => Cart::from_document(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding unreadable cart");
                Cart::new()
            }),
        };
        Ok(Self { session, cart })
    }

    /// Current contents.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// The session this cart is stored in.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Add a product, checking the request against its sellable stock.
    /// Returns the new line quantity.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Unavailable`] for inactive products,
    /// [`CartError::NotEnoughStock`] when the resulting line would exceed the
    /// available quantity, and [`CartError::Session`] if saving fails.
    pub async fn add(
        &mut self,
        product: &Product,
        quantity: u32,
        mode: AddMode,
    ) -> Result<u32, CartError> {
        if !product.is_active {
            return Err(CartError::Unavailable(product.id));
        }
        let current = match mode {
            AddMode::Increment => self.cart.quantity_of(product.id),
            AddMode::Replace => 0,
        };
        let remaining = product.available_quantity.saturating_sub(current);
        if quantity > remaining {
            return Err(CartError::NotEnoughStock {
                product_id: product.id,
                remaining,
            });
        }

        let updated = self.cart.add(product.id, product.price, quantity, mode)?;
        self.persist().await?;
        Ok(updated)
    }

    /// Remove a product line. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Session`] if saving fails.
    pub async fn remove(&mut self, product_id: ProductId) -> Result<bool, CartError> {
        let removed = self.cart.remove(product_id);
        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Empty the cart and retire its token.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Session`] if the session store fails.
    pub async fn clear(&mut self) -> Result<(), CartError> {
        self.session.remove_value(session_keys::CART).await?;
        self.session.save().await?;
        self.cart = Cart::new();
        Ok(())
    }

    /// Resolve every line against the catalog, flagging lines whose product
    /// is gone or inactive.
    ///
    /// # Errors
    ///
    /// Returns the catalog's error if the lookup fails, or
    /// `RepositoryError::OutOfRange` if a line total overflows.
    pub async fn items<C: CatalogStore>(&self, catalog: &C) -> Result<Vec<CartItem>, RepositoryError> {
        let ids: Vec<ProductId> = self.cart.lines().map(|(id, _)| id).collect();
        let mut products: BTreeMap<ProductId, Product> = catalog
            .products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        self.cart
            .lines()
            .map(|(product_id, line)| {
                let product = products.remove(&product_id);
                let available = product.as_ref().is_some_and(|p| p.is_active);
                let line_total = line
                    .line_total()
                    .map_err(|e| RepositoryError::OutOfRange(e.to_string()))?;
                Ok(CartItem {
                    product_id,
                    product,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    line_total,
                    available,
                })
            })
            .collect()
    }

    async fn persist(&self) -> Result<(), CartError> {
        let document = self.cart.to_document()?;
        self.session.insert_value(session_keys::CART, document).await?;
        self.session.save().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use bazaar_core::StoreId;
    use serde_json::json;
    use tower_sessions::MemoryStore as SessionMemoryStore;

    use super::*;
    use crate::db::MemoryStore;

    fn session() -> Session {
        Session::new(None, Arc::new(SessionMemoryStore::default()), None)
    }

    fn product(id: i32, cents: u32, available_quantity: u32) -> Product {
        Product {
            id: ProductId::new(id),
            store_id: StoreId::new(1),
            name: format!("Product {id}"),
            description: String::new(),
            price: Price::from_cents(cents),
            available_quantity,
            is_active: true,
        }
    }

    #[test]
    fn test_add_increments_and_keeps_first_price() {
        let mut cart = Cart::new();
        let id = ProductId::new(3);
        cart.add(id, Price::from_cents(1000), 1, AddMode::Increment).unwrap();
        let qty = cart
            .add(id, Price::from_cents(1200), 2, AddMode::Increment)
            .unwrap();
        assert_eq!(qty, 3);
        let (_, line) = cart.lines().next().unwrap();
        assert_eq!(line.unit_price, Price::from_cents(1000));
    }

    #[test]
    fn test_add_replace_overrides_quantity() {
        let mut cart = Cart::new();
        let id = ProductId::new(3);
        cart.add(id, Price::from_cents(1000), 5, AddMode::Increment).unwrap();
        assert_eq!(
            cart.add(id, Price::from_cents(1000), 2, AddMode::Replace).unwrap(),
            2
        );
    }

    #[test]
    fn test_add_zero_is_rejected() {
        let mut cart = Cart::new();
        let err = cart
            .add(ProductId::new(1), Price::from_cents(100), 0, AddMode::Increment)
            .unwrap_err();
        assert!(matches!(err, CartError::ZeroQuantity));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(1), Price::from_cents(1000), 2, AddMode::Increment)
            .unwrap();
        cart.add(ProductId::new(2), Price::from_cents(500), 1, AddMode::Increment)
            .unwrap();
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.total_quantity(), 3);
        assert_eq!(cart.total_price().unwrap(), Price::from_cents(2500));
    }

    #[test]
    fn test_document_format() {
        let mut cart = Cart::new();
        cart.add(ProductId::new(42), Price::from_cents(1000), 2, AddMode::Increment)
            .unwrap();
        let doc = cart.to_document().unwrap();
        assert_eq!(doc["v"], json!(1));
        assert_eq!(doc["items"]["42"], json!({"quantity": 2, "price": "10.00"}));

        let decoded = Cart::from_document(doc).unwrap();
        assert_eq!(decoded, cart);
    }

    #[test]
    fn test_document_rejects_bad_input() {
        let token = Uuid::new_v4();
        let cases = [
            json!({"v": 2, "token": token, "items": {}}),
            json!({"v": 1, "token": token, "items": {}, "extra": true}),
            json!({"v": 1, "token": token, "items": {"0": {"quantity": 1, "price": "1.00"}}}),
            json!({"v": 1, "token": token, "items": {"5": {"quantity": 0, "price": "1.00"}}}),
            json!({"v": 1, "token": token, "items": {"5": {"quantity": 1, "price": "-1.00"}}}),
            json!({"v": 1, "token": token, "items": {"abc": {"quantity": 1, "price": "1.00"}}}),
            json!(["not", "a", "cart"]),
        ];
        for case in cases {
            assert!(Cart::from_document(case.clone()).is_err(), "{case}");
        }
    }

    #[tokio::test]
    async fn test_corrupt_session_cart_loads_empty() {
        let session = session();
        session
            .insert_value(session_keys::CART, json!({"garbage": 1}))
            .await
            .unwrap();
        let cart = SessionCart::load(session).await.unwrap();
        assert!(cart.cart().is_empty());
    }

    #[tokio::test]
    async fn test_session_cart_persists_between_loads() {
        let session = session();
        let mug = product(1, 1000, 5);

        let mut cart = SessionCart::load(session.clone()).await.unwrap();
        cart.add(&mug, 2, AddMode::Increment).await.unwrap();
        let token = cart.cart().token();

        let reloaded = SessionCart::load(session).await.unwrap();
        assert_eq!(reloaded.cart().quantity_of(mug.id), 2);
        assert_eq!(reloaded.cart().token(), token);
    }

    #[tokio::test]
    async fn test_session_cart_enforces_stock() {
        let mut cart = SessionCart::load(session()).await.unwrap();
        let mug = product(1, 1000, 3);

        cart.add(&mug, 2, AddMode::Increment).await.unwrap();
        let err = cart.add(&mug, 2, AddMode::Increment).await.unwrap_err();
        assert!(matches!(err, CartError::NotEnoughStock { remaining: 1, .. }));

        assert_eq!(cart.add(&mug, 3, AddMode::Replace).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_session_cart_rejects_inactive() {
        let mut cart = SessionCart::load(session()).await.unwrap();
        let mut mug = product(1, 1000, 3);
        mug.is_active = false;
        assert!(matches!(
            cart.add(&mug, 1, AddMode::Increment).await,
            Err(CartError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_rotates_token() {
        let session = session();
        let mut cart = SessionCart::load(session.clone()).await.unwrap();
        cart.add(&product(1, 1000, 3), 1, AddMode::Increment)
            .await
            .unwrap();
        let token = cart.cart().token();

        cart.clear().await.unwrap();
        assert!(cart.cart().is_empty());
        let reloaded = SessionCart::load(session).await.unwrap();
        assert!(reloaded.cart().is_empty());
        assert_ne!(reloaded.cart().token(), token);
    }

    #[tokio::test]
    async fn test_items_flags_unavailable_products() {
        let store = MemoryStore::new();
        let kept = store
            .add_product(StoreId::new(1), "Kept", Price::from_cents(1000), 5)
            .await;
        let hidden = store
            .add_product(StoreId::new(1), "Hidden", Price::from_cents(500), 5)
            .await;

        let mut cart = SessionCart::load(session()).await.unwrap();
        for id in [kept, hidden] {
            let product = store.product(id).await.unwrap().unwrap();
            cart.add(&product, 2, AddMode::Increment).await.unwrap();
        }
        store.set_active(hidden, false).await;

        let items = cart.items(&store).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].available);
        assert_eq!(items[0].line_total, Price::from_cents(2000));
        assert!(!items[1].available);
    }
}
