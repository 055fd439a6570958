//! Catalog types.

use serde::Serialize;

use bazaar_core::{Price, ProductId, StoreId};

/// A product listed by a vendor store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub description: String,
    /// Current list price.
    pub price: Price,
    /// Units that can still be sold. Never negative.
    pub available_quantity: u32,
    /// Inactive products cannot be added to carts or sold.
    pub is_active: bool,
}

impl Product {
    /// Whether `quantity` more units could be sold right now.
    #[must_use]
    pub const fn can_supply(&self, quantity: u32) -> bool {
        self.is_active && quantity <= self.available_quantity
    }

    /// Units available to an active listing, zero otherwise.
    #[must_use]
    pub const fn sellable_quantity(&self) -> u32 {
        if self.is_active {
            self.available_quantity
        } else {
            0
        }
    }
}

/// A stock reservation that could not be satisfied.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
pub struct InsufficientStock {
    pub product_id: ProductId,
    pub requested: u32,
    /// Units available at the time of the failed check (zero for unknown
    /// or inactive products).
    pub available: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(available_quantity: u32, is_active: bool) -> Product {
        Product {
            id: ProductId::new(1),
            store_id: StoreId::new(1),
            name: "Mug".to_owned(),
            description: String::new(),
            price: Price::from_cents(1000),
            available_quantity,
            is_active,
        }
    }

    #[test]
    fn test_can_supply() {
        assert!(product(3, true).can_supply(3));
        assert!(!product(3, true).can_supply(4));
        assert!(!product(3, false).can_supply(1));
    }

    #[test]
    fn test_inactive_has_nothing_sellable() {
        assert_eq!(product(5, false).sellable_quantity(), 0);
        assert_eq!(product(5, true).sellable_quantity(), 5);
    }
}
