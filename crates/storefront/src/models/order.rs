//! Order types.
//!
//! An [`OrderDraft`] is what checkout hands to the order store; an [`Order`]
//! is what comes back once the draft has been committed together with its
//! stock reservations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use bazaar_core::{
    Email, OrderId, OrderItemId, OrderNumber, OrderStatus, Price, PriceError, ProductId,
    UserId,
};

/// Who is placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Buyer {
    /// A logged-in user.
    Customer { user_id: UserId, email: Email },
    /// A guest identified only by the contact details they entered.
    Guest { name: String, email: Email },
}

impl Buyer {
    /// Address that receives the invoice and status updates.
    #[must_use]
    pub const fn email(&self) -> &Email {
        match self {
            Self::Customer { email, .. } | Self::Guest { email, .. } => email,
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Customer { user_id, .. } => Some(*user_id),
            Self::Guest { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest { .. })
    }
}

/// One cart line resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Unit price snapshotted when the product was added to the cart.
    pub unit_price: Price,
}

/// A fully priced order that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub number: OrderNumber,
    pub buyer: Buyer,
    pub shipping_address: String,
    pub payment_method: String,
    /// Lines in reservation order (ascending product id).
    pub lines: Vec<DraftLine>,
    pub subtotal: Price,
    pub tax: Price,
    pub total: Price,
    /// Token of the cart this draft was built from; an order is placed at
    /// most once per token.
    pub cart_token: Uuid,
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Unit price charged.
    pub price: Price,
}

impl OrderItem {
    /// Unit price times quantity.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the amount does not fit.
    pub fn line_total(&self) -> Result<Price, PriceError> {
        self.price.times(self.quantity)
    }
}

/// One row of a buyer's order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub number: OrderNumber,
    pub status: OrderStatus,
    pub total_amount: Price,
    /// Units across all lines.
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub number: OrderNumber,
    /// Set for customer orders; `None` for guest orders.
    pub buyer_id: Option<UserId>,
    /// Set for guest orders only.
    pub guest_name: Option<String>,
    /// Set for guest orders only.
    pub guest_email: Option<Email>,
    /// Where notifications go: the buyer's account email or the guest email.
    pub contact_email: Email,
    pub status: OrderStatus,
    pub subtotal: Price,
    pub tax: Price,
    pub total_amount: Price,
    pub shipping_address: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        self.buyer_id.is_none()
    }

    /// Display name for greetings in emails.
    #[must_use]
    pub fn recipient_name(&self) -> &str {
        self.guest_name
            .as_deref()
            .unwrap_or_else(|| self.contact_email.as_str())
    }
}
