//! Checkout: turning a session cart into exactly one order.
//!
//! One attempt walks through these stages:
//!
//! ```text
//! Validating ──► Reserving ──► Committing ──► Notifying ──► Done
//!     │              │             │
//!     └──────────────┴─────────────┴──► Aborted(reason)
//! ```
//!
//! Reserving and Committing are one database transaction (see
//! [`OrderStore::place_order`]). The cart is cleared right after the commit,
//! before the notification is attempted, and notification can no longer
//! affect the outcome.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::instrument;

use bazaar_core::{Email, OrderNumber, Price, ProductId, TaxRate};

use super::cart::SessionCart;
use super::notify::{OrderNotifier, within};
use crate::db::{CatalogStore, OrderStore, PlaceOrderError};
use crate::models::{Buyer, CurrentUser, DraftLine, InsufficientStock, Order, OrderDraft};

/// Payment method recorded when the buyer does not name one.
pub const DEFAULT_PAYMENT_METHOD: &str = "cod";

/// Stage of a checkout attempt, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Validating,
    Reserving,
    Committing,
    Notifying,
    Done,
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Reserving => "reserving",
            Self::Committing => "committing",
            Self::Notifying => "notifying",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why a checkout attempt stopped without creating an order.
///
/// In every case stock, orders and the cart are exactly as they were before
/// the attempt (except a cart that was already checked out, which is cleared).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckoutAbort {
    #[error("cart is empty")]
    EmptyCart,

    #[error("guest checkout requires a name and a valid email")]
    MissingGuestInfo,

    #[error("shipping address is required")]
    MissingShippingAddress,

    #[error(
        "insufficient stock for {product_name}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: u32,
        available: u32,
    },

    #[error("order could not be saved")]
    PersistenceFailure,
}

impl CheckoutAbort {
    /// Message shown to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your cart is empty!".to_owned(),
            Self::MissingGuestInfo => "Name and email are required for guest checkout.".to_owned(),
            Self::MissingShippingAddress => "Please provide a shipping address.".to_owned(),
            Self::InsufficientStock {
                product_name,
                available,
                ..
            } => format!("Not enough stock for {product_name}! Only {available} available."),
            Self::PersistenceFailure => "Error processing your order. Please try again.".to_owned(),
        }
    }

    /// Whether the shopper should be shown the checkout form again rather
    /// than sent back to the cart.
    #[must_use]
    pub const fn is_form_error(&self) -> bool {
        matches!(self, Self::MissingGuestInfo | Self::MissingShippingAddress)
    }
}

/// Form input for a checkout attempt.
#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub shipping_address: String,
    /// Guest name; ignored for logged-in buyers.
    pub name: Option<String>,
    /// Guest email; ignored for logged-in buyers.
    pub email: Option<String>,
    pub payment_method: Option<String>,
}

/// Whether the confirmation reached the mail server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed,
}

/// A successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub delivery: Delivery,
}

impl CheckoutOutcome {
    /// Success message for the shopper.
    ///
    /// Guests whose confirmation failed are invited to log in for their
    /// invoice, although nothing links a later login to a guest order.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match (self.delivery, self.order.is_guest()) {
            (Delivery::Sent, _) => {
                "Order placed successfully! Your invoice has been sent to your email."
            }
            (Delivery::Failed, false) => {
                "Order placed successfully! (Invoice email could not be sent.)"
            }
            (Delivery::Failed, true) => {
                "Order placed successfully! Please log in to get your invoice information by email."
            }
        }
    }
}

/// Runs checkout attempts against a store and a notifier.
pub struct CheckoutService<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    tax_rate: TaxRate,
    notify_timeout: Duration,
}

impl<'a, S, N> CheckoutService<'a, S, N>
where
    S: CatalogStore + OrderStore,
    N: OrderNotifier,
{
    #[must_use]
    pub const fn new(store: &'a S, notifier: &'a N, tax_rate: TaxRate, notify_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            tax_rate,
            notify_timeout,
        }
    }

    /// Convert the cart into an order.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutAbort`] describing the first failed stage. The cart is
    /// left untouched on every abort except an already-placed cart.
    #[instrument(skip_all, fields(lines = cart.cart().len(), guest = user.is_none()))]
    pub async fn checkout(
        &self,
        cart: &mut SessionCart,
        user: Option<&CurrentUser>,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutAbort> {
        let mut stage = CheckoutStage::Validating;
        tracing::debug!(%stage, "Checkout started");

        let buyer = validate(cart, user, &request)?;
        let draft = self.draft(cart, buyer, request).await?;

        stage = CheckoutStage::Reserving;
        tracing::debug!(%stage, order_number = %draft.number, total = %draft.total);

        let order = match self.store.place_order(&draft).await {
            Ok(order) => order,
            Err(PlaceOrderError::InsufficientStock(short)) => {
                tracing::info!(%stage, product_id = %short.product_id, requested = short.requested, available = short.available, "Checkout aborted: insufficient stock");
                return Err(insufficient(&draft, &short));
            }
            Err(PlaceOrderError::DuplicateCart) => {
                tracing::warn!(%stage, cart_token = %draft.cart_token, "Cart was already checked out; clearing it");
                if let Err(e) = cart.clear().await {
                    tracing::error!(error = %e, "Failed to clear stale cart");
                }
                return Err(CheckoutAbort::EmptyCart);
            }
            Err(PlaceOrderError::Repository(e)) => {
                let event_id = sentry::capture_error(&e);
                tracing::error!(%stage, error = %e, sentry_event_id = %event_id, order_number = %draft.number, "Checkout aborted: order could not be saved");
                return Err(CheckoutAbort::PersistenceFailure);
            }
        };

        stage = CheckoutStage::Committing;
        if let Err(e) = cart.clear().await {
            // The order exists; the cart token stops the same cart from
            // producing a second one.
            tracing::error!(%stage, order_number = %order.number, error = %e, "Order placed but cart could not be cleared");
        }

        stage = CheckoutStage::Notifying;
        let sent = within(self.notify_timeout, self.notifier.order_placed(&order)).await;
        let delivery = if sent {
            Delivery::Sent
        } else {
            tracing::warn!(%stage, order_number = %order.number, "Order confirmation not delivered");
            Delivery::Failed
        };

        stage = CheckoutStage::Done;
        tracing::info!(
            %stage,
            order_number = %order.number,
            total = %order.total_amount,
            guest = order.is_guest(),
            "Order placed"
        );
        Ok(CheckoutOutcome { order, delivery })
    }

    /// Price every cart line from its snapshot and resolve product names.
    async fn draft(
        &self,
        cart: &SessionCart,
        buyer: Buyer,
        request: CheckoutRequest,
    ) -> Result<OrderDraft, CheckoutAbort> {
        let items = cart.items(self.store).await.map_err(|e| {
            tracing::error!(error = %e, "Catalog lookup failed during checkout");
            CheckoutAbort::PersistenceFailure
        })?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let Some(product) = item.product.filter(|_| item.available) else {
                return Err(CheckoutAbort::InsufficientStock {
                    product_id: item.product_id,
                    product_name: format!("product #{}", item.product_id),
                    requested: item.quantity,
                    available: 0,
                });
            };
            lines.push(DraftLine {
                product_id: item.product_id,
                product_name: product.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        let subtotal = lines
            .iter()
            .try_fold(Price::ZERO, |total, line| {
                total.checked_add(line.unit_price.times(line.quantity)?)
            })
            .map_err(|e| {
                tracing::error!(error = %e, "Order total overflow");
                CheckoutAbort::PersistenceFailure
            })?;
        let tax = self.tax_rate.tax_on(subtotal);
        let total = subtotal.checked_add(tax).map_err(|e| {
            tracing::error!(error = %e, "Order total overflow");
            CheckoutAbort::PersistenceFailure
        })?;

        let payment_method = request
            .payment_method
            .map(|method| method.trim().to_owned())
            .filter(|method| !method.is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_owned());

        Ok(OrderDraft {
            number: OrderNumber::generate(),
            buyer,
            shipping_address: request.shipping_address.trim().to_owned(),
            payment_method,
            lines,
            subtotal,
            tax,
            total,
            cart_token: cart.cart().token(),
        })
    }
}

/// The Validating stage.
fn validate(
    cart: &SessionCart,
    user: Option<&CurrentUser>,
    request: &CheckoutRequest,
) -> Result<Buyer, CheckoutAbort> {
    if cart.cart().is_empty() {
        return Err(CheckoutAbort::EmptyCart);
    }
    let buyer = match user {
        Some(user) => Buyer::Customer {
            user_id: user.id,
            email: user.email.clone(),
        },
        None => guest_buyer(request)?,
    };
    if request.shipping_address.trim().is_empty() {
        return Err(CheckoutAbort::MissingShippingAddress);
    }
    Ok(buyer)
}

fn guest_buyer(request: &CheckoutRequest) -> Result<Buyer, CheckoutAbort> {
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(CheckoutAbort::MissingGuestInfo)?;
    let email = request
        .email
        .as_deref()
        .and_then(|raw| Email::parse(raw).ok())
        .ok_or(CheckoutAbort::MissingGuestInfo)?;

    Ok(Buyer::Guest {
        name: name.to_owned(),
        email,
    })
}

fn insufficient(draft: &OrderDraft, short: &InsufficientStock) -> CheckoutAbort {
    let product_name = draft
        .lines
        .iter()
        .find(|line| line.product_id == short.product_id)
        .map_or_else(|| format!("product #{}", short.product_id), |line| line.product_name.clone());
    CheckoutAbort::InsufficientStock {
        product_id: short.product_id,
        product_name,
        requested: short.requested,
        available: short.available,
    }
}
