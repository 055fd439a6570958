//! Business logic services for storefront.
//!
//! # Services
//!
//! - `cart` - Session-held shopping cart
//! - `checkout` - Cart to order conversion
//! - `orders` - Order status transitions
//! - `reviews` - Review submission and purchase verification
//! - `notify` - Best-effort customer notifications
//! - `email` - SMTP delivery and templates
//! - `flash` - One-shot messages across redirects
//!
//! Services borrow a store implementing the traits in [`crate::db`], so the
//! same code runs against `PostgreSQL` and the in-memory store.

pub mod cart;
pub mod checkout;
pub mod email;
pub mod flash;
pub mod notify;
pub mod orders;
pub mod reviews;

pub use cart::{AddMode, Cart, CartError, CartItem, SessionCart};
pub use checkout::{CheckoutAbort, CheckoutOutcome, CheckoutRequest, CheckoutService, Delivery};
pub use email::{EmailError, EmailService};
pub use notify::{Notifier, OrderNotifier};
pub use orders::{OrderError, OrderService, StatusChange};
pub use reviews::{ReconcileOptions, ReconcileReport, ReviewError, ReviewService};
