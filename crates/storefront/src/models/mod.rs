//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from the row types in
//! [`crate::db`]. Money is always [`bazaar_core::Price`], quantities are `u32`.

pub mod order;
pub mod product;
pub mod review;
pub mod session;
pub mod user;

pub use order::{Buyer, DraftLine, Order, OrderDraft, OrderItem, OrderSummary};
pub use product::{InsufficientStock, Product};
pub use review::{NewReview, Review, ReviewCandidate};
pub use session::{CurrentUser, FlashLevel, FlashMessage, keys as session_keys};
pub use user::{Profile, User};
