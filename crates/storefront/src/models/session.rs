//! Session-related types.
//!
//! Types stored in the session for authentication state and one-shot
//! user-facing messages.

use serde::{Deserialize, Serialize};

use bazaar_core::{Email, UserId};

/// Session-stored user identity.
///
/// Written by the login flow; checkout and reviews only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
}

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A message shown once on the next page the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the serialized cart document.
    pub const CART: &str = "cart";

    /// Key for pending flash messages.
    pub const FLASH: &str = "flash";

    /// Key for order numbers placed from this session (guest order access).
    pub const RECENT_ORDERS: &str = "recent_orders";
}
