//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};

use bazaar_core::{Email, Role, UserId};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// Per-user profile, created together with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    pub role: Role,
}

impl Profile {
    /// Profile for a freshly registered user.
    ///
    /// Every registration goes through this factory; there is no implicit
    /// profile creation elsewhere.
    #[must_use]
    pub const fn for_new_user(user_id: UserId, role: Option<Role>) -> Self {
        let role = match role {
            Some(role) => role,
            None => Role::Buyer,
        };
        Self { user_id, role }
    }
}
