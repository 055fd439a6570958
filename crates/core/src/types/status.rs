//! Status enums and the order status state machine.
//!
//! ```text
//! pending ──► processing ──► shipped ──► delivered
//!    │             │            │
//!    └─────────────┴────────────┴──► cancelled
//! ```

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created by checkout, not yet picked up.
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// A status change that the state machine does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move order from {from} to {to}")]
pub struct TransitionError {
    /// Current status.
    pub from: OrderStatus,
    /// Requested status.
    pub to: OrderStatus,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Shipped | Self::Cancelled)
                | (Self::Shipped, Self::Delivered | Self::Cancelled)
        )
    }

    /// Validate a transition, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] for same-state, backward, or post-terminal moves.
    pub const fn transition_to(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Leaving this status sends the customer a status-update email.
    #[must_use]
    pub const fn notifies_on_exit(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Lower-case identifier used in URLs, CLI arguments and JSON.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable label for emails.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown status name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown order status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_owned()))
    }
}

/// Account role, stored on the user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Default role for every registered user.
    #[default]
    Buyer,
    /// Owns one or more stores.
    Vendor,
    Admin,
}

impl Role {
    /// Database and form value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "vendor" => Ok(Self::Vendor),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownStatus(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let status = OrderStatus::default()
            .transition_to(OrderStatus::Processing)
            .and_then(|s| s.transition_to(OrderStatus::Shipped))
            .and_then(|s| s.transition_to(OrderStatus::Delivered))
            .unwrap();
        assert_eq!(status, OrderStatus::Delivered);
        assert!(status.is_terminal());
    }

    #[test]
    fn test_cancel_from_every_pre_delivered_state() {
        for from in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            assert!(from.can_transition_to(OrderStatus::Cancelled), "{from}");
        }
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_rejects_backward_skip_and_same_state() {
        let invalid = [
            (OrderStatus::Processing, OrderStatus::Pending),
            (OrderStatus::Pending, OrderStatus::Shipped),
            (OrderStatus::Pending, OrderStatus::Delivered),
            (OrderStatus::Shipped, OrderStatus::Shipped),
            (OrderStatus::Cancelled, OrderStatus::Pending),
            (OrderStatus::Delivered, OrderStatus::Shipped),
        ];
        for (from, to) in invalid {
            assert_eq!(
                from.transition_to(to),
                Err(TransitionError { from, to }),
                "{from} -> {to}"
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_notifies_on_exit() {
        assert!(OrderStatus::Pending.notifies_on_exit());
        assert!(OrderStatus::Processing.notifies_on_exit());
        assert!(!OrderStatus::Shipped.notifies_on_exit());
    }

    #[test]
    fn test_parse_roundtrip_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("SHIPPED".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Vendor".parse::<Role>().unwrap(), Role::Vendor);
        assert_eq!(Role::default(), Role::Buyer);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }
}
