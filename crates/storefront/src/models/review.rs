//! Product review types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{Email, ProductId, Rating, ReviewId, UserId};

/// A stored review. At most one exists per `(product_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: String,
    /// True once the author is known to have bought the product.
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// A review about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: String,
    pub is_verified: bool,
}

/// An unverified review joined with its author's email, as scanned by the
/// reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCandidate {
    pub review_id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    /// `None` when the stored address does not parse; only orders placed
    /// under the author's account can match then.
    pub user_email: Option<Email>,
}
