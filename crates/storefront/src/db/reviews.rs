//! Review repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use bazaar_core::{Email, ProductId, Rating, ReviewId, UserId};

use super::RepositoryError;
use crate::models::{NewReview, Review, ReviewCandidate};

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    product_id: ProductId,
    user_id: UserId,
    rating: i16,
    comment: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(i64::from(row.rating))
            .map_err(|e| RepositoryError::DataCorruption(format!("review {}: {e}", row.id)))?;
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            rating,
            comment: row.comment,
            is_verified: row.is_verified,
            created_at: row.created_at,
        })
    }
}

/// Parse a stored author email, logging addresses that do not parse.
pub(super) fn author_email(user_id: UserId, raw: &str) -> Option<Email> {
    Email::parse(raw)
        .inspect_err(|e| tracing::warn!(%user_id, error = %e, "Unparseable email on review author"))
        .ok()
}

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Whether the user already reviewed the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn exists(&self, product_id: ProductId, user_id: UserId) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM storefront.reviews
                WHERE product_id = $1 AND user_id = $2
            )
            ",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Whether an order containing the product was placed by the user, or by
    /// a guest using the user's email. Without an email only the user's own
    /// orders count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_purchased(
        &self,
        product_id: ProductId,
        user_id: UserId,
        email: Option<&Email>,
    ) -> Result<bool, RepositoryError> {
        let purchased: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1
                FROM storefront.order_items oi
                JOIN storefront.orders o ON o.id = oi.order_id
                WHERE oi.product_id = $1
                  AND (o.buyer_id = $2
                       OR ($3::TEXT IS NOT NULL AND LOWER(o.guest_email) = LOWER($3)))
            )
            ",
        )
        .bind(product_id)
        .bind(user_id)
        .bind(email)
        .fetch_one(self.pool)
        .await?;
        Ok(purchased)
    }

    /// Insert a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user already reviewed the product.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn insert(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            INSERT INTO storefront.reviews (product_id, user_id, rating, comment, is_verified)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, product_id, user_id, rating, comment, is_verified, created_at
            ",
        )
        .bind(review.product_id)
        .bind(review.user_id)
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.is_verified)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("product already reviewed by user".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        Review::try_from(row)
    }

    /// All reviews of a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_product(&self, product_id: ProductId) -> Result<Vec<Review>, RepositoryError> {
        sqlx::query_as::<_, ReviewRow>(
            r"
            SELECT id, product_id, user_id, rating, comment, is_verified, created_at
            FROM storefront.reviews
            WHERE product_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(Review::try_from)
        .collect()
    }

    /// A page of unverified reviews with their authors' emails.
    ///
    /// An author email that does not parse is logged and left out; the review
    /// is still returned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unverified(
        &self,
        after: Option<ReviewId>,
        limit: u32,
    ) -> Result<Vec<ReviewCandidate>, RepositoryError> {
        let rows: Vec<(ReviewId, ProductId, UserId, String)> = sqlx::query_as(
            r"
            SELECT r.id, r.product_id, r.user_id, u.email
            FROM storefront.reviews r
            JOIN storefront.users u ON u.id = r.user_id
            WHERE NOT r.is_verified
              AND ($1::INTEGER IS NULL OR r.id > $1)
            ORDER BY r.id
            LIMIT $2
            ",
        )
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(review_id, product_id, user_id, email)| ReviewCandidate {
                review_id,
                product_id,
                user_id,
                user_email: author_email(user_id, &email),
            })
            .collect())
    }

    /// Flip a review to verified.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_verified(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.reviews
            SET is_verified = TRUE, updated_at = NOW()
            WHERE id = $1 AND NOT is_verified
            ",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
