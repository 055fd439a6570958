//! Review submission and purchase verification.
//!
//! A review is "verified" when its author bought the product, either while
//! logged in or as a guest using the same email address. Verification is
//! decided at submission and can be granted later by [`ReviewService::reconcile`],
//! for instance after a guest registers with the email they checked out with.
//! A verified review is never unverified.

use thiserror::Error;
use tracing::instrument;

use bazaar_core::{ProductId, Rating, RatingError, ReviewId};

use crate::db::{CatalogStore, RepositoryError, ReviewStore};
use crate::models::{CurrentUser, NewReview, Review, ReviewCandidate};

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 5000;

/// Errors from [`ReviewService::submit`].
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("you have already reviewed this product")]
    AlreadyReviewed,

    #[error("product not found")]
    ProductNotFound,

    #[error(transparent)]
    InvalidRating(#[from] RatingError),

    #[error("a review needs a comment")]
    EmptyComment,

    #[error("comment is longer than {MAX_COMMENT_CHARS} characters")]
    CommentTooLong,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Settings for one reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Count matches without writing anything.
    pub dry_run: bool,
    /// Stop after this many matches.
    pub limit: Option<u32>,
    /// Reviews fetched per query.
    pub batch_size: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            limit: None,
            batch_size: 500,
        }
    }
}

/// Counters from a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Unverified reviews examined.
    pub scanned: u64,
    /// Reviews whose author turned out to be a buyer.
    pub matched: u64,
    /// Reviews flipped to verified by this pass.
    pub updated: u64,
    /// Reviews skipped because a lookup or update failed.
    pub failed: u64,
}

/// Review operations over a store.
pub struct ReviewService<'a, S> {
    store: &'a S,
}

impl<'a, S: CatalogStore + ReviewStore> ReviewService<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Whether `user` bought `product_id`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the lookup fails.
    pub async fn classify(
        &self,
        product_id: ProductId,
        user: &CurrentUser,
    ) -> Result<bool, RepositoryError> {
        self.store
            .has_purchased(product_id, user.id, Some(&user.email))
            .await
    }

    /// Store a review from `user`, verified if they bought the product.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::ProductNotFound`] for unknown products,
    /// [`ReviewError::AlreadyReviewed`] for a second review of the same
    /// product, and a validation error for bad ratings or comments.
    #[instrument(skip(self, comment), fields(user_id = %user.id))]
    pub async fn submit(
        &self,
        user: &CurrentUser,
        product_id: ProductId,
        rating: i64,
        comment: &str,
    ) -> Result<Review, ReviewError> {
        if self.store.product(product_id).await?.is_none() {
            return Err(ReviewError::ProductNotFound);
        }
        let rating = Rating::new(rating)?;
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(ReviewError::EmptyComment);
        }
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(ReviewError::CommentTooLong);
        }
        if self.store.review_exists(product_id, user.id).await? {
            return Err(ReviewError::AlreadyReviewed);
        }

        let is_verified = self.classify(product_id, user).await?;
        let review = NewReview {
            product_id,
            user_id: user.id,
            rating,
            comment: comment.to_owned(),
            is_verified,
        };

        match self.store.insert_review(&review).await {
            Ok(stored) => {
                tracing::info!(review_id = %stored.id, %product_id, is_verified, "Review created");
                Ok(stored)
            }
            // Lost a race with another submission from the same user.
            Err(RepositoryError::Conflict(_)) => Err(ReviewError::AlreadyReviewed),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify every unverified review whose author has since been found to
    /// be a buyer.
    ///
    /// Reviews are visited in id order. A failure on one review is counted
    /// and logged and the pass moves on. Running the pass again is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error only if fetching a batch of candidates fails.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        options: ReconcileOptions,
    ) -> Result<ReconcileReport, RepositoryError> {
        let mut report = ReconcileReport::default();
        let mut after: Option<ReviewId> = None;
        let batch_size = options.batch_size.max(1);

        loop {
            let batch = self.store.unverified_reviews(after, batch_size).await?;
            let fetched = batch.len();
            for candidate in batch {
                after = Some(candidate.review_id);
                report.scanned += 1;
                if !self.reconcile_one(&candidate, options.dry_run, &mut report).await {
                    continue;
                }
                if options.limit.is_some_and(|limit| report.matched >= u64::from(limit)) {
                    tracing::info!(?report, "Reconciliation stopped at limit");
                    return Ok(report);
                }
            }
            if fetched < usize::try_from(batch_size).unwrap_or(usize::MAX) {
                break;
            }
        }

        tracing::info!(?report, dry_run = options.dry_run, "Reconciliation finished");
        Ok(report)
    }

    /// Returns whether the candidate matched.
    async fn reconcile_one(
        &self,
        candidate: &ReviewCandidate,
        dry_run: bool,
        report: &mut ReconcileReport,
    ) -> bool {
        let purchased = match self
            .store
            .has_purchased(
                candidate.product_id,
                candidate.user_id,
                candidate.user_email.as_ref(),
            )
            .await
        {
            Ok(purchased) => purchased,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(review_id = %candidate.review_id, error = %e, "Purchase lookup failed");
                return false;
            }
        };
        if !purchased {
            return false;
        }

        report.matched += 1;
        if dry_run {
            tracing::info!(review_id = %candidate.review_id, "Would verify review");
            return true;
        }
        match self.store.mark_verified(candidate.review_id).await {
            Ok(true) => {
                report.updated += 1;
                tracing::debug!(review_id = %candidate.review_id, "Review verified");
            }
            Ok(false) => {}
            Err(e) => {
                report.failed += 1;
                tracing::warn!(review_id = %candidate.review_id, error = %e, "Failed to verify review");
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use bazaar_core::{Email, OrderNumber, Price, StoreId};
    use uuid::Uuid;

    use super::*;
    use crate::db::{MemoryStore, OrderStore};
    use crate::models::{Buyer, DraftLine, OrderDraft};

    async fn buy(store: &MemoryStore, buyer: Buyer, product_id: ProductId) {
        let draft = OrderDraft {
            number: OrderNumber::generate(),
            buyer,
            shipping_address: "1 Loop Rd".to_owned(),
            payment_method: "cod".to_owned(),
            lines: vec![DraftLine {
                product_id,
                product_name: "Mug".to_owned(),
                quantity: 1,
                unit_price: Price::from_cents(1000),
            }],
            subtotal: Price::from_cents(1000),
            tax: Price::from_cents(80),
            total: Price::from_cents(1080),
            cart_token: Uuid::new_v4(),
        };
        store.place_order(&draft).await.unwrap();
    }

    async fn user(store: &MemoryStore, email: &str) -> CurrentUser {
        let email = Email::parse(email).unwrap();
        let id = store.add_user(email.clone()).await;
        CurrentUser { id, email }
    }

    async fn product(store: &MemoryStore) -> ProductId {
        store
            .add_product(StoreId::new(1), "Mug", Price::from_cents(1000), 50)
            .await
    }

    #[tokio::test]
    async fn test_guest_purchase_matches_email_case_insensitively() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let user = user(&store, "Ada@Example.com").await;
        buy(
            &store,
            Buyer::Guest {
                name: "Ada".to_owned(),
                email: Email::parse("ada@example.COM").unwrap(),
            },
            product,
        )
        .await;

        let service = ReviewService::new(&store);
        assert!(service.classify(product, &user).await.unwrap());
        let review = service.submit(&user, product, 5, "Lovely").await.unwrap();
        assert!(review.is_verified);
    }

    #[tokio::test]
    async fn test_unbought_product_is_unverified() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let user = user(&store, "bob@example.com").await;

        let review = ReviewService::new(&store)
            .submit(&user, product, 3, "Looks nice")
            .await
            .unwrap();

        assert!(!review.is_verified);
    }

    #[tokio::test]
    async fn test_second_review_is_rejected() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let user = user(&store, "bob@example.com").await;
        let service = ReviewService::new(&store);

        service.submit(&user, product, 3, "Fine").await.unwrap();
        assert!(matches!(
            service.submit(&user, product, 5, "Changed my mind").await,
            Err(ReviewError::AlreadyReviewed)
        ));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let user = user(&store, "bob@example.com").await;
        let service = ReviewService::new(&store);

        assert!(matches!(
            service.submit(&user, ProductId::new(999), 4, "Nice").await,
            Err(ReviewError::ProductNotFound)
        ));
        assert!(matches!(
            service.submit(&user, product, 6, "Nice").await,
            Err(ReviewError::InvalidRating(_))
        ));
        assert!(matches!(
            service.submit(&user, product, 4, "   ").await,
            Err(ReviewError::EmptyComment)
        ));
        let long = "x".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            service.submit(&user, product, 4, &long).await,
            Err(ReviewError::CommentTooLong)
        ));
    }

    #[tokio::test]
    async fn test_reconcile_verifies_later_purchases_once() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let buyer = user(&store, "ada@example.com").await;
        let browser = user(&store, "bob@example.com").await;
        let service = ReviewService::new(&store);

        service.submit(&buyer, product, 5, "Great").await.unwrap();
        service.submit(&browser, product, 2, "Meh").await.unwrap();
        buy(
            &store,
            Buyer::Customer {
                user_id: buyer.id,
                email: buyer.email.clone(),
            },
            product,
        )
        .await;

        let options = ReconcileOptions {
            batch_size: 1,
            ..ReconcileOptions::default()
        };
        let first = service.reconcile(options).await.unwrap();
        assert_eq!(
            first,
            ReconcileReport {
                scanned: 2,
                matched: 1,
                updated: 1,
                failed: 0
            }
        );

        let second = service.reconcile(options).await.unwrap();
        assert_eq!(second.scanned, 1);
        assert_eq!(second.updated, 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let buyer = user(&store, "ada@example.com").await;
        let service = ReviewService::new(&store);
        service.submit(&buyer, product, 5, "Great").await.unwrap();
        buy(
            &store,
            Buyer::Customer {
                user_id: buyer.id,
                email: buyer.email.clone(),
            },
            product,
        )
        .await;

        let report = service
            .reconcile(ReconcileOptions {
                dry_run: true,
                ..ReconcileOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(report.matched, 1);
        assert_eq!(report.updated, 0);
        let reviews = store.reviews_for_product(product).await.unwrap();
        assert!(!reviews[0].is_verified);
    }

    #[tokio::test]
    async fn test_unparseable_author_email_does_not_stop_the_pass() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let service = ReviewService::new(&store);

        // Accepted by an older signup form, rejected by today's parser.
        let legacy_id = store.add_user_with_raw_email("admin@localhost").await;
        let legacy = CurrentUser {
            id: legacy_id,
            email: Email::parse("admin@example.com").unwrap(),
        };
        let regular = user(&store, "ada@example.com").await;
        service.submit(&legacy, product, 4, "Solid").await.unwrap();
        service.submit(&regular, product, 5, "Great").await.unwrap();

        for reviewer in [&legacy, &regular] {
            buy(
                &store,
                Buyer::Customer {
                    user_id: reviewer.id,
                    email: reviewer.email.clone(),
                },
                product,
            )
            .await;
        }

        let report = service.reconcile(ReconcileOptions::default()).await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                scanned: 2,
                matched: 2,
                updated: 2,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_unparseable_author_email_skips_guest_matching() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let service = ReviewService::new(&store);

        let legacy_id = store.add_user_with_raw_email("ada@localhost").await;
        let legacy = CurrentUser {
            id: legacy_id,
            email: Email::parse("ada@example.com").unwrap(),
        };
        service.submit(&legacy, product, 4, "Solid").await.unwrap();
        buy(
            &store,
            Buyer::Guest {
                name: "Ada".to_owned(),
                email: Email::parse("ada@example.com").unwrap(),
            },
            product,
        )
        .await;

        let report = service.reconcile(ReconcileOptions::default()).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.matched, 0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_limit_and_failure_isolation() {
        let store = MemoryStore::new();
        let product = product(&store).await;
        let service = ReviewService::new(&store);

        let broken = user(&store, "broken@example.com").await;
        service.submit(&broken, product, 1, "Hmm").await.unwrap();
        store.fail_purchase_lookups_for(broken.id).await;

        for email in ["a@example.com", "b@example.com", "c@example.com"] {
            let reviewer = user(&store, email).await;
            service.submit(&reviewer, product, 4, "Good").await.unwrap();
            buy(
                &store,
                Buyer::Customer {
                    user_id: reviewer.id,
                    email: reviewer.email.clone(),
                },
                product,
            )
            .await;
        }

        let report = service
            .reconcile(ReconcileOptions {
                limit: Some(2),
                ..ReconcileOptions::default()
            })
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.matched, 2);
        assert_eq!(report.updated, 2);
        assert_eq!(report.scanned, 3);

        let rest = service.reconcile(ReconcileOptions::default()).await.unwrap();
        assert_eq!(rest.updated, 1);
        assert_eq!(rest.failed, 1);
    }
}
